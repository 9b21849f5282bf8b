//! Integration test: split/join round trips.
//!
//! For any data and any valid config, splitting and then reading the root
//! back must reproduce the input exactly, and equal inputs must produce
//! equal roots.

use canopy_chunker::{ChunkerConfig, HashAlgo, TreeChunker};
use canopy_integration_tests::{
    TestPipeline, chunker_with_branches, split_collect, test_data_seeded,
};
use sha2::{Digest, Sha256};

/// Boundary lengths around the chunk geometry, with a small fan-out so the
/// tree gets deep: 0, 1, chunk_size ± 1, exact chunk_size, one and two full
/// levels, and an unaligned tail.
#[tokio::test]
async fn test_round_trip_boundary_lengths() {
    let chunker = chunker_with_branches(2);
    let chunk_size = chunker.chunk_size() as usize; // 64 with branches = 2
    let lengths = [
        0,
        1,
        chunk_size - 1,
        chunk_size,
        chunk_size + 1,
        chunk_size * 2,     // branches * chunk_size: one full level
        chunk_size * 4,     // branches^2 * chunk_size: two full levels
        chunk_size * 4 + 5, // unaligned tail past a full tree
        10_000,
    ];

    let pipeline = TestPipeline::new(chunker);
    for (i, len) in lengths.into_iter().enumerate() {
        let data = test_data_seeded(len, i as u32 + 1);
        let (_, read) = pipeline.round_trip(data.clone()).await;
        assert_eq!(read, data, "round trip mismatch at length {len}");
    }
}

#[tokio::test]
async fn test_round_trip_multi_megabyte_default_config() {
    let chunker = TreeChunker::new(ChunkerConfig::default()).unwrap();
    let pipeline = TestPipeline::new(chunker);

    let data = test_data_seeded(3 * 1024 * 1024, 99);
    let (_, read) = pipeline.round_trip(data.clone()).await;
    assert_eq!(read, data);
}

#[tokio::test]
async fn test_round_trip_blake3_scheme() {
    let config = ChunkerConfig {
        hash: HashAlgo::Blake3,
        branches: 4,
        ..ChunkerConfig::default()
    };
    let chunker = TreeChunker::new(config).unwrap();
    let pipeline = TestPipeline::new(chunker);

    let data = test_data_seeded(50_000, 5);
    let (_, read) = pipeline.round_trip(data.clone()).await;
    assert_eq!(read, data);
}

#[tokio::test]
async fn test_equal_data_equal_address() {
    let chunker = chunker_with_branches(2);
    let data = test_data_seeded(20_000, 17);

    let (root_a, chunks_a) = split_collect(&chunker, data.clone()).await;
    let (root_b, chunks_b) = split_collect(&chunker, data).await;

    assert_eq!(root_a, root_b, "equal content must yield an equal root");

    let mut keys_a: Vec<_> = chunks_a.into_iter().map(|(k, _, _)| k).collect();
    let mut keys_b: Vec<_> = chunks_b.into_iter().map(|(k, _, _)| k).collect();
    keys_a.sort();
    keys_b.sort();
    assert_eq!(keys_a, keys_b, "equal content must yield an equal chunk set");
}

#[tokio::test]
async fn test_different_schemes_different_address_spaces() {
    let data = test_data_seeded(10_000, 31);

    let sha = TreeChunker::new(ChunkerConfig::with_branches(2)).unwrap();
    let blake = TreeChunker::new(ChunkerConfig {
        hash: HashAlgo::Blake3,
        branches: 2,
        ..ChunkerConfig::default()
    })
    .unwrap();

    let (root_sha, _) = split_collect(&sha, data.clone()).await;
    let (root_blake, _) = split_collect(&blake, data).await;
    assert_ne!(root_sha, root_blake);
}

/// The empty content has one canonical address: the hash of the bare
/// eight-byte zero size prefix.
#[tokio::test]
async fn test_empty_content_canonical_root() {
    let chunker = TreeChunker::new(ChunkerConfig::default()).unwrap();
    let pipeline = TestPipeline::new(chunker);

    let (root, read) = pipeline.round_trip(Vec::new()).await;
    assert!(read.is_empty());
    assert_eq!(root.as_bytes(), Sha256::digest(0u64.to_le_bytes()).as_slice());
}

#[tokio::test]
async fn test_size_matches_source_length() {
    let pipeline = TestPipeline::new(chunker_with_branches(2));
    let root = pipeline.split(test_data_seeded(12_345, 3)).await;
    assert_eq!(pipeline.reader(root).size().await.unwrap(), 12_345);
}
