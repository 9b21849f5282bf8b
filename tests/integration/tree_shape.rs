//! Integration test: tree structure invariants.
//!
//! Walks the chunk set of a split from the root down and checks, for every
//! node: the size prefix, the branch-count bounds, the left-full child
//! layout, and that leaf bodies match their declared size.

use std::collections::HashMap;

use bytes::Bytes;
use canopy_integration_tests::{chunker_with_branches, split_collect, test_data_seeded};
use canopy_types::{Key, SIZE_PREFIX_LEN, read_size_prefix};

const BRANCHES: u64 = 2;
const HASH_SIZE: usize = 32;
const CHUNK_SIZE: u64 = HASH_SIZE as u64 * BRANCHES;

/// Recursively validate the subtree under `key`, returning its leaf count.
fn check_node(
    chunks: &HashMap<Key, Bytes>,
    key: &Key,
    expected_size: u64,
    mut depth: u32,
    mut tree_size: u64,
) -> usize {
    let payload = chunks.get(key).expect("referenced chunk must exist");
    let node_size = read_size_prefix(payload).expect("size prefix");
    assert_eq!(node_size, expected_size, "subtree size mismatch at {key}");

    while depth > 0 && node_size < tree_size {
        tree_size /= BRANCHES;
        depth -= 1;
    }

    let body = &payload[SIZE_PREFIX_LEN..];
    if depth == 0 {
        assert_eq!(body.len() as u64, node_size, "leaf body length");
        assert!(node_size <= CHUNK_SIZE, "leaf larger than chunk size");
        return 1;
    }

    assert_eq!(body.len() % HASH_SIZE, 0, "branch body alignment");
    let n = (body.len() / HASH_SIZE) as u64;
    assert!(n >= 1 && n <= BRANCHES, "branch count {n} out of bounds");
    assert_eq!(n, node_size.div_ceil(tree_size), "branch count vs size");

    let mut leaves = 0;
    let mut covered = 0u64;
    for i in 0..n {
        let child_key = Key::from_slice(
            &body[i as usize * HASH_SIZE..(i as usize + 1) * HASH_SIZE],
        );
        // Left-full: all children but the last cover a full span.
        let child_size = if i < n - 1 {
            tree_size
        } else {
            node_size - covered
        };
        assert!(child_size > 0, "empty child span");
        covered += child_size;
        leaves += check_node(chunks, &child_key, child_size, depth - 1, tree_size / BRANCHES);
    }
    assert_eq!(covered, node_size, "children must cover the subtree exactly");
    leaves
}

#[tokio::test]
async fn test_invariants_hold_on_every_node() {
    let chunker = chunker_with_branches(BRANCHES);
    let len = 10_000u64;
    let (root, chunks) = split_collect(&chunker, test_data_seeded(len as usize, 61)).await;

    let map: HashMap<Key, Bytes> = chunks
        .iter()
        .map(|(k, p, _)| (k.clone(), p.clone()))
        .collect();

    let mut depth = 0u32;
    let mut tree_size = CHUNK_SIZE;
    while tree_size < len {
        tree_size *= BRANCHES;
        depth += 1;
    }
    assert!(depth >= 3, "10 kB with fan-out 2 must be at least 3 deep");

    let leaves = check_node(&map, &root, len, depth, tree_size / BRANCHES);
    assert_eq!(leaves as u64, len.div_ceil(CHUNK_SIZE));
}

#[tokio::test]
async fn test_full_levels_have_no_short_children() {
    let chunker = chunker_with_branches(BRANCHES);
    let len = CHUNK_SIZE * BRANCHES * BRANCHES; // exactly two full levels
    let (root, chunks) = split_collect(&chunker, test_data_seeded(len as usize, 67)).await;

    let map: HashMap<Key, Bytes> = chunks
        .iter()
        .map(|(k, p, _)| (k.clone(), p.clone()))
        .collect();

    // Every branch node in a perfectly balanced tree is full, and every
    // leaf covers a full chunk.
    check_node(&map, &root, len, 2, CHUNK_SIZE * BRANCHES);
    for (_, payload, size) in &chunks {
        if *size > CHUNK_SIZE {
            assert_eq!(
                (payload.len() - SIZE_PREFIX_LEN) / HASH_SIZE,
                BRANCHES as usize
            );
        } else {
            assert_eq!(*size, CHUNK_SIZE);
        }
    }
}
