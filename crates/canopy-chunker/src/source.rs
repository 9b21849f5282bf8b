//! Random-access byte sources for splitting.

use std::io;

use bytes::Bytes;

/// A random-access byte source the splitter reads leaves from.
///
/// Sources are shared across subtree tasks, so implementations must be
/// `Send + Sync` and `read_at` must not require exclusive access.
pub trait DataSource: Send + Sync + 'static {
    /// Total size of the source in bytes.
    fn size(&self) -> u64;

    /// Fill `buf` entirely from `offset`.
    ///
    /// The splitter never reads past [`size`](Self::size); a source that
    /// cannot satisfy a full read must return an error, never a short fill.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;
}

fn copy_from_slice(data: &[u8], buf: &mut [u8], offset: u64) -> io::Result<()> {
    let start = usize::try_from(offset)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?;
    let end = start
        .checked_add(buf.len())
        .filter(|&end| end <= data.len())
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of source"))?;
    buf.copy_from_slice(&data[start..end]);
    Ok(())
}

impl DataSource for Bytes {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        copy_from_slice(self, buf, offset)
    }
}

impl DataSource for Vec<u8> {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        copy_from_slice(self, buf, offset)
    }
}
