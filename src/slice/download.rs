//! Download slicing
//!
//! Owns the write side of a download: each `next_writer` call hands out a
//! positioned writer plus the byte range to request for it, advancing the
//! offset by one part size. There is no end-of-sequence signal: the
//! download engine detects completion by comparing its completed size
//! against the total the server reported in the first Content-Range.

use std::io;
use std::sync::Arc;

use crate::range::PartRange;

/// Default download part size: 5 MiB
pub const DEFAULT_DOWNLOAD_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Positional writer: write bytes at an absolute offset without a cursor.
///
/// Downloaded parts land at their range's offset, so retried or resumed
/// parts never depend on a shared cursor position.
pub trait WriteAt: Send + Sync {
    /// Write `buf` starting at `offset`, returning the number of bytes
    /// written
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize>;
}

#[cfg(unix)]
impl WriteAt for std::fs::File {
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::write_at(self, buf, offset)
    }
}

#[cfg(windows)]
impl WriteAt for std::fs::File {
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_write(self, buf, offset)
    }
}

/// Sequential writer over one part's slot in the sink.
///
/// Successive [`Write`](io::Write) calls translate into positional writes
/// at `offset + bytes_written_so_far` on the underlying sink.
pub struct PartWriter {
    sink: Arc<dyn WriteAt>,
    offset: u64,
}

impl PartWriter {
    /// Writer starting at `offset` in `sink`
    pub fn new(sink: Arc<dyn WriteAt>, offset: u64) -> Self {
        Self { sink, offset }
    }
}

impl io::Write for PartWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.sink.write_at(buf, self.offset)?;
        self.offset += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Allocates write positions and request ranges for successive parts
pub trait DownloadSlicer: Send {
    /// Produce the writer and the byte range for the next part
    fn next_writer(&mut self) -> (PartWriter, PartRange);
}

/// Builds a [`DownloadSlicer`] over each download's sink
pub trait DownloadSlicerFactory: Send + Sync {
    /// Create a slicer writing into the given sink
    fn make(&self, sink: Arc<dyn WriteAt>) -> Box<dyn DownloadSlicer>;
}

/// Factory for the default ranging logic
#[derive(Debug, Clone, Copy)]
pub struct DefaultDownloadSlicerFactory {
    /// Bytes requested per ranged call
    pub part_size: u64,
}

impl Default for DefaultDownloadSlicerFactory {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_DOWNLOAD_PART_SIZE,
        }
    }
}

impl DownloadSlicerFactory for DefaultDownloadSlicerFactory {
    fn make(&self, sink: Arc<dyn WriteAt>) -> Box<dyn DownloadSlicer> {
        Box::new(DefaultDownloadSlicer {
            sink,
            part_size: self.part_size.max(1),
            offset: 0,
        })
    }
}

struct DefaultDownloadSlicer {
    sink: Arc<dyn WriteAt>,
    part_size: u64,
    offset: u64,
}

impl DownloadSlicer for DefaultDownloadSlicer {
    fn next_writer(&mut self) -> (PartWriter, PartRange) {
        // The server clamps the end at the object's last byte.
        let range = PartRange::bytes(self.offset, self.offset + self.part_size - 1);
        let writer = PartWriter::new(self.sink.clone(), self.offset);
        self.offset += self.part_size;
        (writer, range)
    }
}
