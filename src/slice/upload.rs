//! Upload slicing
//!
//! Turns an upload input into a lazy sequence of rewindable part readers.
//! Three strategies, picked by the input's capabilities:
//!
//! - inputs smaller than one part become a single reader (the engine then
//!   takes the single-object path);
//! - random-access inputs get non-owning section views, so a retried part
//!   is re-read from the source instead of being buffered;
//! - one-shot streams are read into pooled part-sized buffers; the buffer
//!   returns to the pool when the part reader drops, whatever the retry
//!   outcome was.

use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use crossbeam::queue::SegQueue;
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt, ReadBuf};

use crate::error::{Result, TransferError};
use crate::s3api::PartRead;

/// Default upload part size: 5 MiB (the S3 minimum for multipart parts)
pub const DEFAULT_UPLOAD_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum number of parts S3 accepts per multipart upload
pub const MAX_UPLOAD_PARTS: usize = 10_000;

/// Positional reader: read bytes at an absolute offset without a cursor.
///
/// The section-view slicer requires this so that retried parts can be
/// re-read without disturbing any shared state.
pub trait ReadAt: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `offset`, returning the
    /// number of bytes read (0 at end of input)
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

impl ReadAt for Bytes {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if offset >= self.len() as u64 {
            return Ok(0);
        }
        let available = &self[offset as usize..];
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }
}

#[cfg(unix)]
impl ReadAt for std::fs::File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }
}

#[cfg(windows)]
impl ReadAt for std::fs::File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(self, buf, offset)
    }
}

/// The body of an upload, by capability.
///
/// Rust cannot discover what a reader supports at runtime, so the caller
/// states it up front; the slicer factory picks its strategy from the
/// variant.
pub enum UploadBody {
    /// Positionally readable input of known size (files, in-memory bytes)
    RandomAccess {
        /// The input
        source: Arc<dyn ReadAt>,
        /// Total input size in bytes
        size: u64,
    },
    /// Seekable stream without positional reads; its size is learned by
    /// seeking, parts are buffered through the pool
    Seekable(Box<dyn PartRead>),
    /// One-shot byte stream of unknown size
    Streaming(Box<dyn AsyncRead + Send + Unpin>),
}

impl UploadBody {
    /// Upload an in-memory buffer
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let size = bytes.len() as u64;
        Self::RandomAccess {
            source: Arc::new(bytes),
            size,
        }
    }

    /// Upload a file, using positional reads for retryable section views
    pub fn from_file(file: std::fs::File) -> io::Result<Self> {
        let size = file.metadata()?.len();
        Ok(Self::RandomAccess {
            source: Arc::new(file),
            size,
        })
    }

    /// Upload from a seekable async reader
    pub fn seekable(reader: impl PartRead + 'static) -> Self {
        Self::Seekable(Box::new(reader))
    }

    /// Upload from a one-shot async reader of unknown size
    pub fn streaming(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::Streaming(Box::new(reader))
    }
}

/// Lazy sequence of part readers over one upload input.
///
/// `next_part` yields `(reader, last)`: `last` signals that the returned
/// part is the final one, letting the engine short-circuit into the
/// single-object path when it is set on the very first part.
#[async_trait]
pub trait UploadSlicer: Send {
    /// Total input size, if known up front (`None` for one-shot streams)
    fn total_size(&self) -> Option<u64>;

    /// Produce the next part reader and the end-of-sequence flag
    async fn next_part(&mut self) -> Result<(Box<dyn PartRead>, bool)>;
}

/// Builds an [`UploadSlicer`] for each upload's input
#[async_trait]
pub trait UploadSlicerFactory: Send + Sync {
    /// Create a slicer over the given body
    async fn make(&self, body: UploadBody) -> Result<Box<dyn UploadSlicer>>;
}

/// Factory for the default slicing logic
#[derive(Debug, Clone, Copy)]
pub struct DefaultUploadSlicerFactory {
    /// Size of every part except possibly the last
    pub part_size: u64,
    /// Hard cap on the number of parts one upload may produce
    pub max_upload_parts: usize,
}

impl Default for DefaultUploadSlicerFactory {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_UPLOAD_PART_SIZE,
            max_upload_parts: MAX_UPLOAD_PARTS,
        }
    }
}

#[async_trait]
impl UploadSlicerFactory for DefaultUploadSlicerFactory {
    async fn make(&self, body: UploadBody) -> Result<Box<dyn UploadSlicer>> {
        let part_size = self.part_size.max(1);
        let max_parts = self.max_upload_parts.max(1);
        match body {
            UploadBody::RandomAccess { source, size } => {
                if size < part_size {
                    let whole = SectionReader::new(source, 0, size);
                    Ok(Box::new(SingleSlicer {
                        reader: Some(Box::new(whole)),
                        size,
                    }))
                } else {
                    Ok(Box::new(SectionSlicer {
                        source,
                        size,
                        part_size,
                        max_parts,
                        offset: 0,
                        emitted: 0,
                    }))
                }
            }
            UploadBody::Seekable(mut reader) => {
                let size = reader.seek(SeekFrom::End(0)).await?;
                reader.rewind().await?;
                if size < part_size {
                    Ok(Box::new(SingleSlicer {
                        reader: Some(reader),
                        size,
                    }))
                } else {
                    Ok(Box::new(StreamSlicer::new(
                        Box::new(reader),
                        Some(size),
                        part_size,
                        max_parts,
                    )))
                }
            }
            UploadBody::Streaming(reader) => Ok(Box::new(StreamSlicer::new(
                reader,
                None,
                part_size,
                max_parts,
            ))),
        }
    }
}

/// Whole input as one part
struct SingleSlicer {
    reader: Option<Box<dyn PartRead>>,
    size: u64,
}

#[async_trait]
impl UploadSlicer for SingleSlicer {
    fn total_size(&self) -> Option<u64> {
        Some(self.size)
    }

    async fn next_part(&mut self) -> Result<(Box<dyn PartRead>, bool)> {
        match self.reader.take() {
            Some(reader) => Ok((reader, true)),
            None => Err(TransferError::Io(io::Error::other(
                "upload input already consumed",
            ))),
        }
    }
}

/// Section views over a random-access input
struct SectionSlicer {
    source: Arc<dyn ReadAt>,
    size: u64,
    part_size: u64,
    max_parts: usize,
    offset: u64,
    emitted: usize,
}

#[async_trait]
impl UploadSlicer for SectionSlicer {
    fn total_size(&self) -> Option<u64> {
        Some(self.size)
    }

    async fn next_part(&mut self) -> Result<(Box<dyn PartRead>, bool)> {
        if self.emitted >= self.max_parts && self.offset < self.size {
            return Err(TransferError::TooManyParts {
                limit: self.max_parts,
            });
        }
        let len = self.part_size.min(self.size.saturating_sub(self.offset));
        let reader = SectionReader::new(self.source.clone(), self.offset, len);
        self.offset += self.part_size;
        self.emitted += 1;
        let last = self.offset >= self.size;
        Ok((Box::new(reader), last))
    }
}

/// Pooled read-fill over a one-shot stream
struct StreamSlicer {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    size: Option<u64>,
    pool: Arc<BufferPool>,
    max_parts: usize,
    emitted: usize,
}

impl StreamSlicer {
    fn new(
        reader: Box<dyn AsyncRead + Send + Unpin>,
        size: Option<u64>,
        part_size: u64,
        max_parts: usize,
    ) -> Self {
        Self {
            reader,
            size,
            pool: Arc::new(BufferPool::new(part_size as usize)),
            max_parts,
            emitted: 0,
        }
    }
}

#[async_trait]
impl UploadSlicer for StreamSlicer {
    fn total_size(&self) -> Option<u64> {
        self.size
    }

    async fn next_part(&mut self) -> Result<(Box<dyn PartRead>, bool)> {
        use tokio::io::AsyncReadExt;

        let mut buf = self.pool.lease();
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled > 0 {
            if self.emitted >= self.max_parts {
                self.pool.put(buf);
                return Err(TransferError::TooManyParts {
                    limit: self.max_parts,
                });
            }
            self.emitted += 1;
        }

        let last = filled < buf.len();
        let reader = PooledPartReader {
            buf: Some(buf),
            len: filled,
            pos: 0,
            pool: self.pool.clone(),
        };
        Ok((Box::new(reader), last))
    }
}

/// Lock-free pool of part-sized buffers
pub(crate) struct BufferPool {
    part_size: usize,
    buffers: SegQueue<Vec<u8>>,
}

impl BufferPool {
    pub(crate) fn new(part_size: usize) -> Self {
        Self {
            part_size,
            buffers: SegQueue::new(),
        }
    }

    fn lease(&self) -> Vec<u8> {
        self.buffers
            .pop()
            .unwrap_or_else(|| vec![0; self.part_size])
    }

    fn put(&self, buf: Vec<u8>) {
        self.buffers.push(buf);
    }

    #[cfg(test)]
    fn pooled(&self) -> usize {
        self.buffers.len()
    }
}

/// Non-owning view over `[base, base + len)` of a random-access input.
///
/// Independently seekable and re-readable, which is what part-level retry
/// of an already-known byte range needs.
struct SectionReader {
    source: Arc<dyn ReadAt>,
    base: u64,
    len: u64,
    pos: u64,
}

impl SectionReader {
    fn new(source: Arc<dyn ReadAt>, base: u64, len: u64) -> Self {
        Self {
            source,
            base,
            len,
            pos: 0,
        }
    }
}

impl AsyncRead for SectionReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let remaining = this.len.saturating_sub(this.pos);
        if remaining == 0 {
            return Poll::Ready(Ok(()));
        }
        let unfilled = buf.initialize_unfilled();
        let want = unfilled.len().min(remaining as usize);
        let n = this
            .source
            .read_at(&mut unfilled[..want], this.base + this.pos)?;
        buf.advance(n);
        this.pos += n as u64;
        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for SectionReader {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let this = self.get_mut();
        this.pos = resolve_seek(position, this.pos, this.len)?;
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.pos))
    }
}

/// Seekable reader over a pooled buffer; returns the buffer on drop
struct PooledPartReader {
    buf: Option<Vec<u8>>,
    len: usize,
    pos: u64,
    pool: Arc<BufferPool>,
}

impl Drop for PooledPartReader {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.put(buf);
        }
    }
}

impl AsyncRead for PooledPartReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let data = match &this.buf {
            Some(data) => &data[..this.len],
            None => return Poll::Ready(Ok(())),
        };
        if this.pos >= data.len() as u64 {
            return Poll::Ready(Ok(()));
        }
        let available = &data[this.pos as usize..];
        let n = buf.remaining().min(available.len());
        buf.put_slice(&available[..n]);
        this.pos += n as u64;
        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for PooledPartReader {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let this = self.get_mut();
        this.pos = resolve_seek(position, this.pos, this.len as u64)?;
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.pos))
    }
}

fn resolve_seek(position: SeekFrom, current: u64, len: u64) -> io::Result<u64> {
    let target = match position {
        SeekFrom::Start(offset) => offset as i128,
        SeekFrom::End(offset) => len as i128 + offset as i128,
        SeekFrom::Current(offset) => current as i128 + offset as i128,
    };
    if target < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "seek before start of part",
        ));
    }
    Ok(target as u64)
}
