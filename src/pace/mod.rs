//! Upload-side read pacing
//!
//! Wraps part readers so that each successful read of `n` bytes arms a
//! delay of `n × wait_per_byte` gating the next read, throttling upload
//! throughput without touching the part machinery. The rate is mutable at
//! runtime through the factory, and one interceptor instance paces every
//! part of its upload.

use std::future::Future;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{ready, Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
use tokio::time::Sleep;

use crate::s3api::PartRead;

/// Default cap on the bytes consumed per read call (4 KiB).
///
/// Keeps the per-call delay fine-grained: without it a single large read
/// would be followed by one long sleep instead of a smooth trickle.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 4096;

/// Wraps a part reader with pacing behavior
pub trait ReadInterceptor: Send + Sync {
    /// Wrap one part reader
    fn wrap(&self, reader: Box<dyn PartRead>) -> Box<dyn PartRead>;
}

/// Builds one [`ReadInterceptor`] per upload
pub trait ReadInterceptorFactory: Send + Sync {
    /// Create the interceptor instance shared by all parts of one upload
    fn make(&self) -> Arc<dyn ReadInterceptor>;
}

/// Factory for wait-per-byte pacing.
///
/// The configured rate is shared: [`set_wait_per_byte`](Self::set_wait_per_byte)
/// takes effect immediately for every upload using an interceptor made by
/// this factory.
pub struct WaitReadInterceptorFactory {
    wait_per_byte: Arc<RwLock<Duration>>,
    max_chunk_size: usize,
}

impl WaitReadInterceptorFactory {
    /// Pace reads at `wait_per_byte` per byte read
    pub fn new(wait_per_byte: Duration) -> Self {
        Self {
            wait_per_byte: Arc::new(RwLock::new(wait_per_byte)),
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
        }
    }

    /// Override the per-read chunk cap
    pub fn with_max_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.max_chunk_size = max_chunk_size.max(1);
        self
    }

    /// Change the pacing rate; applies to in-flight uploads
    pub fn set_wait_per_byte(&self, wait_per_byte: Duration) {
        *self.wait_per_byte.write().unwrap() = wait_per_byte;
    }
}

impl ReadInterceptorFactory for WaitReadInterceptorFactory {
    fn make(&self) -> Arc<dyn ReadInterceptor> {
        Arc::new(WaitReadInterceptor {
            wait_per_byte: self.wait_per_byte.clone(),
            max_chunk_size: self.max_chunk_size,
        })
    }
}

struct WaitReadInterceptor {
    wait_per_byte: Arc<RwLock<Duration>>,
    max_chunk_size: usize,
}

impl ReadInterceptor for WaitReadInterceptor {
    fn wrap(&self, reader: Box<dyn PartRead>) -> Box<dyn PartRead> {
        Box::new(PacedReader {
            inner: reader,
            wait_per_byte: self.wait_per_byte.clone(),
            max_chunk_size: self.max_chunk_size,
            delay: None,
        })
    }
}

/// Reader delaying each read in proportion to the bytes the previous read
/// produced
struct PacedReader {
    inner: Box<dyn PartRead>,
    wait_per_byte: Arc<RwLock<Duration>>,
    max_chunk_size: usize,
    delay: Option<Pin<Box<Sleep>>>,
}

impl AsyncRead for PacedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if let Some(delay) = this.delay.as_mut() {
            ready!(delay.as_mut().poll(cx));
            this.delay = None;
        }

        let unfilled = buf.initialize_unfilled();
        let limit = unfilled.len().min(this.max_chunk_size);
        let mut chunk = ReadBuf::new(&mut unfilled[..limit]);
        ready!(Pin::new(&mut this.inner).poll_read(cx, &mut chunk))?;
        let n = chunk.filled().len();
        buf.advance(n);

        if n > 0 {
            let wait_per_byte = *this.wait_per_byte.read().unwrap();
            if !wait_per_byte.is_zero() {
                this.delay = Some(Box::pin(tokio::time::sleep(wait_per_byte * n as u32)));
            }
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for PacedReader {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let this = self.get_mut();
        this.delay = None;
        Pin::new(&mut this.inner).start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner).poll_complete(cx)
    }
}
