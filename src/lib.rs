//! # s3shuttle - Resilient S3 Object Transfer
//!
//! s3shuttle moves large byte streams to and from S3-style blob stores over
//! unreliable, congested, or bandwidth-limited networks. Transfers survive
//! transient failures, can be paused and resumed cooperatively, and expose
//! their progress while they run.
//!
//! ## Features
//!
//! - **Multipart Upload with Resumption**: staged create → part uploads →
//!   completion, with best-effort abort on terminal failure
//! - **Range-Based Download**: sequential ranged reads with Content-Range
//!   verification and mid-transfer ETag drift detection
//! - **Per-Request Retry**: exponential backoff with per-part budgets,
//!   throttle-aware waits, pluggable error classification
//! - **Cooperative Pause/Resume**: park a transfer at its next safe point,
//!   or cancel the in-flight call outright with force-pause
//! - **Observable Progress**: poll a consistent status snapshot at any time
//! - **Upload Pacing**: optional wait-per-byte read throttling, adjustable
//!   at runtime
//! - **Pluggable Backends**: engines speak to an [`S3Api`](s3api::S3Api)
//!   capability; the `native_s3` feature ships an `aws-sdk-s3` adapter
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use s3shuttle::s3api::S3Api;
//! use s3shuttle::slice::UploadBody;
//! use s3shuttle::transfer::{UploadInput, Uploader};
//! use tokio_util::sync::CancellationToken;
//!
//! # fn api() -> Arc<dyn S3Api> { unimplemented!() }
//! # async fn run() -> s3shuttle::Result<()> {
//! let uploader = Uploader::new(api());
//! let cancel = CancellationToken::new();
//!
//! let body = UploadBody::from_file(std::fs::File::open("backup.tar")?)?;
//! let handle = uploader
//!     .upload(&cancel, UploadInput::new("bucket", "backups/backup.tar", body))
//!     .await?;
//!
//! // The transfer runs in the background; observe and steer it.
//! println!("uploaded {} bytes", handle.status().completed_size);
//! handle.pause();
//! handle.resume();
//!
//! handle.done().await;
//! if let Some(Ok(output)) = handle.result() {
//!     println!("stored as ETag {:?}", output.etag);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Downloads
//!
//! ```no_run
//! use std::sync::Arc;
//! use s3shuttle::s3api::S3Api;
//! use s3shuttle::transfer::{DownloadInput, Downloader};
//! use tokio_util::sync::CancellationToken;
//!
//! # fn api() -> Arc<dyn S3Api> { unimplemented!() }
//! # async fn run() -> s3shuttle::Result<()> {
//! let downloader = Downloader::new(api());
//! let sink = Arc::new(std::fs::File::create("backup.tar")?);
//! let handle = downloader.download(
//!     &CancellationToken::new(),
//!     sink,
//!     DownloadInput::new("bucket", "backups/backup.tar"),
//! );
//! handle.done().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod pace;
pub mod range;
pub mod retry;
pub mod s3api;
pub mod slice;
pub mod storage;
pub mod transfer;

// Re-export commonly used types
pub use error::{RangeError, Result, TransferError};
pub use transfer::{
    DownloadHandle, DownloadInput, DownloadOutput, DownloadStatus, Downloader, UploadHandle,
    UploadInput, UploadOutput, UploadStatus, Uploader,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use s3shuttle::prelude::*;
    //! ```

    pub use crate::error::{Result, TransferError};
    pub use crate::pace::{ReadInterceptorFactory, WaitReadInterceptorFactory};
    pub use crate::retry::{
        ErrorClassifier, ExponentialBackoffRetryerFactory, NaiveClassifier, NoRetryerFactory,
        PauseOnFailRetryerFactory, RetryerFactory, RetryerHookFactory,
    };
    pub use crate::s3api::S3Api;
    pub use crate::slice::{
        DefaultDownloadSlicerFactory, DefaultUploadSlicerFactory, UploadBody, WriteAt,
    };
    pub use crate::transfer::{
        DownloadInput, DownloadOutput, Downloader, UploadInput, UploadOutput, Uploader,
    };
}
