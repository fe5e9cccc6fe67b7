//! Transfer engines
//!
//! The caller-facing half of the crate: [`Uploader`] and [`Downloader`]
//! construct a per-transfer context, spawn one background task driving the
//! transfer's state machine, and return a [`TransferHandle`] the caller
//! observes and steers (pause/resume) while the transfer runs.

mod context;
mod download;
mod upload;

#[cfg(test)]
pub(crate) mod testutil;

pub use context::{TransferHandle, TransferStatus};
pub use download::{DownloadHandle, DownloadInput, DownloadOutput, DownloadStatus, Downloader};
pub use upload::{UploadHandle, UploadInput, UploadOutput, UploadStatus, Uploader};
