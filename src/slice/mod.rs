//! Transfer slicing
//!
//! Decomposes a logical transfer into part-sized units lazily: the upload
//! side turns an input stream into a sequence of rewindable part readers,
//! the download side allocates write positions and byte ranges for
//! successive ranged requests.

mod download;
mod upload;

pub use download::{
    DefaultDownloadSlicerFactory, DownloadSlicer, DownloadSlicerFactory, PartWriter, WriteAt,
    DEFAULT_DOWNLOAD_PART_SIZE,
};
pub use upload::{
    DefaultUploadSlicerFactory, ReadAt, UploadBody, UploadSlicer, UploadSlicerFactory,
    DEFAULT_UPLOAD_PART_SIZE, MAX_UPLOAD_PARTS,
};
