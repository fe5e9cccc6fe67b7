//! S3 capability interface
//!
//! The transfer engines never talk to a concrete SDK; they call the
//! [`S3Api`] trait with typed request records and get typed responses back.
//! Mocks, test fakes, and SDK adapters (see the `storage` module) all plug
//! in here, so the engines compose identically with any of them.
//!
//! Upload bodies are `&mut dyn PartRead` borrows: the engine keeps ownership
//! of each part reader so it can rewind and resend it when a call is
//! retried. Cancellation is not part of the contract: the engine races
//! every call against its in-flight cancellation handle and drops the
//! future, which aborts the underlying HTTP request in hyper-based
//! implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncSeek};

use crate::error::Result;

/// A rewindable part body: async read plus async seek.
///
/// Every reader the upload slicers produce satisfies this, as does the
/// pacing wrapper around them.
pub trait PartRead: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin + ?Sized> PartRead for T {}

/// Request for `PutObject`
pub struct PutObjectRequest<'a> {
    /// Target bucket
    pub bucket: &'a str,
    /// Target object key
    pub key: &'a str,
    /// Canned ACL to apply, if any
    pub acl: Option<&'a str>,
    /// Object body, rewound to its start
    pub body: &'a mut dyn PartRead,
    /// Content type to record on the object
    pub content_type: Option<&'a str>,
}

/// Response from `PutObject`
#[derive(Debug, Clone, Default)]
pub struct PutObjectResponse {
    /// Version ID of the stored object, on versioned buckets
    pub version_id: Option<String>,
    /// ETag the server assigned
    pub etag: Option<String>,
    /// URL of the stored object
    pub location: Option<String>,
}

/// Request for a (possibly ranged) `GetObject`
#[derive(Debug, Clone)]
pub struct GetObjectRequest<'a> {
    /// Source bucket
    pub bucket: &'a str,
    /// Source object key
    pub key: &'a str,
    /// `Range` header value, e.g. `bytes=0-5242879`
    pub range: Option<&'a str>,
    /// Specific object version to read
    pub version_id: Option<&'a str>,
}

/// Response from `GetObject`
pub struct GetObjectResponse {
    /// Object (or range) body
    pub body: Box<dyn AsyncRead + Send + Unpin>,
    /// Content type recorded on the object
    pub content_type: Option<String>,
    /// Length of this response's body
    pub content_length: Option<u64>,
    /// Raw `Content-Range` header for ranged requests
    pub content_range: Option<String>,
    /// ETag of the object
    pub etag: Option<String>,
    /// Last modification time of the object
    pub last_modified: Option<DateTime<Utc>>,
    /// Version ID of the object
    pub version_id: Option<String>,
}

/// Request for `CreateMultipartUpload`
#[derive(Debug, Clone)]
pub struct CreateMultipartUploadRequest<'a> {
    /// Target bucket
    pub bucket: &'a str,
    /// Target object key
    pub key: &'a str,
    /// Canned ACL to apply, if any
    pub acl: Option<&'a str>,
    /// Content type to record on the object
    pub content_type: Option<&'a str>,
}

/// Response from `CreateMultipartUpload`.
///
/// The upload ID is required: adapters translate a response without one
/// into [`TransferError::MissingUploadId`](crate::TransferError::MissingUploadId).
#[derive(Debug, Clone)]
pub struct CreateMultipartUploadResponse {
    /// Server-assigned token identifying the multipart upload
    pub upload_id: String,
}

/// Request for `UploadPart`
pub struct UploadPartRequest<'a> {
    /// Target bucket
    pub bucket: &'a str,
    /// Target object key
    pub key: &'a str,
    /// 1-indexed part number
    pub part_number: i32,
    /// Upload this part belongs to
    pub upload_id: &'a str,
    /// Part body, rewound to its start
    pub body: &'a mut dyn PartRead,
}

/// Response from `UploadPart`
#[derive(Debug, Clone, Default)]
pub struct UploadPartResponse {
    /// ETag the server assigned to this part
    pub etag: Option<String>,
}

/// A part acknowledged by the server, referenced when completing the upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-indexed part number
    pub part_number: i32,
    /// ETag returned by the corresponding `UploadPart`
    pub etag: Option<String>,
}

/// Request for `CompleteMultipartUpload`
pub struct CompleteMultipartUploadRequest<'a> {
    /// Target bucket
    pub bucket: &'a str,
    /// Target object key
    pub key: &'a str,
    /// Upload to complete
    pub upload_id: &'a str,
    /// All acknowledged parts, sorted ascending by part number
    pub parts: &'a [CompletedPart],
}

/// Response from `CompleteMultipartUpload`
#[derive(Debug, Clone, Default)]
pub struct CompleteMultipartUploadResponse {
    /// Version ID of the assembled object, on versioned buckets
    pub version_id: Option<String>,
    /// ETag of the assembled object
    pub etag: Option<String>,
    /// URL of the assembled object
    pub location: Option<String>,
}

/// Request for `AbortMultipartUpload`
#[derive(Debug, Clone)]
pub struct AbortMultipartUploadRequest<'a> {
    /// Target bucket
    pub bucket: &'a str,
    /// Target object key
    pub key: &'a str,
    /// Upload to abort
    pub upload_id: &'a str,
}

/// The six S3 operations the transfer engines depend on.
///
/// Implementations must be safe for concurrent use: one instance is shared
/// across every transfer started from the engines holding it.
#[async_trait]
pub trait S3Api: Send + Sync {
    /// Store a whole object in one call
    async fn put_object(&self, request: PutObjectRequest<'_>) -> Result<PutObjectResponse>;

    /// Read an object or a byte range of it
    async fn get_object(&self, request: GetObjectRequest<'_>) -> Result<GetObjectResponse>;

    /// Start a multipart upload
    async fn create_multipart_upload(
        &self,
        request: CreateMultipartUploadRequest<'_>,
    ) -> Result<CreateMultipartUploadResponse>;

    /// Upload one part of a multipart upload
    async fn upload_part(&self, request: UploadPartRequest<'_>) -> Result<UploadPartResponse>;

    /// Assemble a multipart upload from its acknowledged parts
    async fn complete_multipart_upload(
        &self,
        request: CompleteMultipartUploadRequest<'_>,
    ) -> Result<CompleteMultipartUploadResponse>;

    /// Discard an in-progress multipart upload and its parts
    async fn abort_multipart_upload(&self, request: AbortMultipartUploadRequest<'_>) -> Result<()>;
}
