//! Download engine
//!
//! Drives the multi-range download state machine: request successive byte
//! ranges through the retry driver, verify each response's Content-Range
//! against the request, watch for mid-transfer ETag drift, and write part
//! bodies at their offsets in the sink.

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::error::TransferError;
use crate::range::ContentRange;
use crate::retry::{
    with_retry, AttemptError, ErrorClassifier, ExponentialBackoffRetryerFactory, NaiveClassifier,
    Retryer, RetryerFactory,
};
use crate::s3api::{GetObjectRequest, S3Api};
use crate::slice::{
    DefaultDownloadSlicerFactory, DownloadSlicer, DownloadSlicerFactory, WriteAt,
};
use crate::transfer::context::{CallOutcome, TransferHandle, TransferShared, TransferStatus};

/// What to download
#[derive(Debug, Clone)]
pub struct DownloadInput {
    /// Source bucket
    pub bucket: String,
    /// Source object key
    pub key: String,
    /// Specific object version to read, if any
    pub version_id: Option<String>,
}

impl DownloadInput {
    /// Input for the latest version of `bucket`/`key`
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            version_id: None,
        }
    }
}

/// Externally observable progress of one download
#[derive(Debug, Clone, Default)]
pub struct DownloadStatus {
    /// Total object size, from the first Content-Range response
    pub size: Option<u64>,
    /// Bytes written to the sink so far
    pub completed_size: u64,
    /// Attempts that failed and were retried
    pub num_retries: u32,
    /// Whether the transfer is paused
    pub paused: bool,
    /// ETag recorded from the first response; later drift is fatal
    pub etag: Option<String>,
    /// Content type of the object
    pub content_type: Option<String>,
    /// Last modification time of the object
    pub last_modified: Option<DateTime<Utc>>,
    /// Version ID of the object being read
    pub version_id: Option<String>,
}

impl TransferStatus for DownloadStatus {
    fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    fn count_retry(&mut self) {
        self.num_retries += 1;
    }
}

/// Terminal output of a successful download
#[derive(Debug, Clone, Default)]
pub struct DownloadOutput {
    /// ETag of the downloaded object
    pub etag: Option<String>,
    /// Content type of the downloaded object
    pub content_type: Option<String>,
    /// Last modification time of the downloaded object
    pub last_modified: Option<DateTime<Utc>>,
    /// Version ID of the downloaded object
    pub version_id: Option<String>,
}

/// Handle on one running download
pub type DownloadHandle = TransferHandle<DownloadStatus, DownloadOutput>;

/// Configurable download engine
pub struct Downloader {
    api: Arc<dyn S3Api>,
    retryer_factory: Arc<dyn RetryerFactory>,
    classifier: Arc<dyn ErrorClassifier>,
    slicer_factory: Arc<dyn DownloadSlicerFactory>,
    force_pause: bool,
}

impl Downloader {
    /// Engine with default retry (exponential backoff), classification
    /// (naive), and ranging (5 MiB parts)
    pub fn new(api: Arc<dyn S3Api>) -> Self {
        Self {
            api,
            retryer_factory: Arc::new(ExponentialBackoffRetryerFactory::default()),
            classifier: Arc::new(NaiveClassifier),
            slicer_factory: Arc::new(DefaultDownloadSlicerFactory::default()),
            force_pause: false,
        }
    }

    /// Replace the retry policy
    pub fn with_retryer_factory(mut self, factory: Arc<dyn RetryerFactory>) -> Self {
        self.retryer_factory = factory;
        self
    }

    /// Replace the error classifier
    pub fn with_error_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replace the range allocator
    pub fn with_slicer_factory(mut self, factory: Arc<dyn DownloadSlicerFactory>) -> Self {
        self.slicer_factory = factory;
        self
    }

    /// Make `pause()` cancel the in-flight remote call instead of letting
    /// it finish
    pub fn with_force_pause(mut self, force_pause: bool) -> Self {
        self.force_pause = force_pause;
        self
    }

    /// Start a download into `sink`; returns immediately with its handle.
    ///
    /// The transfer runs in a background task governed by `cancel`. Part
    /// `i`'s bytes are fully written to the sink before part `i + 1`'s
    /// range is requested.
    pub fn download(
        &self,
        cancel: &CancellationToken,
        sink: Arc<dyn WriteAt>,
        input: DownloadInput,
    ) -> DownloadHandle {
        let DownloadInput {
            bucket,
            key,
            version_id,
        } = input;

        let status = DownloadStatus {
            version_id: version_id.clone(),
            ..Default::default()
        };
        let shared = Arc::new(TransferShared::new(
            bucket.clone(),
            key.clone(),
            self.force_pause,
            status,
        ));
        let retryer = self.retryer_factory.make(shared.clone());
        let slicer = self.slicer_factory.make(sink);

        let worker = DownloadWorker {
            api: self.api.clone(),
            classifier: self.classifier.clone(),
            retryer,
            shared: shared.clone(),
            cancel: cancel.clone(),
            bucket,
            key,
            version_id,
        };
        let task = tokio::spawn(worker.run(slicer));
        TransferHandle::new(shared, task)
    }
}

struct DownloadWorker {
    api: Arc<dyn S3Api>,
    classifier: Arc<dyn ErrorClassifier>,
    retryer: Arc<dyn Retryer>,
    shared: Arc<TransferShared<DownloadStatus, DownloadOutput>>,
    cancel: CancellationToken,
    bucket: String,
    key: String,
    version_id: Option<String>,
}

impl DownloadWorker {
    async fn run(self, mut slicer: Box<dyn DownloadSlicer>) {
        let mut part_index: i64 = 1;
        loop {
            let (mut writer, requested) = slicer.next_writer();
            let copied = with_retry(
                &self.cancel,
                part_index,
                &*self.retryer,
                &*self.classifier,
                || async {
                    self.shared.pause_check(&self.cancel).await;
                    if self.cancel.is_cancelled() {
                        return Err(AttemptError::Plain(TransferError::Cancelled));
                    }

                    let range_header = requested.to_string();
                    let call = self.api.get_object(GetObjectRequest {
                        bucket: &self.bucket,
                        key: &self.key,
                        range: Some(&range_header),
                        version_id: self.version_id.as_deref(),
                    });
                    let response = match self.shared.guarded_call(&self.cancel, call).await {
                        CallOutcome::Done(Ok(response)) => response,
                        CallOutcome::Done(Err(err)) => {
                            self.shared.count_retry();
                            return Err(AttemptError::Plain(err));
                        }
                        CallOutcome::ForcePaused => {
                            return Err(AttemptError::Retryable(TransferError::ForcePaused));
                        }
                        CallOutcome::Cancelled => {
                            return Err(AttemptError::Plain(TransferError::Cancelled));
                        }
                    };

                    // A malformed or misaligned Content-Range is a server
                    // quirk: retried regardless of the classifier.
                    let header = match response.content_range.as_deref() {
                        Some(header) => header,
                        None => {
                            self.shared.count_retry();
                            return Err(AttemptError::Retryable(
                                TransferError::MissingContentRange,
                            ));
                        }
                    };
                    let returned: ContentRange = match header.parse() {
                        Ok(returned) => returned,
                        Err(err) => {
                            self.shared.count_retry();
                            return Err(AttemptError::Retryable(TransferError::Range(err)));
                        }
                    };
                    if returned.start() != Some(requested.start) {
                        self.shared.count_retry();
                        return Err(AttemptError::Retryable(
                            TransferError::UnexpectedServerResponse {
                                requested,
                                returned,
                            },
                        ));
                    }

                    // First response fixes the object's identity; a later
                    // response disagreeing on the ETag means the object
                    // changed under us.
                    let mut drift = None;
                    self.shared.update_status(|status| {
                        if status.etag.is_some() && status.etag != response.etag {
                            drift = Some(TransferError::ChangedDuringDownload {
                                initial: status.etag.clone(),
                                current: response.etag.clone(),
                            });
                            return;
                        }
                        status.size = returned.size;
                        status.content_type = response.content_type.clone();
                        status.etag = response.etag.clone();
                        status.last_modified = response.last_modified;
                        status.version_id = response.version_id.clone();
                    });
                    if let Some(err) = drift {
                        return Err(AttemptError::Fatal(err));
                    }

                    // Copy the body into the part's slot. Failures on
                    // either side are fatal: a broken body cannot be
                    // trusted to restart mid-part, a broken sink cannot
                    // accept a retry.
                    let mut body = response.body;
                    let mut buf = vec![0u8; 64 * 1024];
                    let mut copied: u64 = 0;
                    loop {
                        let n = body
                            .read(&mut buf)
                            .await
                            .map_err(|err| AttemptError::Fatal(err.into()))?;
                        if n == 0 {
                            break;
                        }
                        writer
                            .write_all(&buf[..n])
                            .map_err(|err| AttemptError::Fatal(err.into()))?;
                        copied += n as u64;
                    }
                    Ok(copied)
                },
            )
            .await;

            let copied = match copied {
                Ok(copied) => copied,
                Err(err) => {
                    self.shared.finish(Err(err));
                    return;
                }
            };

            let mut done = false;
            self.shared.update_status(|status| {
                status.completed_size += copied;
                // An unknown total (`*` in every Content-Range) leaves no
                // way to ask for more; treat the object as fully read.
                done = match status.size {
                    Some(size) => status.completed_size >= size,
                    None => true,
                };
            });

            if done {
                let output = self.shared.read_status(|status| DownloadOutput {
                    etag: status.etag.clone(),
                    content_type: status.content_type.clone(),
                    last_modified: status.last_modified,
                    version_id: status.version_id.clone(),
                });
                self.shared.finish(Ok(output));
                return;
            }
            part_index += 1;
        }
    }
}
