//! Upload engine
//!
//! Drives the single-object or multipart upload state machine: slice the
//! input, push parts through the retry driver in order, then complete the
//! multipart upload, or abort it on terminal failure. Single-part inputs
//! short-circuit into one `PutObject`.

use std::io::SeekFrom;
use std::sync::Arc;

use tokio::io::AsyncSeekExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, TransferError};
use crate::pace::{ReadInterceptor, ReadInterceptorFactory};
use crate::retry::{
    with_retry, AttemptError, ErrorClassifier, ExponentialBackoffRetryerFactory, NaiveClassifier,
    Retryer, RetryerFactory,
};
use crate::s3api::{
    AbortMultipartUploadRequest, CompleteMultipartUploadRequest, CompletedPart,
    CreateMultipartUploadRequest, PartRead, PutObjectRequest, S3Api, UploadPartRequest,
};
use crate::slice::{DefaultUploadSlicerFactory, UploadBody, UploadSlicer, UploadSlicerFactory};
use crate::transfer::context::{CallOutcome, TransferHandle, TransferShared, TransferStatus};

/// What to upload and where to put it
pub struct UploadInput {
    /// Target bucket
    pub bucket: String,
    /// Target object key
    pub key: String,
    /// Canned ACL to apply, if any
    pub acl: Option<String>,
    /// Content type to record on the object
    pub content_type: Option<String>,
    /// The object's bytes
    pub body: UploadBody,
}

impl UploadInput {
    /// Minimal input: bucket, key, and body
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, body: UploadBody) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            acl: None,
            content_type: None,
            body,
        }
    }
}

/// Externally observable progress of one upload
#[derive(Debug, Clone, Default)]
pub struct UploadStatus {
    /// Total input size; `None` for one-shot streams, whose size is not
    /// known up front (percent-complete cannot be derived for those)
    pub size: Option<u64>,
    /// Bytes acknowledged by the server so far
    pub completed_size: u64,
    /// Attempts that failed and were retried
    pub num_retries: u32,
    /// Whether the transfer is paused
    pub paused: bool,
    /// Multipart upload ID, once `CreateMultipartUpload` succeeded
    pub upload_id: Option<String>,
}

impl TransferStatus for UploadStatus {
    fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    fn count_retry(&mut self) {
        self.num_retries += 1;
    }
}

/// Terminal output of a successful upload
#[derive(Debug, Clone, Default)]
pub struct UploadOutput {
    /// Version ID of the stored object, on versioned buckets
    pub version_id: Option<String>,
    /// ETag of the stored object
    pub etag: Option<String>,
    /// URL of the stored object
    pub location: Option<String>,
}

/// Handle on one running upload
pub type UploadHandle = TransferHandle<UploadStatus, UploadOutput>;

/// Configurable upload engine.
///
/// One engine is built once and shared; every [`upload`](Self::upload)
/// call starts an independent transfer against the same S3 capability.
pub struct Uploader {
    api: Arc<dyn S3Api>,
    retryer_factory: Arc<dyn RetryerFactory>,
    classifier: Arc<dyn ErrorClassifier>,
    slicer_factory: Arc<dyn UploadSlicerFactory>,
    interceptor_factory: Option<Arc<dyn ReadInterceptorFactory>>,
    force_pause: bool,
}

impl Uploader {
    /// Engine with default retry (exponential backoff), classification
    /// (naive), and slicing (5 MiB parts)
    pub fn new(api: Arc<dyn S3Api>) -> Self {
        Self {
            api,
            retryer_factory: Arc::new(ExponentialBackoffRetryerFactory::default()),
            classifier: Arc::new(NaiveClassifier),
            slicer_factory: Arc::new(DefaultUploadSlicerFactory::default()),
            interceptor_factory: None,
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

    /// Replace the input partitioner
    pub fn with_slicer_factory(mut self, factory: Arc<dyn UploadSlicerFactory>) -> Self {
        self.slicer_factory = factory;
        self
    }

    /// Pace upload reads through the given interceptor
    pub fn with_read_interceptor_factory(
        mut self,
        factory: Arc<dyn ReadInterceptorFactory>,
    ) -> Self {
        self.interceptor_factory = Some(factory);
        self
    }

    /// Make `pause()` cancel the in-flight remote call instead of letting
    /// it finish
    pub fn with_force_pause(mut self, force_pause: bool) -> Self {
        self.force_pause = force_pause;
        self
    }

    /// Start an upload; returns immediately with its handle.
    ///
    /// The transfer runs in a background task governed by `cancel`:
    /// cancelling the token is terminal and propagates into any in-flight
    /// remote call or backoff wait.
    pub async fn upload(
        &self,
        cancel: &CancellationToken,
        input: UploadInput,
    ) -> Result<UploadHandle> {
        let UploadInput {
            bucket,
            key,
            acl,
            content_type,
            body,
        } = input;

        let slicer = self.slicer_factory.make(body).await?;
        let status = UploadStatus {
            size: slicer.total_size(),
            ..Default::default()
        };
        let shared = Arc::new(TransferShared::new(
            bucket.clone(),
            key.clone(),
            self.force_pause,
            status,
        ));
        let retryer = self.retryer_factory.make(shared.clone());
        let interceptor = self.interceptor_factory.as_ref().map(|f| f.make());

        let worker = UploadWorker {
            api: self.api.clone(),
            classifier: self.classifier.clone(),
            retryer,
            shared: shared.clone(),
            cancel: cancel.clone(),
            interceptor,
            bucket,
            key,
            acl,
            content_type,
        };
        let task = tokio::spawn(worker.run(slicer));
        Ok(TransferHandle::new(shared, task))
    }
}

struct UploadWorker {
    api: Arc<dyn S3Api>,
    classifier: Arc<dyn ErrorClassifier>,
    retryer: Arc<dyn Retryer>,
    shared: Arc<TransferShared<UploadStatus, UploadOutput>>,
    cancel: CancellationToken,
    interceptor: Option<Arc<dyn ReadInterceptor>>,
    bucket: String,
    key: String,
    acl: Option<String>,
    content_type: Option<String>,
}

impl UploadWorker {
    async fn run(self, mut slicer: Box<dyn UploadSlicer>) {
        let (reader, last) = match slicer.next_part().await {
            Ok(part) => part,
            Err(err) => {
                self.shared.finish(Err(err));
                return;
            }
        };
        let reader = self.wrap(reader);

        // End-of-sequence on the very first part means the whole input fits
        // into one remote call.
        let result = if last {
            self.single(reader).await
        } else {
            self.multi(reader, slicer).await
        };
        self.shared.finish(result);
    }

    fn wrap(&self, reader: Box<dyn PartRead>) -> Box<dyn PartRead> {
        match &self.interceptor {
            Some(interceptor) => interceptor.wrap(reader),
            None => reader,
        }
    }

    async fn single(&self, mut reader: Box<dyn PartRead>) -> Result<UploadOutput> {
        let size = reader.seek(SeekFrom::End(0)).await?;
        let response = with_retry(
            &self.cancel,
            0,
            &*self.retryer,
            &*self.classifier,
            || async {
                self.shared.pause_check(&self.cancel).await;
                if self.cancel.is_cancelled() {
                    return Err(AttemptError::Plain(TransferError::Cancelled));
                }
                // Slicers hand out rewindable readers; a failing seek means
                // the input itself is gone and no retry can help.
                reader
                    .rewind()
                    .await
                    .map_err(|err| AttemptError::Fatal(err.into()))?;
                let call = self.api.put_object(PutObjectRequest {
                    bucket: &self.bucket,
                    key: &self.key,
                    acl: self.acl.as_deref(),
                    body: &mut *reader,
                    content_type: self.content_type.as_deref(),
                });
                match self.shared.guarded_call(&self.cancel, call).await {
                    CallOutcome::Done(Ok(response)) => Ok(response),
                    CallOutcome::Done(Err(err)) => {
                        self.shared.count_retry();
                        Err(AttemptError::Plain(err))
                    }
                    CallOutcome::ForcePaused => {
                        Err(AttemptError::Retryable(TransferError::ForcePaused))
                    }
                    CallOutcome::Cancelled => Err(AttemptError::Plain(TransferError::Cancelled)),
                }
            },
        )
        .await?;

        self.shared.update_status(|status| status.completed_size = size);
        Ok(UploadOutput {
            version_id: response.version_id,
            etag: response.etag,
            location: response.location,
        })
    }

    async fn multi(
        &self,
        first: Box<dyn PartRead>,
        mut slicer: Box<dyn UploadSlicer>,
    ) -> Result<UploadOutput> {
        let upload_id = self.create().await?;

        let parts = match self.upload_parts(&upload_id, first, &mut slicer).await {
            Ok(parts) => parts,
            Err(err) => {
                self.abort(&upload_id).await;
                return Err(err);
            }
        };

        match self.complete(&upload_id, parts).await {
            Ok(output) => Ok(output),
            Err(err) => {
                self.abort(&upload_id).await;
                Err(err)
            }
        }
    }

    async fn create(&self) -> Result<String> {
        with_retry(
            &self.cancel,
            0,
            &*self.retryer,
            &*self.classifier,
            || async {
                self.shared.pause_check(&self.cancel).await;
                if self.cancel.is_cancelled() {
                    return Err(AttemptError::Plain(TransferError::Cancelled));
                }
                let call = self.api.create_multipart_upload(CreateMultipartUploadRequest {
                    bucket: &self.bucket,
                    key: &self.key,
                    acl: self.acl.as_deref(),
                    content_type: self.content_type.as_deref(),
                });
                let response = tokio::select! {
                    response = call => response,
                    _ = self.cancel.cancelled() => {
                        return Err(AttemptError::Plain(TransferError::Cancelled));
                    }
                };
                match response {
                    Ok(response) => {
                        self.shared.update_status(|status| {
                            status.upload_id = Some(response.upload_id.clone());
                        });
                        debug!(upload_id = %response.upload_id, "multipart upload created");
                        Ok(response.upload_id)
                    }
                    Err(err) => {
                        self.shared.count_retry();
                        Err(AttemptError::Plain(err))
                    }
                }
            },
        )
        .await
    }

    async fn upload_parts(
        &self,
        upload_id: &str,
        first: Box<dyn PartRead>,
        slicer: &mut Box<dyn UploadSlicer>,
    ) -> Result<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        let mut reader = first;
        let mut last = false;
        let mut part_number: i32 = 1;

        loop {
            let size = reader.seek(SeekFrom::End(0)).await?;
            if size == 0 {
                // Empty tail produced by an exactly part-sized stream.
                break;
            }

            let etag = with_retry(
                &self.cancel,
                i64::from(part_number),
                &*self.retryer,
                &*self.classifier,
                || async {
                    self.shared.pause_check(&self.cancel).await;
                    if self.cancel.is_cancelled() {
                        return Err(AttemptError::Plain(TransferError::Cancelled));
                    }
                    reader
                        .rewind()
                        .await
                        .map_err(|err| AttemptError::Fatal(err.into()))?;
                    let call = self.api.upload_part(UploadPartRequest {
                        bucket: &self.bucket,
                        key: &self.key,
                        part_number,
                        upload_id,
                        body: &mut *reader,
                    });
                    match self.shared.guarded_call(&self.cancel, call).await {
                        CallOutcome::Done(Ok(response)) => Ok(response.etag),
                        CallOutcome::Done(Err(err)) => {
                            self.shared.count_retry();
                            Err(AttemptError::Plain(err))
                        }
                        CallOutcome::ForcePaused => {
                            Err(AttemptError::Retryable(TransferError::ForcePaused))
                        }
                        CallOutcome::Cancelled => {
                            Err(AttemptError::Plain(TransferError::Cancelled))
                        }
                    }
                },
            )
            .await?;

            parts.push(CompletedPart { part_number, etag });
            self.shared
                .update_status(|status| status.completed_size += size);

            if last {
                break;
            }

            // Return the part buffer to the pool before blocking on the
            // barrier or filling the next part.
            drop(reader);
            self.shared.pause_check(&self.cancel).await;
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }

            let (next, next_last) = slicer.next_part().await?;
            reader = self.wrap(next);
            last = next_last;
            part_number += 1;
        }

        // Sequential upload keeps these ordered already; retries only
        // touch bookkeeping, but completion requires ascending order.
        parts.sort_by_key(|part| part.part_number);
        Ok(parts)
    }

    async fn complete(&self, upload_id: &str, parts: Vec<CompletedPart>) -> Result<UploadOutput> {
        let response = with_retry(
            &self.cancel,
            -1,
            &*self.retryer,
            &*self.classifier,
            || async {
                self.shared.pause_check(&self.cancel).await;
                if self.cancel.is_cancelled() {
                    return Err(AttemptError::Plain(TransferError::Cancelled));
                }
                let call = self.api.complete_multipart_upload(CompleteMultipartUploadRequest {
                    bucket: &self.bucket,
                    key: &self.key,
                    upload_id,
                    parts: &parts,
                });
                let response = tokio::select! {
                    response = call => response,
                    _ = self.cancel.cancelled() => {
                        return Err(AttemptError::Plain(TransferError::Cancelled));
                    }
                };
                match response {
                    Ok(response) => Ok(response),
                    Err(err) => {
                        self.shared.count_retry();
                        Err(AttemptError::Plain(err))
                    }
                }
            },
        )
        .await?;

        Ok(UploadOutput {
            version_id: response.version_id,
            etag: response.etag,
            location: response.location,
        })
    }

    /// Best-effort cleanup of a failed multipart upload. Runs to completion
    /// regardless of the transfer's cancellation state; its own failure is
    /// swallowed so it never overrides the terminal error.
    async fn abort(&self, upload_id: &str) {
        let result = self
            .api
            .abort_multipart_upload(AbortMultipartUploadRequest {
                bucket: &self.bucket,
                key: &self.key,
                upload_id,
            })
            .await;
        if let Err(err) = result {
            warn!(
                bucket = %self.bucket,
                key = %self.key,
                error = %err,
                "failed to abort multipart upload"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::testutil::{test_data, MockS3, PartGate};
    use std::io::SeekFrom;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

    fn quick_retryer(retry_max: u32) -> Arc<dyn RetryerFactory> {
        Arc::new(ExponentialBackoffRetryerFactory {
            wait_base: Duration::from_millis(1),
            wait_max: Duration::from_millis(1),
            retry_max,
        })
    }

    fn uploader(api: &Arc<MockS3>, part_size: u64, retry_max: u32) -> Uploader {
        Uploader::new(api.clone())
            .with_retryer_factory(quick_retryer(retry_max))
            .with_slicer_factory(Arc::new(DefaultUploadSlicerFactory {
                part_size,
                ..Default::default()
            }))
    }

    #[tokio::test]
    async fn test_single_part_success() {
        let data = test_data(128);
        let api = MockS3::new();
        let engine = uploader(&api, 128, 0);

        let handle = engine
            .upload(
                &CancellationToken::new(),
                UploadInput::new("bucket", "key", UploadBody::from_bytes(data.clone())),
            )
            .await
            .unwrap();
        handle.done().await;

        let output = handle.result().unwrap().unwrap();
        assert_eq!(output.etag.as_deref(), Some("TAG1"));
        assert_eq!(api.create_calls(), 0);
        assert_eq!(api.put_calls(), 1);
        assert_eq!(api.upload_part_calls(), 0);
        assert_eq!(*api.object.lock().unwrap(), data);

        let status = handle.status();
        assert_eq!(status.size, Some(128));
        assert_eq!(status.completed_size, 128);
        assert_eq!(status.num_retries, 0);
    }

    #[tokio::test]
    async fn test_multipart_success() {
        let data = test_data(128);
        let api = MockS3::new();
        let engine = uploader(&api, 50, 0);

        let handle = engine
            .upload(
                &CancellationToken::new(),
                UploadInput::new("bucket", "key", UploadBody::from_bytes(data.clone())),
            )
            .await
            .unwrap();
        handle.done().await;

        let output = handle.result().unwrap().unwrap();
        assert_eq!(api.create_calls(), 1);
        assert_eq!(api.upload_part_calls(), 3);
        assert_eq!(api.complete_calls(), 1);
        assert_eq!(api.put_calls(), 0);
        assert_eq!(api.abort_calls(), 0);
        // Parts TAG1..TAG3, completion gets TAG4.
        assert_eq!(output.etag.as_deref(), Some("TAG4"));
        assert_eq!(*api.object.lock().unwrap(), data);

        let completed = api.completed_parts.lock().unwrap().clone();
        assert_eq!(
            completed
                .iter()
                .map(|p| (p.part_number, p.etag.clone().unwrap()))
                .collect::<Vec<_>>(),
            vec![
                (1, "TAG1".to_string()),
                (2, "TAG2".to_string()),
                (3, "TAG3".to_string()),
            ]
        );

        let status = handle.status();
        assert_eq!(status.completed_size, 128);
        assert_eq!(status.upload_id.as_deref(), Some("UPLOAD1"));
    }

    #[tokio::test]
    async fn test_multipart_transient_on_part_two() {
        let data = test_data(128);
        let api = MockS3::new();
        api.fail_upload_part(2, 1);
        let engine = uploader(&api, 50, 1);

        let handle = engine
            .upload(
                &CancellationToken::new(),
                UploadInput::new("bucket", "key", UploadBody::from_bytes(data.clone())),
            )
            .await
            .unwrap();
        handle.done().await;

        assert!(handle.result().unwrap().is_ok());
        assert_eq!(api.upload_part_calls(), 4);
        assert_eq!(api.abort_calls(), 0);
        assert_eq!(handle.status().num_retries, 1);
        assert_eq!(*api.object.lock().unwrap(), data);
    }

    #[tokio::test]
    async fn test_multipart_complete_exhausts_retries_and_aborts() {
        let data = test_data(128);
        let api = MockS3::new();
        api.fail_complete(2);
        let engine = uploader(&api, 50, 1);

        let handle = engine
            .upload(
                &CancellationToken::new(),
                UploadInput::new("bucket", "key", UploadBody::from_bytes(data)),
            )
            .await
            .unwrap();
        handle.done().await;

        let err = handle.result().unwrap().unwrap_err();
        assert!(matches!(&*err, TransferError::RetryExhausted { .. }));
        assert!(
            matches!(err.root(), TransferError::Api { operation, .. } if *operation == "CompleteMultipartUpload")
        );
        assert_eq!(api.complete_calls(), 2);
        assert_eq!(api.abort_calls(), 1);
    }

    #[tokio::test]
    async fn test_streaming_input_multipart() {
        let data = test_data(128);
        let api = MockS3::new();
        let engine = uploader(&api, 50, 0);

        let body = UploadBody::streaming(std::io::Cursor::new(data.clone()));
        let handle = engine
            .upload(
                &CancellationToken::new(),
                UploadInput::new("bucket", "key", body),
            )
            .await
            .unwrap();
        // Size is unknown for one-shot streams.
        assert_eq!(handle.status().size, None);
        handle.done().await;

        assert!(handle.result().unwrap().is_ok());
        assert_eq!(api.upload_part_calls(), 3);
        assert_eq!(*api.object.lock().unwrap(), data);
        assert_eq!(handle.status().completed_size, 128);
    }

    #[tokio::test]
    async fn test_pause_resume_during_multipart() {
        let data = test_data(128);
        let api = MockS3::new();
        let (gate, mut events, acks) = PartGate::new();
        api.install_part_gate(gate);
        let engine = uploader(&api, 50, 0);

        let handle = engine
            .upload(
                &CancellationToken::new(),
                UploadInput::new("bucket", "key", UploadBody::from_bytes(data.clone())),
            )
            .await
            .unwrap();

        // Pause while part 1 is still inside the mock, then let it return:
        // the engine must park at the barrier before touching part 2.
        assert_eq!(events.recv().await.unwrap(), 1);
        handle.pause();
        acks.send(()).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(api.upload_part_calls(), 1);
        assert!(handle.status().paused);
        assert!(!handle.is_done());

        handle.resume();
        for expected in [2, 3] {
            assert_eq!(events.recv().await.unwrap(), expected);
            acks.send(()).unwrap();
        }
        handle.done().await;

        assert!(handle.result().unwrap().is_ok());
        assert_eq!(api.upload_part_calls(), 3);
        assert_eq!(api.complete_calls(), 1);
        assert_eq!(*api.object.lock().unwrap(), data);
    }

    #[tokio::test]
    async fn test_force_pause_cancels_in_flight_part() {
        let data = test_data(128);
        let api = MockS3::new();
        api.set_part_delay(Duration::from_millis(200));
        let engine = uploader(&api, 50, 2).with_force_pause(true);

        let handle = engine
            .upload(
                &CancellationToken::new(),
                UploadInput::new("bucket", "key", UploadBody::from_bytes(data.clone())),
            )
            .await
            .unwrap();

        // Give part 1 time to get in flight, then force-pause it away.
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.pause();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!handle.is_done());

        api.set_part_delay(Duration::ZERO);
        handle.resume();
        handle.done().await;

        assert!(handle.result().unwrap().is_ok());
        // The cancelled attempt ran the mock once, its retry once more.
        assert_eq!(api.upload_part_calls(), 4);
        assert_eq!(*api.object.lock().unwrap(), data);
        // Force-pause is not an error; no retry was counted for it.
        assert_eq!(handle.status().num_retries, 0);
    }

    #[tokio::test]
    async fn test_cancellation_is_terminal() {
        let data = test_data(128);
        let api = MockS3::new();
        let engine = uploader(&api, 50, 8);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let handle = engine
            .upload(&cancel, UploadInput::new("bucket", "key", UploadBody::from_bytes(data)))
            .await
            .unwrap();
        handle.done().await;

        let err = handle.result().unwrap().unwrap_err();
        assert!(err.is_cancelled());
    }

    /// Reader whose seeks start failing after construction-time probing,
    /// exercising the fatal input path.
    struct BrokenSeekReader {
        inner: std::io::Cursor<Vec<u8>>,
        seeks_allowed: u32,
    }

    impl AsyncRead for BrokenSeekReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncSeek for BrokenSeekReader {
        fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> std::io::Result<()> {
            if self.seeks_allowed == 0 {
                return Err(std::io::Error::other("seek failed"));
            }
            self.seeks_allowed -= 1;
            Pin::new(&mut self.inner).start_seek(position)
        }

        fn poll_complete(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<u64>> {
            Pin::new(&mut self.inner).poll_complete(cx)
        }
    }

    #[tokio::test]
    async fn test_seek_failure_is_fatal() {
        let api = MockS3::new();
        let engine = uploader(&api, 256, 8);

        // Three seeks succeed: the factory's size probe (end + rewind) and
        // the engine's own size probe. The retry-loop rewind then fails.
        let body = UploadBody::seekable(BrokenSeekReader {
            inner: std::io::Cursor::new(test_data(128)),
            seeks_allowed: 3,
        });
        let handle = engine
            .upload(&CancellationToken::new(), UploadInput::new("bucket", "key", body))
            .await
            .unwrap();
        handle.done().await;

        let err = handle.result().unwrap().unwrap_err();
        assert!(matches!(&*err, TransferError::Io(_)));
        // Fatal errors short-circuit the driver: no attempt reached S3.
        assert_eq!(api.put_calls(), 0);
        assert_eq!(handle.status().num_retries, 0);
    }
}
