//! Test support: an in-memory scriptable S3 and a positional buffer sink.
//!
//! The mock records call counts and uploaded bytes, serves ranged reads
//! from an in-memory object, and can be scripted to fail specific calls,
//! delay part calls, answer with misaligned ranges, or hand out a
//! different ETag per request.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use crate::error::{Result, TransferError};
use crate::range::{ContentRange, PartRange};
use crate::s3api::{
    AbortMultipartUploadRequest, CompleteMultipartUploadRequest, CompleteMultipartUploadResponse,
    CompletedPart, CreateMultipartUploadRequest, CreateMultipartUploadResponse, GetObjectRequest,
    GetObjectResponse, PutObjectRequest, PutObjectResponse, S3Api, UploadPartRequest,
    UploadPartResponse,
};
use crate::slice::WriteAt;

/// Deterministic non-repeating test payload
pub(crate) fn test_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// In-memory positional sink for download tests
pub(crate) struct SharedBuf(Mutex<Vec<u8>>);

impl SharedBuf {
    pub(crate) fn new() -> Self {
        Self(Mutex::new(Vec::new()))
    }

    pub(crate) fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl WriteAt for SharedBuf {
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        let mut data = self.0.lock().unwrap();
        let end = offset as usize + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[offset as usize..end].copy_from_slice(buf);
        Ok(buf.len())
    }
}

/// Rendezvous making pause tests deterministic: the mock reports each
/// acknowledged part and holds the call open until the test acks it.
pub(crate) struct PartGate {
    events: mpsc::UnboundedSender<i32>,
    acks: tokio::sync::Mutex<mpsc::UnboundedReceiver<()>>,
}

impl PartGate {
    /// Returns the gate plus the test's event receiver and ack sender
    pub(crate) fn new() -> (
        Self,
        mpsc::UnboundedReceiver<i32>,
        mpsc::UnboundedSender<()>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        (
            Self {
                events: event_tx,
                acks: tokio::sync::Mutex::new(ack_rx),
            },
            event_rx,
            ack_tx,
        )
    }

    async fn hold(&self, part_number: i32) {
        if self.events.send(part_number).is_ok() {
            self.acks.lock().await.recv().await;
        }
    }
}

/// Scriptable in-memory S3
pub(crate) struct MockS3 {
    /// Bytes received across PutObject and acknowledged UploadPart calls
    pub(crate) object: Mutex<Vec<u8>>,
    /// Parts referenced by the CompleteMultipartUpload call
    pub(crate) completed_parts: Mutex<Vec<CompletedPart>>,
    /// Version IDs seen on GetObject requests
    pub(crate) seen_version_ids: Mutex<Vec<Option<String>>>,

    put_calls: AtomicUsize,
    get_calls: AtomicUsize,
    create_calls: AtomicUsize,
    upload_part_calls: AtomicUsize,
    complete_calls: AtomicUsize,
    abort_calls: AtomicUsize,

    etag_seq: AtomicU32,
    upload_seq: AtomicU32,

    fail_upload_part: Mutex<HashMap<i32, u32>>,
    fail_complete: AtomicU32,
    fail_create: AtomicU32,
    fail_put: AtomicU32,
    fail_get: AtomicU32,

    /// Latency injected into part-level calls (UploadPart, GetObject)
    part_delay: Mutex<Duration>,
    part_gate: Mutex<Option<Arc<PartGate>>>,

    download_object: Mutex<Vec<u8>>,
    etags: Mutex<Vec<String>>,
    unknown_size: AtomicU32,
    wrong_start: Mutex<HashSet<usize>>,
}

impl MockS3 {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            object: Mutex::new(Vec::new()),
            completed_parts: Mutex::new(Vec::new()),
            seen_version_ids: Mutex::new(Vec::new()),
            put_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            upload_part_calls: AtomicUsize::new(0),
            complete_calls: AtomicUsize::new(0),
            abort_calls: AtomicUsize::new(0),
            etag_seq: AtomicU32::new(0),
            upload_seq: AtomicU32::new(0),
            fail_upload_part: Mutex::new(HashMap::new()),
            fail_complete: AtomicU32::new(0),
            fail_create: AtomicU32::new(0),
            fail_put: AtomicU32::new(0),
            fail_get: AtomicU32::new(0),
            part_delay: Mutex::new(Duration::ZERO),
            part_gate: Mutex::new(None),
            download_object: Mutex::new(Vec::new()),
            etags: Mutex::new(vec!["TAG0".to_string()]),
            unknown_size: AtomicU32::new(0),
            wrong_start: Mutex::new(HashSet::new()),
        })
    }

    pub(crate) fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn upload_part_calls(&self) -> usize {
        self.upload_part_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn abort_calls(&self) -> usize {
        self.abort_calls.load(Ordering::SeqCst)
    }

    /// Fail the next `times` UploadPart calls for `part_number`
    pub(crate) fn fail_upload_part(&self, part_number: i32, times: u32) {
        self.fail_upload_part
            .lock()
            .unwrap()
            .insert(part_number, times);
    }

    /// Fail the next `times` CompleteMultipartUpload calls
    pub(crate) fn fail_complete(&self, times: u32) {
        self.fail_complete.store(times, Ordering::SeqCst);
    }

    /// Fail the next `times` CreateMultipartUpload calls
    #[allow(dead_code)]
    pub(crate) fn fail_create(&self, times: u32) {
        self.fail_create.store(times, Ordering::SeqCst);
    }

    /// Fail the next `times` PutObject calls
    #[allow(dead_code)]
    pub(crate) fn fail_put(&self, times: u32) {
        self.fail_put.store(times, Ordering::SeqCst);
    }

    /// Fail the next `times` GetObject calls
    pub(crate) fn fail_get(&self, times: u32) {
        self.fail_get.store(times, Ordering::SeqCst);
    }

    /// Inject latency into UploadPart and GetObject calls
    pub(crate) fn set_part_delay(&self, delay: Duration) {
        *self.part_delay.lock().unwrap() = delay;
    }

    /// Hold each acknowledged UploadPart open until the test acks it
    pub(crate) fn install_part_gate(&self, gate: PartGate) {
        *self.part_gate.lock().unwrap() = Some(Arc::new(gate));
    }

    /// Serve `data` for ranged GetObject calls; the n-th call gets the
    /// n-th ETag (the last one repeats)
    pub(crate) fn set_download_object(&self, data: Vec<u8>, etags: &[&str]) {
        *self.download_object.lock().unwrap() = data;
        *self.etags.lock().unwrap() = etags.iter().map(|s| s.to_string()).collect();
    }

    /// Answer every GetObject with `*` for the total size
    pub(crate) fn report_unknown_size(&self) {
        self.unknown_size.store(1, Ordering::SeqCst);
    }

    /// Answer the GetObject call with index `idx` (0-based) with a range
    /// starting one byte past the requested offset
    pub(crate) fn answer_with_wrong_start(&self, idx: usize) {
        self.wrong_start.lock().unwrap().insert(idx);
    }

    fn next_etag(&self) -> String {
        format!("TAG{}", self.etag_seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn take_failure(&self, remaining: &AtomicU32) -> bool {
        remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn part_latency(&self) {
        let delay = *self.part_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl S3Api for MockS3 {
    async fn put_object(&self, request: PutObjectRequest<'_>) -> Result<PutObjectResponse> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let mut body = Vec::new();
        request
            .body
            .read_to_end(&mut body)
            .await
            .map_err(TransferError::from)?;
        if self.take_failure(&self.fail_put) {
            return Err(TransferError::api("PutObject", "injected failure"));
        }
        self.object.lock().unwrap().extend_from_slice(&body);
        Ok(PutObjectResponse {
            etag: Some(self.next_etag()),
            ..Default::default()
        })
    }

    async fn get_object(&self, request: GetObjectRequest<'_>) -> Result<GetObjectResponse> {
        let idx = self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.part_latency().await;
        self.seen_version_ids
            .lock()
            .unwrap()
            .push(request.version_id.map(str::to_string));
        if self.take_failure(&self.fail_get) {
            return Err(TransferError::api("GetObject", "injected failure"));
        }

        let data = self.download_object.lock().unwrap().clone();
        let total = data.len() as u64;
        let requested: PartRange = request
            .range
            .expect("mock only serves ranged requests")
            .parse()
            .expect("engine produced an unparsable range");

        let mut start = requested.start;
        if self.wrong_start.lock().unwrap().remove(&idx) {
            start += 1;
        }
        let end = requested.end.min(total.saturating_sub(1));
        let body = data[start as usize..=end as usize].to_vec();

        let etags = self.etags.lock().unwrap();
        let etag = etags
            .get(idx)
            .or_else(|| etags.last())
            .cloned()
            .expect("mock needs at least one etag");

        let content_range = if self.unknown_size.load(Ordering::SeqCst) != 0 {
            ContentRange {
                unit: Default::default(),
                span: Some((start, end)),
                size: None,
            }
        } else {
            ContentRange::bytes(start, end, total)
        };

        Ok(GetObjectResponse {
            content_length: Some(body.len() as u64),
            body: Box::new(std::io::Cursor::new(body)),
            content_type: Some("application/octet-stream".to_string()),
            content_range: Some(content_range.to_string()),
            etag: Some(etag),
            last_modified: Some(chrono::Utc::now()),
            version_id: request.version_id.map(str::to_string),
        })
    }

    async fn create_multipart_upload(
        &self,
        _request: CreateMultipartUploadRequest<'_>,
    ) -> Result<CreateMultipartUploadResponse> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_failure(&self.fail_create) {
            return Err(TransferError::api(
                "CreateMultipartUpload",
                "injected failure",
            ));
        }
        Ok(CreateMultipartUploadResponse {
            upload_id: format!("UPLOAD{}", self.upload_seq.fetch_add(1, Ordering::SeqCst) + 1),
        })
    }

    async fn upload_part(&self, request: UploadPartRequest<'_>) -> Result<UploadPartResponse> {
        self.upload_part_calls.fetch_add(1, Ordering::SeqCst);
        self.part_latency().await;
        let mut body = Vec::new();
        request
            .body
            .read_to_end(&mut body)
            .await
            .map_err(TransferError::from)?;

        let should_fail = {
            let mut plan = self.fail_upload_part.lock().unwrap();
            match plan.get_mut(&request.part_number) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if should_fail {
            return Err(TransferError::api("UploadPart", "injected failure"));
        }

        self.object.lock().unwrap().extend_from_slice(&body);
        let etag = self.next_etag();

        let gate = self.part_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.hold(request.part_number).await;
        }
        Ok(UploadPartResponse { etag: Some(etag) })
    }

    async fn complete_multipart_upload(
        &self,
        request: CompleteMultipartUploadRequest<'_>,
    ) -> Result<CompleteMultipartUploadResponse> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_failure(&self.fail_complete) {
            return Err(TransferError::api(
                "CompleteMultipartUpload",
                "injected failure",
            ));
        }
        *self.completed_parts.lock().unwrap() = request.parts.to_vec();
        Ok(CompleteMultipartUploadResponse {
            etag: Some(self.next_etag()),
            ..Default::default()
        })
    }

    async fn abort_multipart_upload(
        &self,
        _request: AbortMultipartUploadRequest<'_>,
    ) -> Result<()> {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
