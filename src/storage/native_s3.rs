//! Native AWS S3 SDK adapter
//!
//! Implements the [`S3Api`] capability on top of `aws-sdk-s3`, with support
//! for S3-compatible endpoints (MinIO, Wasabi, etc.), path-style access,
//! and explicit credentials. Also provides [`SdkErrorClassifier`], which
//! reads the retryable/throttling class the adapter recorded on each
//! failed call.
//!
//! Bodies are bridged at the part boundary: part readers are drained into
//! memory before dispatch and ranged responses are aggregated before they
//! are handed to the engine, so the buffered volume is bounded by the
//! configured part size.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use tokio::io::AsyncReadExt;

use crate::error::{Result, TransferError};
use crate::retry::ErrorClassifier;
use crate::s3api::{
    AbortMultipartUploadRequest, CompleteMultipartUploadRequest, CompleteMultipartUploadResponse,
    CreateMultipartUploadRequest, CreateMultipartUploadResponse, GetObjectRequest,
    GetObjectResponse, PartRead, PutObjectRequest, PutObjectResponse, S3Api, UploadPartRequest,
    UploadPartResponse,
};

/// Default wait applied to throttled calls when the classifier's own wait
/// is zero
pub const DEFAULT_THROTTLE_WAIT: Duration = Duration::from_secs(5);

/// Configuration for the native S3 adapter
#[derive(Debug, Clone)]
pub struct NativeS3Config {
    /// AWS region (e.g., "us-east-1")
    pub region: String,
    /// Custom endpoint URL for S3-compatible services (MinIO, Wasabi)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for some S3-compatible services)
    pub force_path_style: bool,
    /// Access key ID (optional, falls back to the AWS credential chain)
    pub access_key_id: Option<String>,
    /// Secret access key (optional, falls back to the AWS credential chain)
    pub secret_access_key: Option<String>,
}

impl Default for NativeS3Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint_url: None,
            force_path_style: false,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

/// [`S3Api`] implementation backed by the AWS SDK client
pub struct NativeS3Api {
    client: aws_sdk_s3::Client,
}

impl NativeS3Api {
    /// Build a client from configuration
    pub async fn new(config: NativeS3Config) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if let Some(ref endpoint) = config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        if let (Some(ref key_id), Some(ref secret)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let creds = aws_credential_types::Credentials::new(
                key_id,
                secret,
                None, // session token
                None, // expiry
                "s3shuttle-static",
            );
            loader = loader.credentials_provider(creds);
        }

        let sdk_config = loader.load().await;
        let mut s3_config = aws_sdk_s3::config::Builder::from(&sdk_config);
        if config.force_path_style {
            s3_config = s3_config.force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config.build()),
        }
    }

    /// Wrap an already configured SDK client
    pub fn from_client(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl S3Api for NativeS3Api {
    async fn put_object(&self, request: PutObjectRequest<'_>) -> Result<PutObjectResponse> {
        let body = collect_part(request.body).await?;
        let mut builder = self
            .client
            .put_object()
            .bucket(request.bucket)
            .key(request.key)
            .body(ByteStream::from(body));
        if let Some(acl) = request.acl {
            builder = builder.acl(acl.into());
        }
        if let Some(content_type) = request.content_type {
            builder = builder.content_type(content_type);
        }
        let output = builder
            .send()
            .await
            .map_err(|err| sdk_error("PutObject", err))?;
        Ok(PutObjectResponse {
            version_id: output.version_id,
            etag: output.e_tag,
            location: None,
        })
    }

    async fn get_object(&self, request: GetObjectRequest<'_>) -> Result<GetObjectResponse> {
        let mut builder = self
            .client
            .get_object()
            .bucket(request.bucket)
            .key(request.key);
        if let Some(range) = request.range {
            builder = builder.range(range);
        }
        if let Some(version_id) = request.version_id {
            builder = builder.version_id(version_id);
        }
        let output = builder
            .send()
            .await
            .map_err(|err| sdk_error("GetObject", err))?;

        let last_modified = output.last_modified.and_then(|dt| {
            chrono::DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
        });
        let content_type = output.content_type;
        let content_length = output.content_length.and_then(|len| u64::try_from(len).ok());
        let content_range = output.content_range;
        let etag = output.e_tag;
        let version_id = output.version_id;

        // Ranged responses are at most one part long; aggregate them so the
        // engine gets a plain reader.
        let body = output
            .body
            .collect()
            .await
            .map_err(|err| TransferError::api("GetObject", err))?;

        Ok(GetObjectResponse {
            body: Box::new(std::io::Cursor::new(body.into_bytes())),
            content_type,
            content_length,
            content_range,
            etag,
            last_modified,
            version_id,
        })
    }

    async fn create_multipart_upload(
        &self,
        request: CreateMultipartUploadRequest<'_>,
    ) -> Result<CreateMultipartUploadResponse> {
        let mut builder = self
            .client
            .create_multipart_upload()
            .bucket(request.bucket)
            .key(request.key);
        if let Some(acl) = request.acl {
            builder = builder.acl(acl.into());
        }
        if let Some(content_type) = request.content_type {
            builder = builder.content_type(content_type);
        }
        let output = builder
            .send()
            .await
            .map_err(|err| sdk_error("CreateMultipartUpload", err))?;
        let upload_id = output.upload_id.ok_or(TransferError::MissingUploadId)?;
        Ok(CreateMultipartUploadResponse { upload_id })
    }

    async fn upload_part(&self, request: UploadPartRequest<'_>) -> Result<UploadPartResponse> {
        let body = collect_part(request.body).await?;
        let output = self
            .client
            .upload_part()
            .bucket(request.bucket)
            .key(request.key)
            .upload_id(request.upload_id)
            .part_number(request.part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| sdk_error("UploadPart", err))?;
        Ok(UploadPartResponse {
            etag: output.e_tag,
        })
    }

    async fn complete_multipart_upload(
        &self,
        request: CompleteMultipartUploadRequest<'_>,
    ) -> Result<CompleteMultipartUploadResponse> {
        let parts: Vec<aws_sdk_s3::types::CompletedPart> = request
            .parts
            .iter()
            .map(|part| {
                let mut builder =
                    aws_sdk_s3::types::CompletedPart::builder().part_number(part.part_number);
                if let Some(ref etag) = part.etag {
                    builder = builder.e_tag(etag);
                }
                builder.build()
            })
            .collect();
        let completed = aws_sdk_s3::types::CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(request.bucket)
            .key(request.key)
            .upload_id(request.upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|err| sdk_error("CompleteMultipartUpload", err))?;
        Ok(CompleteMultipartUploadResponse {
            version_id: output.version_id,
            etag: output.e_tag,
            location: output.location,
        })
    }

    async fn abort_multipart_upload(&self, request: AbortMultipartUploadRequest<'_>) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(request.bucket)
            .key(request.key)
            .upload_id(request.upload_id)
            .send()
            .await
            .map_err(|err| sdk_error("AbortMultipartUpload", err))?;
        Ok(())
    }
}

async fn collect_part(body: &mut dyn PartRead) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    body.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Classified snapshot of an SDK error, recorded while the concrete error
/// type is still known. [`SdkErrorClassifier`] reads it back out of
/// [`TransferError::Api`].
#[derive(Debug)]
pub struct SdkApiError {
    /// Service error code, when the call reached S3
    pub code: Option<String>,
    /// Whether the SDK-level failure class is worth retrying
    pub retryable: bool,
    /// Whether S3 asked us to slow down
    pub throttling: bool,
    message: String,
}

impl fmt::Display for SdkApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SdkApiError {}

const THROTTLE_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "SlowDown",
    "TooManyRequests",
    "RequestLimitExceeded",
];

const RETRYABLE_CODES: &[&str] = &[
    "RequestTimeout",
    "RequestTimeoutException",
    "InternalError",
    "ServiceUnavailable",
];

fn sdk_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> TransferError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: fmt::Debug + Send + Sync + 'static,
{
    let message = format!("{}", DisplayErrorContext(&err));
    let snapshot = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => SdkApiError {
            code: None,
            retryable: true,
            throttling: false,
            message,
        },
        SdkError::ResponseError(_) => SdkApiError {
            code: None,
            retryable: true,
            throttling: false,
            message,
        },
        SdkError::ServiceError(service) => {
            let code = service.err().meta().code().map(String::from);
            let throttling = code
                .as_deref()
                .is_some_and(|code| THROTTLE_CODES.contains(&code));
            let retryable = throttling
                || code
                    .as_deref()
                    .is_some_and(|code| RETRYABLE_CODES.contains(&code));
            SdkApiError {
                code,
                retryable,
                throttling,
                message,
            }
        }
        _ => SdkApiError {
            code: None,
            retryable: false,
            throttling: false,
            message,
        },
    };
    TransferError::api(operation, snapshot)
}

/// Classifier for errors produced by [`NativeS3Api`].
///
/// Retries what the SDK reports as retryable or throttling, plus the
/// connection-reset condition the SDK misclassifies. Anything that did not
/// come from the SDK adapter is not retryable.
#[derive(Debug, Clone, Copy, Default)]
pub struct SdkErrorClassifier {
    /// Wait applied to throttled calls; zero means
    /// [`DEFAULT_THROTTLE_WAIT`]
    pub throttle_wait: Duration,
}

impl SdkErrorClassifier {
    fn sdk_info(err: &TransferError) -> Option<&SdkApiError> {
        match err {
            TransferError::Api { source, .. } => source.downcast_ref::<SdkApiError>(),
            _ => None,
        }
    }
}

impl ErrorClassifier for SdkErrorClassifier {
    fn is_retryable(&self, err: &TransferError) -> bool {
        let Some(info) = Self::sdk_info(err) else {
            return false;
        };
        if info.retryable || info.throttling {
            return true;
        }
        info.message.contains("connection reset")
    }

    fn throttle_wait(&self, err: &TransferError) -> Option<Duration> {
        let info = Self::sdk_info(err)?;
        if !info.throttling {
            return None;
        }
        Some(if self.throttle_wait.is_zero() {
            DEFAULT_THROTTLE_WAIT
        } else {
            self.throttle_wait
        })
    }
}
