//! Object storage adapters
//!
//! Bridges between the crate's [`S3Api`](crate::s3api::S3Api) capability
//! and real object stores. Currently: the native AWS SDK adapter, enabled
//! with the `native_s3` feature.

#[cfg(feature = "native_s3")]
pub mod native_s3;

#[cfg(feature = "native_s3")]
pub use native_s3::{NativeS3Api, NativeS3Config, SdkApiError, SdkErrorClassifier};
