//! Retry policies and error classification
//!
//! Provides the pieces every remote call runs under:
//! - Error classifiers tagging failures as retryable / throttled / fatal
//! - Retryers deciding whether (and after how long) to try again
//! - The retry driver wiring both around an attempt closure

mod classifier;
mod driver;
mod retryer;

pub use classifier::{ErrorClassifier, NaiveClassifier};
pub(crate) use driver::{with_retry, AttemptError};
pub use retryer::{
    ExponentialBackoffRetryerFactory, NoRetryerFactory, OnErrorHook, PauseOnFailRetryerFactory,
    Retryer, RetryerFactory, RetryerHookFactory, TransferControl, DEFAULT_RETRY_MAX,
    DEFAULT_WAIT_BASE, DEFAULT_WAIT_MAX,
};
