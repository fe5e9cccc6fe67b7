//! Retry policies
//!
//! A [`Retryer`] tracks failures per attempt id and decides whether the
//! driver should try again, blocking for the backoff wait itself. Attempt
//! ids are stable across one attempt series: each upload/download part has
//! its own id, the multipart-create call uses id 0, the multipart-complete
//! call uses id −1, so their failure counters never interfere.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TransferError;

/// Default base wait of the exponential backoff retryer
pub const DEFAULT_WAIT_BASE: Duration = Duration::from_secs(1);
/// Default wait cap of the exponential backoff retryer
pub const DEFAULT_WAIT_MAX: Duration = Duration::from_secs(60);
/// Default retry budget per attempt id
pub const DEFAULT_RETRY_MAX: u32 = 8;

/// Handle a retryer gets on the transfer it serves.
///
/// Lets the pause-on-fail wrapper flip the transfer's pause latch and the
/// hook wrapper report which object failed.
pub trait TransferControl: Send + Sync {
    /// Pause the transfer at its next safe point
    fn pause(&self);

    /// Bucket and key of the object being transferred
    fn bucket_key(&self) -> (String, String);
}

/// Builds one [`Retryer`] per transfer.
///
/// The factory itself is shared between transfers; the retryer it returns
/// belongs to a single transfer and keeps that transfer's per-id state.
pub trait RetryerFactory: Send + Sync {
    /// Create a retryer bound to the given transfer
    fn make(&self, ctl: Arc<dyn TransferControl>) -> Arc<dyn Retryer>;
}

/// Per-transfer retry policy
#[async_trait]
pub trait Retryer: Send + Sync {
    /// Called after a failed attempt. May sleep for the computed backoff;
    /// the sleep races `cancel`. Returns `false` when the attempt series
    /// should give up (budget exhausted, or cancellation fired during the
    /// wait).
    async fn on_fail(&self, cancel: &CancellationToken, id: i64, err: &TransferError) -> bool;

    /// Called after a successful attempt; resets the bookkeeping for `id`
    fn on_success(&self, id: i64);
}

/// Factory for the policy that never retries
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetryerFactory;

impl RetryerFactory for NoRetryerFactory {
    fn make(&self, _ctl: Arc<dyn TransferControl>) -> Arc<dyn Retryer> {
        Arc::new(NoRetryer)
    }
}

struct NoRetryer;

#[async_trait]
impl Retryer for NoRetryer {
    async fn on_fail(&self, _cancel: &CancellationToken, _id: i64, _err: &TransferError) -> bool {
        false
    }

    fn on_success(&self, _id: i64) {}
}

/// Factory for exponential backoff with a per-id retry budget.
///
/// The wait starts at `wait_base`, doubles on each consecutive failure of
/// the same id, and is capped at `wait_max`. After `retry_max` consecutive
/// failures of one id the retryer gives up for that id. A success resets
/// the id's counter and wait.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoffRetryerFactory {
    /// Wait before the first retry
    pub wait_base: Duration,
    /// Upper bound on the doubling wait
    pub wait_max: Duration,
    /// Consecutive failures tolerated per attempt id
    pub retry_max: u32,
}

impl Default for ExponentialBackoffRetryerFactory {
    fn default() -> Self {
        Self {
            wait_base: DEFAULT_WAIT_BASE,
            wait_max: DEFAULT_WAIT_MAX,
            retry_max: DEFAULT_RETRY_MAX,
        }
    }
}

impl RetryerFactory for ExponentialBackoffRetryerFactory {
    fn make(&self, _ctl: Arc<dyn TransferControl>) -> Arc<dyn Retryer> {
        Arc::new(ExponentialBackoffRetryer {
            config: *self,
            state: Mutex::new(HashMap::new()),
        })
    }
}

#[derive(Clone, Copy)]
struct BackoffState {
    failures: u32,
    next_wait: Duration,
}

struct ExponentialBackoffRetryer {
    config: ExponentialBackoffRetryerFactory,
    state: Mutex<HashMap<i64, BackoffState>>,
}

#[async_trait]
impl Retryer for ExponentialBackoffRetryer {
    async fn on_fail(&self, cancel: &CancellationToken, id: i64, _err: &TransferError) -> bool {
        let wait = {
            let mut state = self.state.lock().unwrap();
            let entry = state.entry(id).or_insert(BackoffState {
                failures: 0,
                next_wait: self.config.wait_base,
            });
            entry.failures += 1;
            if entry.failures > self.config.retry_max {
                return false;
            }
            let wait = entry.next_wait;
            entry.next_wait = (wait * 2).min(self.config.wait_max);
            wait
        };

        tokio::select! {
            _ = tokio::time::sleep(wait) => true,
            _ = cancel.cancelled() => false,
        }
    }

    fn on_success(&self, id: i64) {
        self.state.lock().unwrap().remove(&id);
    }
}

/// Factory wrapping a base policy so that giving up pauses the transfer
/// instead of failing it.
///
/// When the base retryer says "give up", the wrapper flips the transfer's
/// pause latch and reports "retry": after the caller resumes, the attempt
/// series continues with the base policy's counter reset. Without a base
/// policy every failure pauses immediately.
#[derive(Default)]
pub struct PauseOnFailRetryerFactory {
    /// Base policy consulted first; `None` pauses on the first failure
    pub base: Option<Arc<dyn RetryerFactory>>,
}

impl PauseOnFailRetryerFactory {
    /// Wrap the given base policy
    pub fn new(base: Arc<dyn RetryerFactory>) -> Self {
        Self { base: Some(base) }
    }
}

impl RetryerFactory for PauseOnFailRetryerFactory {
    fn make(&self, ctl: Arc<dyn TransferControl>) -> Arc<dyn Retryer> {
        let base = match &self.base {
            Some(factory) => factory.make(ctl.clone()),
            None => NoRetryerFactory.make(ctl.clone()),
        };
        Arc::new(PauseOnFailRetryer { base, ctl })
    }
}

struct PauseOnFailRetryer {
    base: Arc<dyn Retryer>,
    ctl: Arc<dyn TransferControl>,
}

#[async_trait]
impl Retryer for PauseOnFailRetryer {
    async fn on_fail(&self, cancel: &CancellationToken, id: i64, err: &TransferError) -> bool {
        if self.base.on_fail(cancel, id, err).await {
            return true;
        }
        if cancel.is_cancelled() {
            return false;
        }
        // Budget exhausted: park the transfer at the pause barrier and let
        // the caller decide when to resume the series.
        self.base.on_success(id);
        self.ctl.pause();
        true
    }

    fn on_success(&self, id: i64) {
        self.base.on_success(id);
    }
}

/// Observability callback invoked with `(bucket, key, error)` on every
/// failed attempt
pub type OnErrorHook = Arc<dyn Fn(&str, &str, &TransferError) + Send + Sync>;

/// Factory wrapping a base policy with a per-failure callback
pub struct RetryerHookFactory {
    /// Base policy the retry decision is delegated to
    pub base: Arc<dyn RetryerFactory>,
    /// Callback invoked on every failure before delegating
    pub on_error: OnErrorHook,
}

impl RetryerFactory for RetryerHookFactory {
    fn make(&self, ctl: Arc<dyn TransferControl>) -> Arc<dyn Retryer> {
        Arc::new(HookRetryer {
            base: self.base.make(ctl.clone()),
            ctl,
            on_error: self.on_error.clone(),
        })
    }
}

struct HookRetryer {
    base: Arc<dyn Retryer>,
    ctl: Arc<dyn TransferControl>,
    on_error: OnErrorHook,
}

#[async_trait]
impl Retryer for HookRetryer {
    async fn on_fail(&self, cancel: &CancellationToken, id: i64, err: &TransferError) -> bool {
        let (bucket, key) = self.ctl.bucket_key();
        (self.on_error)(&bucket, &key, err);
        self.base.on_fail(cancel, id, err).await
    }

    fn on_success(&self, id: i64) {
        self.base.on_success(id);
    }
}
