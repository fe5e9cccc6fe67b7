//! Retry driver
//!
//! [`with_retry`] runs one attempt series: it calls the attempt closure
//! until it succeeds, the error is fatal or non-retryable, the transfer is
//! cancelled, or the retryer's budget runs out.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::TransferError;
use crate::retry::{ErrorClassifier, Retryer};

/// How an attempt failed, from the engine's point of view.
///
/// The engine tags errors it understands better than the classifier does:
/// fatal ones skip the retry machinery entirely, tagged-retryable ones
/// (server quirks, the force-pause sentinel) retry regardless of the
/// classifier's verdict.
pub(crate) enum AttemptError {
    /// Skip retry and propagate immediately
    Fatal(TransferError),
    /// Retry regardless of the classifier's verdict
    Retryable(TransferError),
    /// Let the classifier decide
    Plain(TransferError),
}

/// Drive one attempt series under the given retryer and classifier.
///
/// `id` is the attempt-series id handed to the retryer (0 for the
/// create/single-object call, 1.. for parts, −1 for multipart completion).
pub(crate) async fn with_retry<T, F>(
    cancel: &CancellationToken,
    id: i64,
    retryer: &dyn Retryer,
    classifier: &dyn ErrorClassifier,
    mut attempt: impl FnMut() -> F,
) -> Result<T, TransferError>
where
    F: Future<Output = Result<T, AttemptError>>,
{
    loop {
        let (err, engine_tagged) = match attempt().await {
            Ok(value) => {
                retryer.on_success(id);
                return Ok(value);
            }
            Err(AttemptError::Fatal(err)) => return Err(err),
            Err(AttemptError::Retryable(err)) => (err, true),
            Err(AttemptError::Plain(err)) => (err, false),
        };

        if !engine_tagged && !classifier.is_retryable(&err) {
            return Err(err);
        }

        if let Some(wait) = classifier.throttle_wait(&err) {
            warn!(attempt_id = id, ?wait, error = %err, "throttled, backing off");
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            }
        }

        // Cancellation is checked after the attempt but before the retryer
        // gets to sleep on it.
        if cancel.is_cancelled() {
            return Err(err);
        }

        if !retryer.on_fail(cancel, id, &err).await {
            if cancel.is_cancelled() {
                return Err(err);
            }
            return Err(TransferError::RetryExhausted {
                source: Box::new(err),
            });
        }
        warn!(attempt_id = id, error = %err, "attempt failed, retrying");
    }
}
