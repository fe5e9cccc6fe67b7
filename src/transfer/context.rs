//! Shared per-transfer state
//!
//! One [`TransferShared`] sits between a transfer's background task (the
//! producer of progress) and the caller (the observer, and the initiator
//! of pause/resume). It owns the rearmable pause latch, the one-shot done
//! latch, the status record, the terminal result slot, and the handle that
//! can force-cancel the single in-flight remote call.

use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::TransferError;
use crate::retry::TransferControl;

/// Mutators every transfer status record exposes to the substrate
pub trait TransferStatus: Clone + Send + Sync + 'static {
    /// Flip the externally visible paused flag
    fn set_paused(&mut self, paused: bool);

    /// Increment the retry counter
    fn count_retry(&mut self);
}

struct TransferState<S, O> {
    status: S,
    result: Option<Result<O, Arc<TransferError>>>,
}

/// State shared between a transfer's background task and its handle
pub(crate) struct TransferShared<S, O> {
    bucket: String,
    key: String,
    force_pause: bool,
    state: RwLock<TransferState<S, O>>,
    /// true while paused; rearmed by every `pause()`
    pause_tx: watch::Sender<bool>,
    /// flipped to true exactly once
    done_tx: watch::Sender<bool>,
    current_call: Mutex<Option<CancellationToken>>,
}

/// Outcome of racing a remote call against the in-flight cancel handle
pub(crate) enum CallOutcome<T> {
    /// The call ran to completion
    Done(T),
    /// A forced pause cancelled the call; the transfer should re-enter the
    /// pause barrier and retry
    ForcePaused,
    /// The caller cancelled the whole transfer
    Cancelled,
}

impl<S: TransferStatus, O: Clone + Send + Sync + 'static> TransferShared<S, O> {
    pub(crate) fn new(bucket: String, key: String, force_pause: bool, status: S) -> Self {
        Self {
            bucket,
            key,
            force_pause,
            state: RwLock::new(TransferState {
                status,
                result: None,
            }),
            pause_tx: watch::channel(false).0,
            done_tx: watch::channel(false).0,
            current_call: Mutex::new(None),
        }
    }

    /// Pause the transfer. With `force_pause` enabled this also cancels the
    /// remote call currently in flight.
    pub(crate) fn pause(&self) {
        self.pause_tx.send_replace(true);
        self.state.write().unwrap().status.set_paused(true);
        if self.force_pause {
            if let Some(token) = self.current_call.lock().unwrap().as_ref() {
                token.cancel();
            }
        }
    }

    /// Release the pause latch; idempotent
    pub(crate) fn resume(&self) {
        self.pause_tx.send_replace(false);
        self.state.write().unwrap().status.set_paused(false);
    }

    /// Block until the transfer is not paused, or the caller cancels
    pub(crate) async fn pause_check(&self, cancel: &CancellationToken) {
        let mut paused = self.pause_tx.subscribe();
        loop {
            if !*paused.borrow_and_update() {
                return;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = paused.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Run one remote call under a child cancellation handle.
    ///
    /// The future is dropped if the handle fires, which aborts the
    /// underlying request. A firing caused by `pause()` (parent still
    /// alive) is reported as [`CallOutcome::ForcePaused`].
    pub(crate) async fn guarded_call<T>(
        &self,
        cancel: &CancellationToken,
        call: impl Future<Output = T>,
    ) -> CallOutcome<T> {
        let current = cancel.child_token();
        *self.current_call.lock().unwrap() = Some(current.clone());
        let outcome = tokio::select! {
            result = call => CallOutcome::Done(result),
            _ = current.cancelled() => {
                if cancel.is_cancelled() {
                    CallOutcome::Cancelled
                } else {
                    CallOutcome::ForcePaused
                }
            }
        };
        *self.current_call.lock().unwrap() = None;
        outcome
    }

    /// Count one retried attempt in the status record
    pub(crate) fn count_retry(&self) {
        self.state.write().unwrap().status.count_retry();
    }

    /// Mutate the status record under the write lock
    pub(crate) fn update_status(&self, f: impl FnOnce(&mut S)) {
        f(&mut self.state.write().unwrap().status);
    }

    /// Read the status record under the read lock
    pub(crate) fn read_status<T>(&self, f: impl FnOnce(&S) -> T) -> T {
        f(&self.state.read().unwrap().status)
    }

    /// Store the terminal result and fire `done`. Only the first call has
    /// any effect.
    pub(crate) fn finish(&self, result: Result<O, TransferError>) {
        {
            let mut state = self.state.write().unwrap();
            if state.result.is_some() {
                return;
            }
            state.result = Some(result.map_err(Arc::new));
        }
        self.done_tx.send_replace(true);
    }

    fn status(&self) -> S {
        self.state.read().unwrap().status.clone()
    }

    fn result(&self) -> Option<Result<O, Arc<TransferError>>> {
        self.state.read().unwrap().result.clone()
    }

    fn is_done(&self) -> bool {
        *self.done_tx.borrow()
    }

    async fn done(&self) {
        let mut done = self.done_tx.subscribe();
        while !*done.borrow_and_update() {
            if done.changed().await.is_err() {
                return;
            }
        }
    }
}

impl<S: TransferStatus, O: Clone + Send + Sync + 'static> TransferControl
    for TransferShared<S, O>
{
    fn pause(&self) {
        TransferShared::pause(self);
    }

    fn bucket_key(&self) -> (String, String) {
        (self.bucket.clone(), self.key.clone())
    }
}

/// Caller-facing handle on one running transfer.
///
/// Returned by `upload`/`download` immediately; the transfer runs in a
/// background task. Dropping the handle detaches the task without
/// cancelling it; cancellation belongs to the token the transfer was
/// started with.
pub struct TransferHandle<S, O> {
    shared: Arc<TransferShared<S, O>>,
    _task: JoinHandle<()>,
}

impl<S: TransferStatus, O: Clone + Send + Sync + 'static> TransferHandle<S, O> {
    pub(crate) fn new(shared: Arc<TransferShared<S, O>>, task: JoinHandle<()>) -> Self {
        Self {
            shared,
            _task: task,
        }
    }

    /// Pause the transfer at its next safe point. With the engine's
    /// `force_pause` option enabled, additionally cancel the in-flight
    /// remote call.
    pub fn pause(&self) {
        self.shared.pause();
    }

    /// Resume a paused transfer; safe to call repeatedly
    pub fn resume(&self) {
        self.shared.resume();
    }

    /// Snapshot of the transfer's progress
    pub fn status(&self) -> S {
        self.shared.status()
    }

    /// Terminal output or error; `None` until [`done`](Self::done) fires
    pub fn result(&self) -> Option<Result<O, Arc<TransferError>>> {
        self.shared.result()
    }

    /// Whether the transfer has reached its terminal state
    pub fn is_done(&self) -> bool {
        self.shared.is_done()
    }

    /// Wait for the transfer to reach its terminal state
    pub async fn done(&self) {
        self.shared.done().await;
    }
}
