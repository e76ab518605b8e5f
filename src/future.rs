//! Completion handles
//!
//! `ActorFuture` is the handle returned by every asynchronous lifecycle
//! operation (open/close/truncate, processor open/close, role transitions).
//! The operation runs on a background thread and completes the handle; callers
//! either `join()` it or poll `is_done()`.
//!
//! Handles are cheap to clone and every clone observes the same outcome, which
//! is how concurrent `open()` calls share one in-flight operation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{LogError, Result};

/// Completion handle for an asynchronous operation
pub struct ActorFuture<T = ()> {
    state: Arc<FutureState<T>>,
}

struct FutureState<T> {
    result: Mutex<Option<Result<T>>>,
    cv: Condvar,
}

impl<T> Clone for ActorFuture<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone> Default for ActorFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> ActorFuture<T> {
    /// Create a pending handle
    pub fn new() -> Self {
        Self {
            state: Arc::new(FutureState {
                result: Mutex::new(None),
                cv: Condvar::new(),
            }),
        }
    }

    /// Create a handle that is already completed with `value`
    pub fn completed(value: T) -> Self {
        let future = Self::new();
        future.complete(value);
        future
    }

    /// Create a handle that already failed with `error`
    pub fn failed(error: LogError) -> Self {
        let future = Self::new();
        future.complete_exceptionally(error);
        future
    }

    /// Complete successfully; returns false if the handle was already done
    pub fn complete(&self, value: T) -> bool {
        self.finish(Ok(value))
    }

    /// Complete with an error; returns false if the handle was already done
    pub fn complete_exceptionally(&self, error: LogError) -> bool {
        self.finish(Err(error))
    }

    /// Record the outcome. The first outcome wins, later ones are dropped.
    pub fn finish(&self, outcome: Result<T>) -> bool {
        let mut result = self.state.result.lock();
        if result.is_some() {
            return false;
        }
        *result = Some(outcome);
        self.state.cv.notify_all();
        true
    }

    /// Whether an outcome has been recorded
    pub fn is_done(&self) -> bool {
        self.state.result.lock().is_some()
    }

    /// Whether the handle completed with an error
    pub fn is_failed(&self) -> bool {
        matches!(*self.state.result.lock(), Some(Err(_)))
    }

    /// Block until the operation completes and return its outcome
    pub fn join(&self) -> Result<T> {
        let mut result = self.state.result.lock();
        loop {
            if let Some(outcome) = result.as_ref() {
                return outcome.clone();
            }
            self.state.cv.wait(&mut result);
        }
    }

    /// Block for at most `timeout`; `None` if the operation is still running
    pub fn join_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        let deadline = Instant::now() + timeout;
        let mut result = self.state.result.lock();
        loop {
            if let Some(outcome) = result.as_ref() {
                return Some(outcome.clone());
            }
            if self.state.cv.wait_until(&mut result, deadline).timed_out() {
                return result.as_ref().cloned();
            }
        }
    }
}

impl<T> std::fmt::Debug for ActorFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state.result.lock().as_ref() {
            None => "pending",
            Some(Ok(_)) => "completed",
            Some(Err(_)) => "failed",
        };
        f.debug_struct("ActorFuture").field("state", &state).finish()
    }
}

/// Spawn `task` on a named background thread and return its completion handle
pub(crate) fn spawn_task<T, F>(name: String, task: F) -> ActorFuture<T>
where
    T: Clone + Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let future = ActorFuture::new();
    let handle = future.clone();
    let spawned = std::thread::Builder::new()
        .name(name)
        .spawn(move || {
            handle.finish(task());
        });

    if let Err(e) = spawned {
        future.complete_exceptionally(LogError::Io(e));
    }
    future
}
