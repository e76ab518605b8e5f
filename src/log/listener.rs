//! Failure listeners
//!
//! Observers notified when the log stream controller halts on a storage
//! fault, and again when it is reopened afterwards.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::LogError;

/// Observer of log stream failures
pub trait LogStreamFailureListener: Send + Sync {
    /// The controller stopped draining because of `error`
    fn on_failure(&self, error: &LogError);

    /// The controller was reopened after a failure
    fn on_recovered(&self) {}
}

/// Ordered set of registered listeners, shared with the controller thread
#[derive(Clone, Default)]
pub struct FailureListeners {
    listeners: Arc<RwLock<Vec<Arc<dyn LogStreamFailureListener>>>>,
}

impl FailureListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener (registering the same listener twice is a no-op)
    pub fn register(&self, listener: Arc<dyn LogStreamFailureListener>) {
        let mut listeners = self.listeners.write();
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    /// Remove a previously registered listener
    pub fn remove(&self, listener: &Arc<dyn LogStreamFailureListener>) {
        self.listeners.write().retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn notify_failure(&self, error: &LogError) {
        // Snapshot first so listeners may (de)register from the callback
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_failure(error);
        }
    }

    pub(crate) fn notify_recovered(&self) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_recovered();
        }
    }
}
