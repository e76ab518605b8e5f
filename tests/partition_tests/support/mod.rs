//! Test doubles shared by the partition tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use logstream::partition::{
    StreamProcessor, StreamProcessorFactory, StreamProcessorMode, StreamProcessorSettings,
};
use logstream::{ActorFuture, LogError, Result};
use parking_lot::Mutex;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

// =============================================================================
// Stream Processor
// =============================================================================

/// Processor that counts open/close calls
pub struct CountingProcessor {
    pub mode: StreamProcessorMode,
    pub term: u64,
    pub has_log_stream: bool,
    opens: AtomicUsize,
    closes: AtomicUsize,
    paused_on_start: Mutex<Option<bool>>,
    open_result: ActorFuture,
}

impl CountingProcessor {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn paused_on_start(&self) -> Option<bool> {
        *self.paused_on_start.lock()
    }
}

impl StreamProcessor for CountingProcessor {
    fn open_async(&self, pause_on_start: bool) -> ActorFuture {
        self.opens.fetch_add(1, Ordering::SeqCst);
        *self.paused_on_start.lock() = Some(pause_on_start);
        self.open_result.clone()
    }

    fn close_async(&self) -> ActorFuture {
        self.closes.fetch_add(1, Ordering::SeqCst);
        ActorFuture::completed(())
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Factory remembering every processor it built
#[derive(Default)]
pub struct CountingFactory {
    built: Mutex<Vec<Arc<CountingProcessor>>>,
    fail_build: AtomicBool,
    fail_open: AtomicBool,
    /// Handle returned by the next processors' `open_async` (completed if unset)
    open_gate: Mutex<Option<ActorFuture>>,
}

impl CountingFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn built(&self) -> usize {
        self.built.lock().len()
    }

    pub fn processor(&self, index: usize) -> Arc<CountingProcessor> {
        Arc::clone(&self.built.lock()[index])
    }

    pub fn last(&self) -> Arc<CountingProcessor> {
        Arc::clone(self.built.lock().last().unwrap())
    }

    pub fn total_opens(&self) -> usize {
        self.built.lock().iter().map(|p| p.opens()).sum()
    }

    pub fn total_closes(&self) -> usize {
        self.built.lock().iter().map(|p| p.closes()).sum()
    }

    pub fn fail_build(&self, fail: bool) {
        self.fail_build.store(fail, Ordering::SeqCst);
    }

    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make processors built from now on open through `gate`
    pub fn gate_opens(&self, gate: ActorFuture) {
        *self.open_gate.lock() = Some(gate);
    }
}

impl StreamProcessorFactory for CountingFactory {
    fn build(&self, settings: StreamProcessorSettings) -> Result<Arc<dyn StreamProcessor>> {
        if self.fail_build.load(Ordering::SeqCst) {
            return Err(LogError::Processor("factory refused to build".to_string()));
        }

        let open_result = if self.fail_open.load(Ordering::SeqCst) {
            ActorFuture::failed(LogError::Processor("open failed".to_string()))
        } else {
            self.open_gate
                .lock()
                .clone()
                .unwrap_or_else(|| ActorFuture::completed(()))
        };

        let processor = Arc::new(CountingProcessor {
            mode: settings.mode,
            term: settings.term,
            has_log_stream: settings.log_stream.is_some(),
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            paused_on_start: Mutex::new(None),
            open_result,
        });
        self.built.lock().push(Arc::clone(&processor));
        Ok(processor)
    }
}
