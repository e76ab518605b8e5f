//! Log Stream Controller
//!
//! The appender: a single background thread that drains committed records
//! from the write buffer, assigns their positions and writes them to storage.
//!
//! ## Drain Cycle
//! 1. Collect the drainable run at the head of the write buffer
//!    (at most `max_append_block_size` bytes of frames)
//! 2. Frame each payload with the next position
//!    (`next = position + payload length`)
//! 3. Append the block to storage and flush per sync strategy
//! 4. Tell the index controller about the block
//! 5. Publish the new append position and release the slots
//!
//! Slots are released only after the block is in storage, so a storage
//! fault leaves every undrained record in the buffer. The thread then stops,
//! notifies the failure listeners and waits for an explicit reopen.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::BytesMut;
use crossbeam::channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;

use crate::config::SyncStrategy;
use crate::error::{LogError, Result};
use crate::storage::LogStorage;

use super::frame::encode_frame;
use super::{BlockIndexController, FailureListeners, WriteBuffer};

/// Upper bound on how long the appender sleeps without a doorbell
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lifecycle phase of the appender thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    /// No appender thread
    Closed,
    /// Draining
    Open,
    /// Halted on a storage fault; needs close + open
    Failed,
}

/// Starts and stops the appender thread
pub struct LogStreamController {
    appender: Arc<Appender>,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    handle: JoinHandle<()>,
    shutdown: Sender<()>,
}

/// State shared with the appender thread
struct Appender {
    name: String,
    storage: Arc<dyn LogStorage>,
    index_controller: Arc<BlockIndexController>,
    write_buffer: Arc<WriteBuffer>,
    listeners: FailureListeners,
    max_append_block_size: usize,
    sync_strategy: SyncStrategy,

    /// Position the next drained record gets
    next_position: Arc<AtomicI64>,

    /// Blocks appended since the last flush
    unflushed_blocks: AtomicUsize,

    phase: Mutex<ControllerPhase>,

    /// Set on failure, cleared (with a recovery notification) on reopen
    failed_before: Mutex<bool>,

    /// Address of an unflushed block whose rollback failed; its slots are still buffered
    stale_block: Mutex<Option<u64>>,
}

impl LogStreamController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        storage: Arc<dyn LogStorage>,
        index_controller: Arc<BlockIndexController>,
        write_buffer: Arc<WriteBuffer>,
        listeners: FailureListeners,
        max_append_block_size: usize,
        sync_strategy: SyncStrategy,
        next_position: Arc<AtomicI64>,
    ) -> Self {
        Self {
            appender: Arc::new(Appender {
                name: name.into(),
                storage,
                index_controller,
                write_buffer,
                listeners,
                max_append_block_size,
                sync_strategy,
                next_position,
                unflushed_blocks: AtomicUsize::new(0),
                phase: Mutex::new(ControllerPhase::Closed),
                failed_before: Mutex::new(false),
                stale_block: Mutex::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Start the appender thread (no-op if it is already draining)
    pub fn open(&self) -> Result<()> {
        let mut worker = self.worker.lock();

        if let Some(existing) = worker.take() {
            if self.phase() == ControllerPhase::Open {
                *worker = Some(existing);
                return Ok(());
            }
            // The previous thread halted on a fault and has exited
            let _ = existing.handle.join();
        }

        self.discard_stale_block()?;
        *self.appender.phase.lock() = ControllerPhase::Open;

        let (shutdown_tx, shutdown_rx) = bounded(1);
        let appender = Arc::clone(&self.appender);
        let spawned = thread::Builder::new()
            .name(format!("log-appender-{}", self.appender.name))
            .spawn(move || appender.run(shutdown_rx));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                *self.appender.phase.lock() = ControllerPhase::Closed;
                return Err(LogError::Io(e));
            }
        };

        *worker = Some(Worker {
            handle,
            shutdown: shutdown_tx,
        });

        tracing::debug!(log = %self.appender.name, next_position = self.next_position(), "appender opened");

        let mut failed_before = self.appender.failed_before.lock();
        if *failed_before {
            *failed_before = false;
            tracing::info!(log = %self.appender.name, "appender recovered");
            self.appender.listeners.notify_recovered();
        }
        Ok(())
    }

    /// Stop the appender thread after a final drain
    ///
    /// The write buffer should be closed first so no new records arrive.
    pub fn close(&self) -> Result<()> {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.shutdown.send(());
            worker.handle.join().map_err(|_| {
                LogError::InvalidState(format!("appender thread of {} panicked", self.appender.name))
            })?;
        }

        let mut phase = self.appender.phase.lock();
        if *phase == ControllerPhase::Open {
            *phase = ControllerPhase::Closed;
        }
        tracing::debug!(log = %self.appender.name, phase = ?*phase, "appender closed");
        Ok(())
    }

    /// Whether an appender thread exists (draining or halted)
    pub fn is_open(&self) -> bool {
        self.worker.lock().is_some()
    }

    pub fn phase(&self) -> ControllerPhase {
        *self.appender.phase.lock()
    }

    /// Position the next drained record gets
    pub fn next_position(&self) -> i64 {
        self.appender.next_position.load(Ordering::SeqCst)
    }

    /// Reset the next position (only while closed, after recovery or truncation)
    pub fn set_next_position(&self, position: i64) -> Result<()> {
        if self.is_open() {
            return Err(LogError::InvalidState(
                "cannot move the append position while the appender is open".to_string(),
            ));
        }
        self.appender.next_position.store(position, Ordering::SeqCst);
        Ok(())
    }

    /// Remove a block left in storage by a failed rollback
    ///
    /// Its records are still buffered and get written again once the
    /// appender drains, so the block must go before anything reads the tail.
    pub(crate) fn discard_stale_block(&self) -> Result<()> {
        let mut stale = self.appender.stale_block.lock();
        if let Some(address) = *stale {
            self.appender.storage.truncate(address)?;
            tracing::info!(log = %self.appender.name, address, "stale block discarded");
            *stale = None;
        }
        Ok(())
    }

    /// Clear a failed phase once the appender is closed
    pub(crate) fn reset_failure(&self) {
        let mut phase = self.appender.phase.lock();
        if *phase == ControllerPhase::Failed && !self.is_open() {
            *phase = ControllerPhase::Closed;
        }
    }
}

impl Appender {
    fn run(&self, shutdown: Receiver<()>) {
        let doorbell = self.write_buffer.doorbell();
        tracing::debug!(log = %self.name, "appender thread started");

        loop {
            if !self.drain_available() {
                return;
            }

            select! {
                recv(shutdown) -> _ => {
                    if self.drain_available() {
                        if let Err(e) = self.storage.flush() {
                            self.fail(LogError::StorageFault(format!("final flush failed: {}", e)));
                        }
                    }
                    return;
                }
                recv(doorbell) -> _ => {}
                default(IDLE_POLL_INTERVAL) => {}
            }
        }
    }

    /// Drain until the buffer head is blocked or empty; false if the appender failed
    fn drain_available(&self) -> bool {
        loop {
            match self.drain_once() {
                Ok(true) => continue,
                Ok(false) => return true,
                Err(e) => {
                    self.fail(e);
                    return false;
                }
            }
        }
    }

    /// Run one drain cycle; Ok(false) if nothing was drainable
    fn drain_once(&self) -> Result<bool> {
        let Some(block) = self.write_buffer.poll_block(self.max_append_block_size) else {
            return Ok(false);
        };

        // Only padding and aborted claims at the head
        if block.fragments.is_empty() {
            self.write_buffer.release(block.slot_count);
            return Ok(true);
        }

        let first_position = self.next_position.load(Ordering::SeqCst);
        let mut position = first_position;
        let mut encoded = BytesMut::with_capacity(block.frame_bytes);
        for payload in &block.fragments {
            encode_frame(&mut encoded, position, payload);
            position += payload.len() as i64;
        }

        let address = self.storage.append(&encoded).map_err(|e| {
            LogError::StorageFault(format!("append of {} bytes failed: {}", encoded.len(), e))
        })?;

        if let Err(e) = self.maybe_flush() {
            // Keep storage free of a block whose slots are still buffered
            if let Err(rollback) = self.storage.truncate(address) {
                tracing::error!(
                    log = %self.name,
                    address,
                    first_position,
                    error = %rollback,
                    "failed to roll back unflushed block"
                );
                *self.stale_block.lock() = Some(address);
                return Err(LogError::StorageFault(format!(
                    "flush failed: {}; rollback of block at address {} failed: {}",
                    e, address, rollback
                )));
            }
            return Err(LogError::StorageFault(format!("flush failed: {}", e)));
        }

        self.index_controller
            .on_block_written(first_position, address, encoded.len())?;
        self.next_position.store(position, Ordering::SeqCst);
        self.write_buffer.release(block.slot_count);

        tracing::trace!(
            log = %self.name,
            records = block.fragments.len(),
            first_position,
            address,
            bytes = encoded.len(),
            "block appended"
        );
        Ok(true)
    }

    fn maybe_flush(&self) -> Result<()> {
        let flush_now = match self.sync_strategy {
            SyncStrategy::EveryBlock => true,
            SyncStrategy::EveryNBlocks { count } => {
                self.unflushed_blocks.fetch_add(1, Ordering::SeqCst) + 1 >= count
            }
        };
        if flush_now {
            self.storage.flush()?;
            self.unflushed_blocks.store(0, Ordering::SeqCst);
        }
        Ok(())
    }

    fn fail(&self, error: LogError) {
        tracing::error!(log = %self.name, error = %error, "appender halted");
        *self.phase.lock() = ControllerPhase::Failed;
        *self.failed_before.lock() = true;
        self.listeners.notify_failure(&error);
    }
}
