//! Log Stream
//!
//! Facade over one partition's log: write buffer, controller, block index
//! and storage.
//!
//! ## Lifecycle
//! ```text
//!   Closed ──open()──► Opening ──► Open ──close()──► Closing ──► Closed
//! ```
//! Lifecycle operations are queued to a single lifecycle thread per stream
//! and executed one at a time; each returns an `ActorFuture`. The commit
//! position and term are plain atomics and may be set from any thread.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::config::LogStreamConfig;
use crate::error::{LogError, Result};
use crate::future::ActorFuture;
use crate::storage::LogStorage;

use super::{
    BlockIndex, BlockIndexController, ControllerPhase, FailureListeners, LogStreamController,
    LogStreamFailureListener, LogStreamReader, WriteBuffer, INVALID_POSITION,
};

/// Lifecycle state of a log stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStreamState {
    Closed,
    Opening,
    Open,
    Closing,
}

/// Handle to a partition's log stream
///
/// Cloning is cheap; all clones drive the same stream. When the last handle
/// is dropped the lifecycle thread closes the stream and exits.
#[derive(Clone)]
pub struct LogStream {
    shared: Arc<LogStreamShared>,
    commands: Sender<Command>,
}

struct LogStreamShared {
    config: LogStreamConfig,
    storage: Arc<dyn LogStorage>,
    write_buffer: Arc<WriteBuffer>,
    index: Arc<RwLock<BlockIndex>>,
    index_controller: Arc<BlockIndexController>,
    controller: LogStreamController,
    listeners: FailureListeners,

    state: Mutex<LogStreamState>,

    /// In-flight open shared by concurrent callers
    pending_open: Mutex<Option<ActorFuture>>,

    commit_position: AtomicI64,
    term: AtomicU64,
}

enum Command {
    Open(ActorFuture),
    Close(ActorFuture),
    OpenAppender(ActorFuture),
    CloseAppender(ActorFuture),
    Truncate(i64, ActorFuture),
}

impl LogStream {
    /// Create a closed log stream over `storage`
    pub fn new(config: LogStreamConfig, storage: Arc<dyn LogStorage>) -> Result<Self> {
        config.validate()?;

        let write_buffer = Arc::new(WriteBuffer::new(
            config.write_buffer_size,
            config.max_fragment_length(),
        )?);
        let index = Arc::new(RwLock::new(BlockIndex::new()));
        let index_controller = Arc::new(BlockIndexController::new(
            Arc::clone(&index),
            Arc::clone(&storage),
            config.index_sampling_threshold(),
            config.read_block_size,
            config.index_snapshot_path(),
        ));
        let listeners = FailureListeners::new();
        let controller = LogStreamController::new(
            config.log_name.clone(),
            Arc::clone(&storage),
            Arc::clone(&index_controller),
            Arc::clone(&write_buffer),
            listeners.clone(),
            config.max_append_block_size,
            config.sync_strategy,
            Arc::new(AtomicI64::new(0)),
        );

        let shared = Arc::new(LogStreamShared {
            config,
            storage,
            write_buffer,
            index,
            index_controller,
            controller,
            listeners,
            state: Mutex::new(LogStreamState::Closed),
            pending_open: Mutex::new(None),
            commit_position: AtomicI64::new(INVALID_POSITION),
            term: AtomicU64::new(0),
        });

        let (commands, receiver) = unbounded();
        let actor = Arc::clone(&shared);
        thread::Builder::new()
            .name(format!("log-stream-{}", shared.config.log_name))
            .spawn(move || actor.run(receiver))?;

        Ok(Self { shared, commands })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open the stream: open storage, recover the index, start the appender
    ///
    /// Concurrent calls while opening share one handle. The open always runs
    /// behind commands already queued, so an earlier `close()` is never lost.
    pub fn open(&self) -> ActorFuture {
        let mut pending = self.shared.pending_open.lock();
        if let Some(future) = pending.as_ref() {
            return future.clone();
        }

        let future = ActorFuture::new();
        *pending = Some(future.clone());
        self.submit(Command::Open(future.clone()));
        future
    }

    /// Close the stream: write buffer, appender (final drain), index, storage
    ///
    /// Fails with `InvalidState` while an open is in flight and with
    /// `Cancelled` if producers still hold claims after the grace period.
    pub fn close(&self) -> ActorFuture {
        if self.shared.pending_open.lock().is_some() {
            return ActorFuture::failed(LogError::InvalidState(format!(
                "log stream {} is opening",
                self.name()
            )));
        }
        if self.state() == LogStreamState::Closed {
            return ActorFuture::completed(());
        }

        let future = ActorFuture::new();
        self.submit(Command::Close(future.clone()));
        future
    }

    /// Start the appender on an open stream
    pub fn open_appender(&self) -> ActorFuture {
        let future = ActorFuture::new();
        self.submit(Command::OpenAppender(future.clone()));
        future
    }

    /// Stop the appender after a final drain
    ///
    /// The stream stays open for reads; writes are rejected until `open_appender`.
    pub fn close_appender(&self) -> ActorFuture {
        let future = ActorFuture::new();
        self.submit(Command::CloseAppender(future.clone()));
        future
    }

    /// Delete the record at `position` and everything after it
    ///
    /// Requires an open stream with the appender closed and nothing buffered.
    /// Committed records cannot be truncated.
    pub fn truncate(&self, position: i64) -> ActorFuture {
        let future = ActorFuture::new();
        self.submit(Command::Truncate(position, future.clone()));
        future
    }

    fn submit(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            let future = match e.into_inner() {
                Command::Open(f)
                | Command::Close(f)
                | Command::OpenAppender(f)
                | Command::CloseAppender(f)
                | Command::Truncate(_, f) => f,
            };
            future.complete_exceptionally(LogError::InvalidState(
                "log stream lifecycle thread has exited".to_string(),
            ));
        }
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Copy `payload` into the write buffer without waiting for space
    pub fn try_write(&self, payload: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let mut claim = self.shared.write_buffer.try_claim(payload.len())?;
        claim.payload_mut().copy_from_slice(payload);
        claim.commit();
        Ok(())
    }

    /// Copy `payload` into the write buffer, waiting up to `timeout` for space
    pub fn write(&self, payload: &[u8], timeout: Duration) -> Result<()> {
        self.ensure_writable()?;
        let mut claim = self.shared.write_buffer.claim(payload.len(), timeout)?;
        claim.payload_mut().copy_from_slice(payload);
        claim.commit();
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.state() {
            LogStreamState::Open => Ok(()),
            state => Err(LogError::InvalidState(format!(
                "cannot write to log stream {} in state {:?}",
                self.name(),
                state
            ))),
        }
    }

    /// The stream's write buffer, for producers using claim/commit directly
    pub fn write_buffer(&self) -> &WriteBuffer {
        &self.shared.write_buffer
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// New reader positioned at the first record
    pub fn new_reader(&self) -> LogStreamReader {
        LogStreamReader::new(
            Arc::clone(&self.shared.storage),
            Arc::clone(&self.shared.index),
            self.shared.config.read_block_size,
        )
    }

    /// Position the next appended record will get
    pub fn current_appender_position(&self) -> i64 {
        self.shared.controller.next_position()
    }

    // =========================================================================
    // Commit Position / Term
    // =========================================================================

    pub fn commit_position(&self) -> i64 {
        self.shared.commit_position.load(Ordering::SeqCst)
    }

    /// Raise the commit position; a lower value is ignored
    pub fn set_commit_position(&self, position: i64) {
        let previous = self.shared.commit_position.fetch_max(position, Ordering::SeqCst);
        if position < previous {
            tracing::debug!(log = %self.name(), position, commit_position = previous, "ignoring lower commit position");
        }
    }

    pub fn term(&self) -> u64 {
        self.shared.term.load(Ordering::SeqCst)
    }

    pub fn set_term(&self, term: u64) {
        self.shared.term.store(term, Ordering::SeqCst);
    }

    // =========================================================================
    // Failure Listeners
    // =========================================================================

    pub fn register_failure_listener(&self, listener: Arc<dyn LogStreamFailureListener>) {
        self.shared.listeners.register(listener);
    }

    pub fn remove_failure_listener(&self, listener: &Arc<dyn LogStreamFailureListener>) {
        self.shared.listeners.remove(listener);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> LogStreamState {
        *self.shared.state.lock()
    }

    /// Whether the appender is running and healthy
    pub fn is_appender_open(&self) -> bool {
        self.shared.controller.phase() == ControllerPhase::Open
    }

    pub fn appender_phase(&self) -> ControllerPhase {
        self.shared.controller.phase()
    }

    pub fn name(&self) -> &str {
        &self.shared.config.log_name
    }

    pub fn partition_id(&self) -> u32 {
        self.shared.config.partition_id
    }

    pub fn config(&self) -> &LogStreamConfig {
        &self.shared.config
    }

    pub fn storage(&self) -> &Arc<dyn LogStorage> {
        &self.shared.storage
    }

    pub fn block_index(&self) -> Arc<RwLock<BlockIndex>> {
        Arc::clone(&self.shared.index)
    }
}

impl fmt::Debug for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogStream")
            .field("name", &self.name())
            .field("partition_id", &self.partition_id())
            .field("state", &self.state())
            .finish()
    }
}

// =============================================================================
// Lifecycle Thread
// =============================================================================

impl LogStreamShared {
    fn run(&self, commands: Receiver<Command>) {
        for command in commands.iter() {
            match command {
                Command::Open(future) => {
                    let result = self.handle_open();
                    self.pending_open.lock().take();
                    future.finish(result);
                }
                Command::Close(future) => {
                    future.finish(self.handle_close());
                }
                Command::OpenAppender(future) => {
                    future.finish(self.handle_open_appender());
                }
                Command::CloseAppender(future) => {
                    future.finish(self.handle_close_appender());
                }
                Command::Truncate(position, future) => {
                    future.finish(self.handle_truncate(position));
                }
            }
        }

        // Every handle is gone
        if *self.state.lock() != LogStreamState::Closed {
            if let Err(e) = self.handle_close() {
                tracing::warn!(log = %self.config.log_name, error = %e, "closing dropped log stream failed");
            }
        }
        tracing::debug!(log = %self.config.log_name, "lifecycle thread exited");
    }

    fn set_state(&self, state: LogStreamState) {
        *self.state.lock() = state;
    }

    fn handle_open(&self) -> Result<()> {
        if *self.state.lock() == LogStreamState::Open {
            return Ok(());
        }
        self.set_state(LogStreamState::Opening);

        match self.open_components() {
            Ok(()) => {
                self.set_state(LogStreamState::Open);
                tracing::info!(
                    log = %self.config.log_name,
                    partition = self.config.partition_id,
                    next_position = self.controller.next_position(),
                    "log stream opened"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(log = %self.config.log_name, error = %e, "failed to open log stream");
                let _ = self.controller.close();
                let _ = self.storage.close();
                self.set_state(LogStreamState::Closed);
                Err(e)
            }
        }
    }

    fn open_components(&self) -> Result<()> {
        // Step 1: Storage
        if !self.storage.is_open() {
            self.storage.open()?;
        }
        self.controller.discard_stale_block()?;

        // Step 2: Index and log tail
        let recovered = self
            .index_controller
            .open(self.commit_position.load(Ordering::SeqCst))?;
        if recovered.truncated_tail {
            tracing::warn!(log = %self.config.log_name, "torn log tail was truncated on open");
        }
        self.controller.set_next_position(recovered.next_position)?;
        self.controller.reset_failure();

        // Step 3: Producers and appender
        self.write_buffer.reopen();
        if !self.config.appender_disabled {
            self.controller.open()?;
        }
        Ok(())
    }

    fn handle_close(&self) -> Result<()> {
        if *self.state.lock() == LogStreamState::Closed {
            return Ok(());
        }
        self.set_state(LogStreamState::Closing);

        let grace = Duration::from_millis(self.config.close_grace_period_ms);
        let buffer_result = self.write_buffer.close(grace);
        if let Err(e) = &buffer_result {
            tracing::warn!(log = %self.config.log_name, error = %e, "write buffer closed with outstanding claims");
        }

        let controller_result = self.controller.close();
        let index_result = self.index_controller.close();
        let storage_result = self.storage.close();

        self.set_state(LogStreamState::Closed);
        tracing::info!(log = %self.config.log_name, "log stream closed");

        buffer_result
            .and(controller_result)
            .and(index_result)
            .and(storage_result)
    }

    fn handle_open_appender(&self) -> Result<()> {
        self.ensure_open("open the appender")?;
        self.write_buffer.reopen();
        self.controller.open()
    }

    fn handle_close_appender(&self) -> Result<()> {
        let grace = Duration::from_millis(self.config.close_grace_period_ms);
        let buffer_result = self.write_buffer.close(grace);
        if let Err(e) = &buffer_result {
            tracing::warn!(log = %self.config.log_name, error = %e, "write buffer closed with outstanding claims");
        }
        let controller_result = self.controller.close();
        buffer_result.and(controller_result)
    }

    fn handle_truncate(&self, position: i64) -> Result<()> {
        if self.controller.is_open() {
            tracing::warn!(log = %self.config.log_name, position, "truncate rejected, appender is open");
            return Err(LogError::InvalidState(
                "cannot truncate while the appender is open".to_string(),
            ));
        }
        self.ensure_open("truncate")?;

        let commit_position = self.commit_position.load(Ordering::SeqCst);
        if position <= commit_position {
            tracing::warn!(log = %self.config.log_name, position, commit_position, "truncate rejected, position is committed");
            return Err(LogError::CommittedPositionViolation {
                position,
                commit_position,
            });
        }

        if !self.write_buffer.is_empty() {
            return Err(LogError::InvalidState(
                "cannot truncate while records are buffered".to_string(),
            ));
        }

        let mut reader =
            LogStreamReader::new(Arc::clone(&self.storage), Arc::clone(&self.index), self.config.read_block_size);
        let address = reader
            .find_address(position)?
            .ok_or(LogError::PositionNotFound(position))?;

        self.storage.truncate(address)?;
        self.index_controller.truncate(position, address);
        self.controller.set_next_position(position)?;

        tracing::info!(log = %self.config.log_name, position, address, "log stream truncated");
        Ok(())
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        let state = *self.state.lock();
        if state != LogStreamState::Open {
            return Err(LogError::InvalidState(format!(
                "cannot {} log stream {} in state {:?}",
                operation, self.config.log_name, state
            )));
        }
        Ok(())
    }
}
