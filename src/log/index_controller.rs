//! Block Index Controller
//!
//! Maintains the block index alongside the appender.
//!
//! ## Responsibilities
//! - Decide which written blocks get an index entry (sampling)
//! - Recover the index and the log tail when the log stream opens
//! - Truncate the index together with storage
//! - Persist an index snapshot when the log stream closes

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{LogError, Result};
use crate::storage::LogStorage;

use super::{BlockIndex, LogStreamReader, FRAME_HEADER_SIZE};

/// Outcome of recovering a log on open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredLog {
    /// Position the next appended record gets
    pub next_position: i64,

    /// Position of the last record, if any
    pub last_position: Option<i64>,

    /// Records read while scanning the tail
    pub records_scanned: u64,

    /// Whether a torn or corrupt tail was cut off
    pub truncated_tail: bool,
}

/// Owns the sampling policy and lifecycle of a log stream's block index
pub struct BlockIndexController {
    /// Shared with readers and the facade
    index: Arc<RwLock<BlockIndex>>,

    storage: Arc<dyn LogStorage>,

    /// Bytes between two index entries
    sampling_threshold: usize,

    /// Reader window used during recovery
    read_block_size: usize,

    /// Where the snapshot lives (None = no snapshots)
    snapshot_path: Option<PathBuf>,

    state: Mutex<IndexState>,
}

#[derive(Default)]
struct IndexState {
    open: bool,
    /// Bytes written since the last entry; None forces an entry for the next block
    bytes_since_entry: Option<usize>,
}

impl BlockIndexController {
    pub fn new(
        index: Arc<RwLock<BlockIndex>>,
        storage: Arc<dyn LogStorage>,
        sampling_threshold: usize,
        read_block_size: usize,
        snapshot_path: Option<PathBuf>,
    ) -> Self {
        Self {
            index,
            storage,
            sampling_threshold: sampling_threshold.max(1),
            read_block_size,
            snapshot_path,
            state: Mutex::new(IndexState::default()),
        }
    }

    /// Recover the index and find the end of the log
    ///
    /// Storage must be open. Steps:
    /// 1. Load the snapshot if the in-memory index is empty
    /// 2. Drop entries that point past the end of storage or at the wrong record
    /// 3. Scan from the last entry to the end, indexing as the appender would
    /// 4. Cut off a torn final frame
    ///
    /// A corrupt record inside the log, a break in the position sequence or a
    /// torn frame at or below `commit_position` fails the open instead.
    pub fn open(&self, commit_position: i64) -> Result<RecoveredLog> {
        let mut state = self.state.lock();

        // Step 1: Snapshot
        if self.index.read().is_empty() {
            if let Some(path) = &self.snapshot_path {
                match BlockIndex::read_snapshot(path) {
                    Ok(Some(snapshot)) => {
                        tracing::debug!(path = %path.display(), entries = snapshot.len(), "block index snapshot loaded");
                        *self.index.write() = snapshot;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable block index snapshot");
                    }
                }
            }
        }

        // Step 2: Sanity check against storage
        let end_address = self.storage.end_address()?;
        let mut reader = LogStreamReader::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.index),
            self.read_block_size,
        );
        {
            let mut index = self.index.write();
            index.truncate_from_address(end_address);
            if let Some((position, address)) = index.last_entry() {
                let matches = matches!(reader.read_at(address), Ok(Some(record)) if record.position == position);
                if !matches {
                    tracing::warn!(position, address, "block index does not match storage, rebuilding");
                    index.clear();
                }
            }
        }

        // Step 3: Scan the tail
        let start = self
            .index
            .read()
            .last_entry()
            .map(|(_, address)| address)
            .unwrap_or_else(|| self.storage.first_address());

        let mut recovered = RecoveredLog {
            next_position: 0,
            last_position: None,
            records_scanned: 0,
            truncated_tail: false,
        };
        let mut bytes_since_entry: Option<usize> = None;
        let mut address = start;

        loop {
            match reader.read_at(address) {
                Ok(Some(record)) => {
                    if recovered.last_position.is_some() && record.position != recovered.next_position {
                        tracing::error!(
                            address = record.address,
                            position = record.position,
                            expected = recovered.next_position,
                            "log positions out of sequence"
                        );
                        return Err(LogError::Corruption {
                            address: record.address,
                            reason: format!(
                                "record position {} does not follow position {}",
                                record.position, recovered.next_position
                            ),
                        });
                    }
                    {
                        let mut index = self.index.write();
                        let indexed = index.last_entry().map(|(p, _)| p);
                        if indexed == Some(record.position) {
                            bytes_since_entry = Some(0);
                        } else if self.needs_entry(bytes_since_entry) {
                            index.append(record.position, record.address)?;
                            bytes_since_entry = Some(0);
                        }
                    }
                    bytes_since_entry = bytes_since_entry.map(|b| b + record.frame_length());

                    recovered.last_position = Some(record.position);
                    recovered.next_position = record.next_position();
                    recovered.records_scanned += 1;
                    address = record.next_address();
                }
                Ok(None) => break,
                // Step 4: Torn tail
                Err(LogError::Corruption { address: bad, reason }) => {
                    if !self.is_torn_tail(bad, end_address)? {
                        tracing::error!(address = bad, %reason, "corrupt record inside the log");
                        return Err(LogError::Corruption { address: bad, reason });
                    }
                    if recovered.next_position <= commit_position {
                        tracing::error!(
                            address = bad,
                            position = recovered.next_position,
                            commit_position,
                            "torn frame at a committed position"
                        );
                        return Err(LogError::Corruption {
                            address: bad,
                            reason: format!(
                                "{}; position {} is committed (commit position {})",
                                reason, recovered.next_position, commit_position
                            ),
                        });
                    }
                    tracing::warn!(address = bad, %reason, "truncating torn log tail");
                    self.storage.truncate(bad)?;
                    self.index.write().truncate_from_address(bad);
                    recovered.truncated_tail = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        state.bytes_since_entry = bytes_since_entry;
        state.open = true;

        tracing::debug!(
            next_position = recovered.next_position,
            records_scanned = recovered.records_scanned,
            index_entries = self.index.read().len(),
            "block index recovered"
        );
        Ok(recovered)
    }

    /// Record that a block starting at `first_position` was written at `address`
    pub fn on_block_written(&self, first_position: i64, address: u64, block_len: usize) -> Result<()> {
        let mut state = self.state.lock();
        if self.needs_entry(state.bytes_since_entry) {
            self.index.write().append(first_position, address)?;
            state.bytes_since_entry = Some(0);
        }
        state.bytes_since_entry = state.bytes_since_entry.map(|b| b + block_len);
        Ok(())
    }

    /// Drop entries for records at or after `position` (stored at `address`)
    pub fn truncate(&self, position: i64, address: u64) {
        let mut state = self.state.lock();
        let mut index = self.index.write();
        index.truncate_after(position - 1);
        index.truncate_from_address(address);
        state.bytes_since_entry = None;
    }

    /// Persist the snapshot (if configured) and mark the controller closed
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.open {
            return Ok(());
        }
        if let Some(path) = &self.snapshot_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.index.read().write_snapshot(path)?;
            tracing::debug!(path = %path.display(), "block index snapshot written");
        }
        state.open = false;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Shared index handle
    pub fn index(&self) -> Arc<RwLock<BlockIndex>> {
        Arc::clone(&self.index)
    }

    /// Whether the frame at `address` is the last one and runs past `end_address`
    fn is_torn_tail(&self, address: u64, end_address: u64) -> Result<bool> {
        if end_address.saturating_sub(address) < FRAME_HEADER_SIZE as u64 {
            return Ok(true);
        }
        let header = self.storage.read(address, FRAME_HEADER_SIZE)?;
        if header.len() < FRAME_HEADER_SIZE {
            return Ok(true);
        }
        let payload_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as u64;
        Ok(address + FRAME_HEADER_SIZE as u64 + payload_len >= end_address)
    }

    fn needs_entry(&self, bytes_since_entry: Option<usize>) -> bool {
        match bytes_since_entry {
            None => true,
            Some(bytes) => bytes >= self.sampling_threshold,
        }
    }
}
