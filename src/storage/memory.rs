//! In-memory log storage
//!
//! Keeps all blocks in a single growable buffer. Contents survive
//! `close()`/`open()` cycles, which makes it a stand-in for a durable
//! storage in tests and benchmarks.

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use crate::error::{LogError, Result};

use super::LogStorage;

/// Append-only storage held in memory
#[derive(Default)]
pub struct MemoryLogStorage {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    open: bool,
    data: BytesMut,
    /// Number of flush calls (for tests and debugging)
    flushes: u64,
}

impl MemoryLogStorage {
    /// Create an empty, closed storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes stored
    pub fn len(&self) -> usize {
        self.state.lock().data.len()
    }

    /// Whether nothing has been appended
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of times `flush` was called
    pub fn flush_count(&self) -> u64 {
        self.state.lock().flushes
    }

    /// Copy of the raw stored bytes
    pub fn contents(&self) -> Bytes {
        Bytes::copy_from_slice(&self.state.lock().data)
    }
}

fn ensure_open(state: &MemoryState) -> Result<()> {
    if state.open {
        Ok(())
    } else {
        Err(LogError::InvalidState("memory log storage is not open".to_string()))
    }
}

impl LogStorage for MemoryLogStorage {
    fn open(&self) -> Result<()> {
        self.state.lock().open = true;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.state.lock().open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn append(&self, block: &[u8]) -> Result<u64> {
        let mut state = self.state.lock();
        ensure_open(&state)?;
        let address = state.data.len() as u64;
        state.data.extend_from_slice(block);
        Ok(address)
    }

    fn read(&self, address: u64, max_len: usize) -> Result<Bytes> {
        let state = self.state.lock();
        ensure_open(&state)?;
        let end = state.data.len() as u64;
        if address >= end {
            return Ok(Bytes::new());
        }
        let start = address as usize;
        let stop = start + ((end - address) as usize).min(max_len);
        Ok(Bytes::copy_from_slice(&state.data[start..stop]))
    }

    fn truncate(&self, address: u64) -> Result<()> {
        let mut state = self.state.lock();
        ensure_open(&state)?;
        if address > state.data.len() as u64 {
            return Err(LogError::InvalidArgument(format!(
                "truncate address {} is past the end of the log ({})",
                address,
                state.data.len()
            )));
        }
        state.data.truncate(address as usize);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        ensure_open(&state)?;
        state.flushes += 1;
        Ok(())
    }

    fn end_address(&self) -> Result<u64> {
        let state = self.state.lock();
        ensure_open(&state)?;
        Ok(state.data.len() as u64)
    }
}
