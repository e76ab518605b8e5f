//! File-backed log storage
//!
//! One append-only file per log. Addresses are byte offsets into the file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{LogError, Result};

use super::LogStorage;

/// Append-only storage in a single file
pub struct FileLogStorage {
    /// Path of the log file
    path: PathBuf,

    /// Open file handle plus the current end offset (None while closed)
    state: Mutex<Option<OpenFile>>,
}

struct OpenFile {
    file: File,
    /// Offset the next append lands at
    end: u64,
}

impl FileLogStorage {
    /// Create a storage for `path` (the file is created on `open`)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(None),
        }
    }

    /// Create and open a storage in one step
    pub fn open_path(path: &Path) -> Result<Self> {
        let storage = Self::new(path);
        storage.open()?;
        Ok(storage)
    }

    /// Get the log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn not_open(&self) -> LogError {
        LogError::InvalidState(format!("log storage {} is not open", self.path.display()))
    }
}

impl LogStorage for FileLogStorage {
    fn open(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;
        let end = file.metadata()?.len();

        tracing::debug!(path = %self.path.display(), end, "log storage opened");
        *state = Some(OpenFile { file, end });
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(open) = state.take() {
            open.file.sync_all()?;
            tracing::debug!(path = %self.path.display(), end = open.end, "log storage closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().is_some()
    }

    fn append(&self, block: &[u8]) -> Result<u64> {
        let mut state = self.state.lock();
        let open = state.as_mut().ok_or_else(|| self.not_open())?;

        let address = open.end;
        let written = open
            .file
            .seek(SeekFrom::Start(address))
            .and_then(|_| open.file.write_all(block));

        if let Err(e) = written {
            // Roll back whatever part of the block made it to the file
            let _ = open.file.set_len(address);
            return Err(LogError::Io(e));
        }

        open.end += block.len() as u64;
        Ok(address)
    }

    fn read(&self, address: u64, max_len: usize) -> Result<Bytes> {
        let mut state = self.state.lock();
        let open = state.as_mut().ok_or_else(|| self.not_open())?;

        if address >= open.end || max_len == 0 {
            return Ok(Bytes::new());
        }

        let len = (open.end - address).min(max_len as u64) as usize;
        let mut buf = vec![0u8; len];
        open.file.seek(SeekFrom::Start(address))?;
        open.file.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    fn truncate(&self, address: u64) -> Result<()> {
        let mut state = self.state.lock();
        let open = state.as_mut().ok_or_else(|| self.not_open())?;

        if address > open.end {
            return Err(LogError::InvalidArgument(format!(
                "truncate address {} is past the end of the log ({})",
                address, open.end
            )));
        }

        open.file.set_len(address)?;
        open.file.sync_data()?;
        open.end = address;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let state = self.state.lock();
        let open = state.as_ref().ok_or_else(|| self.not_open())?;
        open.file.sync_data()?;
        Ok(())
    }

    fn end_address(&self) -> Result<u64> {
        let state = self.state.lock();
        state
            .as_ref()
            .map(|open| open.end)
            .ok_or_else(|| self.not_open())
    }
}
