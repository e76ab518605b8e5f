//! Log Stream Reader
//!
//! Reads records back from storage, using the block index to seek.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::Result;
use crate::storage::LogStorage;

use super::frame::{decode_frame, frame_length, FRAME_HEADER_SIZE};
use super::{BlockIndex, LoggedRecord};

/// Sequential reader over a log stream's storage
///
/// Storage is fetched in windows of `read_block_size` bytes. A reader does not
/// notice truncation of bytes it already buffered; create a new reader after
/// truncating.
pub struct LogStreamReader {
    storage: Arc<dyn LogStorage>,
    index: Arc<RwLock<BlockIndex>>,
    read_block_size: usize,

    /// Address of the record `next_record` returns
    next_address: u64,

    /// Cached storage bytes starting at `window_address`
    window: Bytes,
    window_address: u64,
}

impl LogStreamReader {
    /// Create a reader positioned at the first record
    pub fn new(
        storage: Arc<dyn LogStorage>,
        index: Arc<RwLock<BlockIndex>>,
        read_block_size: usize,
    ) -> Self {
        let next_address = storage.first_address();
        Self {
            storage,
            index,
            read_block_size: read_block_size.max(FRAME_HEADER_SIZE),
            next_address,
            window: Bytes::new(),
            window_address: 0,
        }
    }

    /// Position the reader at the first record
    pub fn seek_to_first(&mut self) {
        self.next_address = self.storage.first_address();
    }

    /// Position the reader at the record stored at `address`
    pub fn seek_to_address(&mut self, address: u64) {
        self.next_address = address;
    }

    /// Position the reader at the first record with a position >= `position`
    ///
    /// Returns true if a record with exactly `position` exists.
    pub fn seek(&mut self, position: i64) -> Result<bool> {
        let lookup = self.index.read().lookup(position);
        let mut address = lookup.address_or(self.storage.first_address());

        loop {
            match self.read_at(address)? {
                Some(record) if record.position < position => address = record.next_address(),
                Some(record) => {
                    self.next_address = record.address;
                    return Ok(record.position == position);
                }
                None => {
                    self.next_address = address;
                    return Ok(false);
                }
            }
        }
    }

    /// Storage address of the record with exactly `position`
    pub fn find_address(&mut self, position: i64) -> Result<Option<u64>> {
        if self.seek(position)? {
            Ok(Some(self.next_address))
        } else {
            Ok(None)
        }
    }

    /// Read the last record of the log, leaving the reader at the end
    pub fn read_last(&mut self) -> Result<Option<LoggedRecord>> {
        let start = self
            .index
            .read()
            .last_entry()
            .map(|(_, address)| address)
            .unwrap_or_else(|| self.storage.first_address());

        self.next_address = start;
        let mut last = None;
        while let Some(record) = self.next_record()? {
            last = Some(record);
        }
        Ok(last)
    }

    /// Read the next record and advance; `None` at the end of the log
    pub fn next_record(&mut self) -> Result<Option<LoggedRecord>> {
        let record = self.read_at(self.next_address)?;
        if let Some(record) = &record {
            self.next_address = record.next_address();
        }
        Ok(record)
    }

    /// Read the record stored at `address` without moving the reader
    pub fn read_at(&mut self, address: u64) -> Result<Option<LoggedRecord>> {
        let header = self.fetch(address, FRAME_HEADER_SIZE)?;
        if header.len() < FRAME_HEADER_SIZE {
            // Empty at the end of the log, corruption otherwise
            return decode_frame(&header, address);
        }

        let payload_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let frame = self.fetch(address, frame_length(payload_len))?;
        decode_frame(&frame, address)
    }

    /// Address of the record `next_record` will return
    pub fn next_address(&self) -> u64 {
        self.next_address
    }

    /// Return `len` bytes at `address`, refilling the window if needed
    fn fetch(&mut self, address: u64, len: usize) -> Result<Bytes> {
        let window_end = self.window_address + self.window.len() as u64;
        if address >= self.window_address && address + len as u64 <= window_end {
            let start = (address - self.window_address) as usize;
            return Ok(self.window.slice(start..start + len));
        }

        self.window = self.storage.read(address, len.max(self.read_block_size))?;
        self.window_address = address;
        Ok(self.window.slice(..len.min(self.window.len())))
    }
}

impl Iterator for LogStreamReader {
    type Item = Result<LoggedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
