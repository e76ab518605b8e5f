//! Block Index
//!
//! Sparse, sorted position → storage address map.
//!
//! Entries are only added for positions at block boundaries, so a lookup
//! yields a starting point from which the caller scans storage linearly.
//! Memory and scan cost are traded off through the index block size and the
//! deviation factor (see `LogStreamConfig::index_sampling_threshold`).

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LogError, Result};

/// Result of a floor lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexLookup {
    /// Nearest entry at or below the target position
    Entry { position: i64, address: u64 },

    /// The target lies before the first entry (or the index is empty);
    /// scan from the beginning of storage
    BeforeFirstEntry,
}

impl IndexLookup {
    /// Address to start scanning from, falling back to `first_address`
    pub fn address_or(self, first_address: u64) -> u64 {
        match self {
            IndexLookup::Entry { address, .. } => address,
            IndexLookup::BeforeFirstEntry => first_address,
        }
    }
}

/// In-memory sparse index, strictly increasing in position and address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockIndex {
    entries: BTreeMap<i64, u64>,
}

impl BlockIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry for a block that has been durably written
    ///
    /// Both the position and the address must be greater than those of the
    /// last entry.
    pub fn append(&mut self, position: i64, address: u64) -> Result<()> {
        if let Some((&last_position, &last_address)) = self.entries.iter().next_back() {
            if position <= last_position || address <= last_address {
                return Err(LogError::InvalidArgument(format!(
                    "index entry ({}, {}) does not follow last entry ({}, {})",
                    position, address, last_position, last_address
                )));
            }
        }
        self.entries.insert(position, address);
        Ok(())
    }

    /// Find the nearest entry at or below `position`
    pub fn lookup(&self, position: i64) -> IndexLookup {
        match self.entries.range(..=position).next_back() {
            Some((&position, &address)) => IndexLookup::Entry { position, address },
            None => IndexLookup::BeforeFirstEntry,
        }
    }

    /// Remove every entry with a position greater than `position`
    pub fn truncate_after(&mut self, position: i64) {
        if let Some(first_removed) = position.checked_add(1) {
            self.entries.split_off(&first_removed);
        }
    }

    /// Remove every entry whose address is at or past `address`
    pub fn truncate_from_address(&mut self, address: u64) {
        self.entries.retain(|_, entry_address| *entry_address < address);
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Last (highest) entry
    pub fn last_entry(&self) -> Option<(i64, u64)> {
        self.entries.iter().next_back().map(|(&p, &a)| (p, a))
    }

    /// All entries in position order
    pub fn entries(&self) -> impl Iterator<Item = (i64, u64)> + '_ {
        self.entries.iter().map(|(&p, &a)| (p, a))
    }

    /// Remove all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Write the index to `path` (via a temp file + rename)
    pub fn write_snapshot(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serialize(self)?;
        let tmp_path = path.with_extension("idx.tmp");

        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Load an index written by `write_snapshot`; `None` if there is none
    pub fn read_snapshot(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        let index: BlockIndex = bincode::deserialize(&bytes)?;
        Ok(Some(index))
    }
}
