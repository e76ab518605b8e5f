//! Storage Module
//!
//! Durable, append-only byte storage underneath a log stream.
//!
//! ## Responsibilities
//! - Append blocks sequentially and hand back their address
//! - Random reads by address
//! - Truncate everything from an address onwards
//!
//! Storage knows nothing about records or positions; it only sees opaque
//! blocks produced by the log stream controller. Addresses are monotonic:
//! a block appended later always lands at a higher address.
//!
//! ## Implementations
//! - [`FileLogStorage`]: single append-only file, address = byte offset
//! - [`MemoryLogStorage`]: in-memory, survives close/open (tests, benches)

mod file;
mod memory;

use bytes::Bytes;

use crate::error::Result;

pub use file::FileLogStorage;
pub use memory::MemoryLogStorage;

/// Append-only durable storage used by a log stream
///
/// All methods take `&self`; implementations use interior mutability so the
/// storage can be shared between the controller thread and readers.
pub trait LogStorage: Send + Sync {
    /// Open the storage (idempotent)
    fn open(&self) -> Result<()>;

    /// Flush and close the storage (idempotent)
    fn close(&self) -> Result<()>;

    /// Whether the storage is currently open
    fn is_open(&self) -> bool;

    /// Append a block and return the address it was written at
    ///
    /// A failed append must leave no partial block behind.
    fn append(&self, block: &[u8]) -> Result<u64>;

    /// Read up to `max_len` bytes starting at `address`
    ///
    /// Returns fewer bytes near the end of the storage and an empty buffer at
    /// (or past) the end.
    fn read(&self, address: u64, max_len: usize) -> Result<Bytes>;

    /// Remove everything at and after `address`
    fn truncate(&self, address: u64) -> Result<()>;

    /// Make all appended blocks durable
    fn flush(&self) -> Result<()>;

    /// Address of the first block
    fn first_address(&self) -> u64 {
        0
    }

    /// Address the next append will land at
    fn end_address(&self) -> Result<u64>;
}
