//! Log Stream Module
//!
//! The append-only, partitioned log: producers write records through a
//! claim/commit write buffer, a single controller drains them into durable
//! storage and assigns positions, and a sparse block index lets readers seek.
//!
//! ## Responsibilities
//! - Position assignment (strictly increasing, gap-free w.r.t. payload length)
//! - Write buffering with head-of-line commit ordering
//! - Asynchronous drain into storage
//! - Sparse position → address index
//! - Lifecycle (open/close/truncate) and commit position bookkeeping
//!
//! ## Record Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Block (one storage append)                              │
//! │ ┌──────────┬─────────┬──────────────┬────────────────┐  │
//! │ │ Len (4)  │ CRC (4) │ Position (8) │ Payload (Len)  │  │
//! │ └──────────┴─────────┴──────────────┴────────────────┘  │
//! │ ... repeated for each record drained in this cycle ...  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//! The CRC covers the position bytes and the payload.

mod block_index;
mod controller;
mod frame;
mod index_controller;
mod listener;
mod reader;
mod stream;
mod write_buffer;

use bytes::Bytes;

pub use block_index::{BlockIndex, IndexLookup};
pub use controller::{ControllerPhase, LogStreamController};
pub use frame::{decode_frame, encode_frame, frame_length, FRAME_HEADER_SIZE};
pub use index_controller::{BlockIndexController, RecoveredLog};
pub use listener::{FailureListeners, LogStreamFailureListener};
pub use reader::LogStreamReader;
pub use stream::{LogStream, LogStreamState};
pub use write_buffer::{Claim, DrainBlock, WriteBuffer};

/// Commit position before anything has been committed
pub const INVALID_POSITION: i64 = -1;

/// A record read back from the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedRecord {
    /// Logical position assigned by the controller
    pub position: i64,

    /// Storage address of the record's frame
    pub address: u64,

    /// Opaque payload
    pub payload: Bytes,
}

impl LoggedRecord {
    /// Size of the record's frame on storage
    pub fn frame_length(&self) -> usize {
        frame_length(self.payload.len())
    }

    /// Address right after this record
    pub fn next_address(&self) -> u64 {
        self.address + self.frame_length() as u64
    }

    /// Position the record after this one gets
    pub fn next_position(&self) -> i64 {
        self.position + self.payload.len() as i64
    }
}
