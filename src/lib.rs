//! # logstream
//!
//! The log layer of a partitioned, replicated stream processing broker:
//! - Append-only log stream per partition with strictly increasing positions
//! - Claim/commit write buffer with head-of-line ordering and backpressure
//! - Single appender thread draining the buffer into durable storage
//! - Sparse block index for position → address lookups
//! - Role-driven lifecycle of the partition's stream processor
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Producers (many threads)                    │
//! │                 claim → fill → commit                       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Write Buffer                             │
//! │             (ring, head-of-line commit order)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ drain
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                Log Stream Controller                        │
//! │         (assigns positions, one appender thread)            │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │                                  │
//!            ▼                                  ▼
//!   ┌─────────────────┐                ┌─────────────────┐
//!   │     Storage     │◄───── seek ────│   Block Index   │
//!   │ (append-only)   │                │ (sparse, floor) │
//!   └─────────────────┘                └─────────────────┘
//!
//!   Role change ──► PartitionTransition ──► LogStream step
//!                                       └─► StreamProcessor step
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod future;

pub mod log;
pub mod partition;
pub mod storage;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{LogStreamConfig, SyncStrategy};
pub use error::{LogError, Result};
pub use future::ActorFuture;
pub use log::{LogStream, LogStreamReader, LogStreamState, LoggedRecord, INVALID_POSITION};
pub use partition::{PartitionTransition, PartitionTransitionContext, Role};
pub use storage::{FileLogStorage, LogStorage, MemoryLogStorage};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of logstream
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
