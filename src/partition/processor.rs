//! Stream processor seam
//!
//! The stream processor consumes a partition's log. It is built fresh by a
//! factory on every install and never outlives the role it was built for.

use std::sync::Arc;

use crate::error::Result;
use crate::future::ActorFuture;
use crate::log::LogStream;

use super::Role;

/// How a freshly built stream processor treats the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProcessorMode {
    /// Process new records and write follow-ups (leader)
    Processing,
    /// Only replay records to rebuild state (follower, candidate)
    Replay,
}

impl StreamProcessorMode {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Leader => StreamProcessorMode::Processing,
            _ => StreamProcessorMode::Replay,
        }
    }
}

/// A running stream processor
pub trait StreamProcessor: Send + Sync {
    /// Start processing; with `pause_on_start` the processor starts paused
    fn open_async(&self, pause_on_start: bool) -> ActorFuture;

    /// Stop processing; closing twice is harmless
    fn close_async(&self) -> ActorFuture;
}

/// Everything a factory needs to build a processor for one role
#[derive(Debug, Clone)]
pub struct StreamProcessorSettings {
    pub partition_id: u32,
    pub log_stream: Option<LogStream>,
    pub mode: StreamProcessorMode,
    pub term: u64,
}

/// Builds a new stream processor on every install
pub trait StreamProcessorFactory: Send + Sync {
    fn build(&self, settings: StreamProcessorSettings) -> Result<Arc<dyn StreamProcessor>>;
}

impl<F> StreamProcessorFactory for F
where
    F: Fn(StreamProcessorSettings) -> Result<Arc<dyn StreamProcessor>> + Send + Sync,
{
    fn build(&self, settings: StreamProcessorSettings) -> Result<Arc<dyn StreamProcessor>> {
        self(settings)
    }
}
