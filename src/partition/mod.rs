//! Partition Module
//!
//! Drives the per-partition components through role changes.
//!
//! ## Responsibilities
//! - Model the partition role (`Role`)
//! - Hold the components a role change acts on (`PartitionTransitionContext`)
//! - Run role changes as two phases over an ordered list of steps
//!   (`PartitionTransition`)
//! - Decide when the stream processor is torn down and reinstalled
//!   (`StreamProcessorTransitionStep`)
//!
//! ## Transition Flow
//! ```text
//!   transition_to(term, role)
//!        │
//!        ▼
//!   prepare_transition   steps in reverse order (teardown)
//!        │
//!        ▼
//!   transition_to        steps in order (install)
//!        │
//!        ▼
//!   current role / term updated
//! ```

mod context;
mod health;
mod processor;
pub mod steps;
mod transition;

use std::fmt;

pub use context::PartitionTransitionContext;
pub use health::{ComponentHealthMonitor, HealthMonitor, HealthReportingListener, HealthStatus};
pub use processor::{
    StreamProcessor, StreamProcessorFactory, StreamProcessorMode, StreamProcessorSettings,
};
pub use steps::{LogStreamTransitionStep, PartitionTransitionStep, StreamProcessorTransitionStep};
pub use transition::PartitionTransition;

/// Role of this node for a partition, as decided by the replication layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Inactive,
    Follower,
    Candidate,
    Leader,
}

impl Role {
    /// Whether the partition's components run in this role
    pub fn is_active(self) -> bool {
        !matches!(self, Role::Inactive)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Inactive => "INACTIVE",
            Role::Follower => "FOLLOWER",
            Role::Candidate => "CANDIDATE",
            Role::Leader => "LEADER",
        }
    }

    pub fn all() -> [Role; 4] {
        [Role::Inactive, Role::Follower, Role::Candidate, Role::Leader]
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
