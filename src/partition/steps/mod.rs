//! Transition steps
//!
//! Each step owns one component of the partition. The orchestrator runs
//! `prepare_transition` on every step in reverse order, then `transition_to`
//! on every step in order. Both phases finish before the role counts as
//! changed.

mod log_stream;
mod stream_processor;

use crate::error::Result;

use super::{PartitionTransitionContext, Role};

pub use log_stream::LogStreamTransitionStep;
pub use stream_processor::{should_install, StreamProcessorTransitionStep};

/// One component's part in a role transition
pub trait PartitionTransitionStep: Send + Sync {
    fn name(&self) -> &str;

    /// Tear down what the target role does not keep
    fn prepare_transition(
        &self,
        context: &mut PartitionTransitionContext,
        term: u64,
        target: Role,
    ) -> Result<()>;

    /// Install what the target role needs
    fn transition_to(
        &self,
        context: &mut PartitionTransitionContext,
        term: u64,
        target: Role,
    ) -> Result<()>;
}
