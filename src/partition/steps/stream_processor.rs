//! Stream processor step
//!
//! ## Install Rule
//! | From                     | To                 | Processor                  |
//! |--------------------------|--------------------|----------------------------|
//! | none / INACTIVE          | FOLLOWER, LEADER   | install fresh              |
//! | FOLLOWER, CANDIDATE      | LEADER             | close, install fresh       |
//! | LEADER                   | FOLLOWER           | close, install fresh       |
//! | CANDIDATE ↔ FOLLOWER     |                    | keep running               |
//! | any active role          | INACTIVE           | close, nothing installed   |
//!
//! A failed install leaves the partition without a processor, reports the
//! failure to the health monitor and fails the transition.

use std::sync::Arc;

use crate::error::{LogError, Result};
use crate::partition::{
    PartitionTransitionContext, Role, StreamProcessorFactory, StreamProcessorMode,
    StreamProcessorSettings,
};

use super::PartitionTransitionStep;

const COMPONENT: &str = "stream-processor";

/// Whether moving from `current` to `target` needs a fresh processor
///
/// Moves between FOLLOWER and CANDIDATE keep the running processor; every
/// other move into an active role replaces it.
pub fn should_install(current: Option<Role>, target: Role) -> bool {
    match target {
        Role::Leader => true,
        Role::Follower => current != Some(Role::Candidate),
        Role::Candidate => current != Some(Role::Follower),
        Role::Inactive => false,
    }
}

pub struct StreamProcessorTransitionStep {
    factory: Arc<dyn StreamProcessorFactory>,
}

impl StreamProcessorTransitionStep {
    pub fn new(factory: Arc<dyn StreamProcessorFactory>) -> Self {
        Self { factory }
    }

    fn close_processor(context: &mut PartitionTransitionContext) -> Result<()> {
        if let Some(processor) = context.take_stream_processor() {
            context.health_monitor().remove_component(COMPONENT);
            processor.close_async().join()?;
            tracing::debug!(partition = context.partition_id(), "stream processor closed");
        }
        Ok(())
    }

    fn install(&self, context: &mut PartitionTransitionContext, term: u64, target: Role) -> Result<()> {
        let mode = StreamProcessorMode::for_role(target);
        let settings = StreamProcessorSettings {
            partition_id: context.partition_id(),
            log_stream: context.log_stream().cloned(),
            mode,
            term,
        };

        let outcome = self.factory.build(settings).and_then(|processor| {
            match processor.open_async(!context.should_process()).join() {
                Ok(()) => Ok(processor),
                Err(e) => {
                    // Best effort; the open already failed
                    let _ = processor.close_async();
                    Err(e)
                }
            }
        });

        match outcome {
            Ok(processor) => {
                context.health_monitor().register_component(COMPONENT);
                context.set_stream_processor(Some(processor));
                tracing::info!(partition = context.partition_id(), role = %target, term, ?mode, "stream processor installed");
                Ok(())
            }
            Err(e) => {
                let reason = format!("{} (role {}, term {})", e, target, term);
                tracing::error!(partition = context.partition_id(), role = %target, term, error = %e, "stream processor install failed");
                context.set_stream_processor(None);
                context.health_monitor().report_failure(COMPONENT, &reason);
                Err(LogError::TransitionFailed {
                    partition_id: context.partition_id(),
                    reason,
                })
            }
        }
    }
}

impl PartitionTransitionStep for StreamProcessorTransitionStep {
    fn name(&self) -> &str {
        "StreamProcessor"
    }

    fn prepare_transition(
        &self,
        context: &mut PartitionTransitionContext,
        _term: u64,
        target: Role,
    ) -> Result<()> {
        if context.stream_processor().is_some()
            && (should_install(context.current_role(), target) || target == Role::Inactive)
        {
            Self::close_processor(context)?;
        }
        Ok(())
    }

    fn transition_to(
        &self,
        context: &mut PartitionTransitionContext,
        term: u64,
        target: Role,
    ) -> Result<()> {
        if target == Role::Inactive {
            return Ok(());
        }
        if should_install(context.current_role(), target) || context.stream_processor().is_none() {
            // Left over if prepare was skipped
            Self::close_processor(context)?;
            self.install(context, term, target)?;
        }
        Ok(())
    }
}
