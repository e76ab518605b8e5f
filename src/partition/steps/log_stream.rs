//! Log stream step: keeps the partition's log stream open while the
//! partition has an active role.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{LogError, Result};
use crate::log::{LogStreamFailureListener, LogStreamState};
use crate::partition::{HealthReportingListener, PartitionTransitionContext, Role};

use super::PartitionTransitionStep;

#[derive(Default)]
pub struct LogStreamTransitionStep {
    /// Health listener registered on the open stream
    listener: Mutex<Option<Arc<dyn LogStreamFailureListener>>>,
}

impl LogStreamTransitionStep {
    pub fn new() -> Self {
        Self::default()
    }

    fn component_name(context: &PartitionTransitionContext) -> String {
        format!("log-stream-{}", context.partition_id())
    }
}

impl PartitionTransitionStep for LogStreamTransitionStep {
    fn name(&self) -> &str {
        "LogStream"
    }

    fn prepare_transition(
        &self,
        context: &mut PartitionTransitionContext,
        _term: u64,
        target: Role,
    ) -> Result<()> {
        if target.is_active() {
            return Ok(());
        }
        let Some(log_stream) = context.log_stream() else {
            return Ok(());
        };

        if let Some(listener) = self.listener.lock().take() {
            log_stream.remove_failure_listener(&listener);
        }
        context
            .health_monitor()
            .remove_component(&Self::component_name(context));

        if log_stream.state() != LogStreamState::Closed {
            log_stream.close().join()?;
            tracing::debug!(partition = context.partition_id(), "log stream closed for inactive role");
        }
        Ok(())
    }

    fn transition_to(
        &self,
        context: &mut PartitionTransitionContext,
        term: u64,
        target: Role,
    ) -> Result<()> {
        if !target.is_active() {
            return Ok(());
        }
        let log_stream = context.log_stream().ok_or_else(|| {
            LogError::InvalidState(format!(
                "partition {} has no log stream to open",
                context.partition_id()
            ))
        })?;

        log_stream.open().join()?;
        log_stream.set_term(term);

        let mut registered = self.listener.lock();
        if registered.is_none() {
            let component = Self::component_name(context);
            context.health_monitor().register_component(&component);
            let listener: Arc<dyn LogStreamFailureListener> = Arc::new(
                HealthReportingListener::new(component, Arc::clone(context.health_monitor())),
            );
            log_stream.register_failure_listener(Arc::clone(&listener));
            *registered = Some(listener);
        }
        Ok(())
    }
}
