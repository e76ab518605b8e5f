//! Partition Transition
//!
//! Runs role transitions for one partition on a background thread, one at a
//! time.
//!
//! ## Transition Protocol
//! 1. Reject the request if another transition has not finished
//! 2. `prepare_transition` on every step, last step first
//! 3. `transition_to` on every step, first step first
//! 4. Record the new role and term in the context
//!
//! A failing step fails the transition; the recorded role stays the one of
//! the last successful transition.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::error::{LogError, Result};
use crate::future::{spawn_task, ActorFuture};

use super::steps::PartitionTransitionStep;
use super::{PartitionTransitionContext, Role};

/// Role transition orchestrator for one partition
#[derive(Clone)]
pub struct PartitionTransition {
    inner: Arc<TransitionInner>,
}

struct TransitionInner {
    partition_id: u32,
    context: Mutex<PartitionTransitionContext>,
    steps: Vec<Box<dyn PartitionTransitionStep>>,

    /// Handle of the last transition; a new one is accepted once it is done
    in_flight: Mutex<Option<ActorFuture>>,
}

impl PartitionTransition {
    pub fn new(
        context: PartitionTransitionContext,
        steps: Vec<Box<dyn PartitionTransitionStep>>,
    ) -> Self {
        Self {
            inner: Arc::new(TransitionInner {
                partition_id: context.partition_id(),
                context: Mutex::new(context),
                steps,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Start a transition to `role` in `term`
    ///
    /// Fails immediately with `TransitionInProgress` while a previous
    /// transition is still running.
    pub fn transition_to(&self, term: u64, role: Role) -> ActorFuture {
        let mut in_flight = self.inner.in_flight.lock();
        if let Some(previous) = in_flight.as_ref() {
            if !previous.is_done() {
                tracing::warn!(partition = self.inner.partition_id, %role, term, "transition rejected, another one is in progress");
                return ActorFuture::failed(LogError::TransitionInProgress {
                    partition_id: self.inner.partition_id,
                    requested: role.to_string(),
                });
            }
        }

        let inner = Arc::clone(&self.inner);
        let future = spawn_task(
            format!("partition-{}-transition", self.inner.partition_id),
            move || inner.run(term, role),
        );
        *in_flight = Some(future.clone());
        future
    }

    /// Whether a transition is running
    pub fn is_transitioning(&self) -> bool {
        self.inner
            .in_flight
            .lock()
            .as_ref()
            .is_some_and(|future| !future.is_done())
    }

    pub fn partition_id(&self) -> u32 {
        self.inner.partition_id
    }

    /// Role of the last successful transition
    pub fn current_role(&self) -> Option<Role> {
        self.inner.context.lock().current_role()
    }

    pub fn current_term(&self) -> u64 {
        self.inner.context.lock().current_term()
    }

    pub fn has_stream_processor(&self) -> bool {
        self.inner.context.lock().stream_processor().is_some()
    }

    /// Lock the context (blocks while a transition is running)
    pub fn context(&self) -> MutexGuard<'_, PartitionTransitionContext> {
        self.inner.context.lock()
    }
}

impl TransitionInner {
    fn run(&self, term: u64, target: Role) -> Result<()> {
        let mut context = self.context.lock();
        let from = context.current_role();
        tracing::info!(partition = self.partition_id, from = ?from, to = %target, term, "transition started");

        for step in self.steps.iter().rev() {
            step.prepare_transition(&mut context, term, target)
                .map_err(|e| self.step_failed(step.name(), "prepare", target, e))?;
        }

        for step in &self.steps {
            step.transition_to(&mut context, term, target)
                .map_err(|e| self.step_failed(step.name(), "transition", target, e))?;
        }

        context.set_current_role(target);
        context.set_current_term(term);
        tracing::info!(partition = self.partition_id, to = %target, term, "transition completed");
        Ok(())
    }

    fn step_failed(&self, step: &str, phase: &str, target: Role, error: LogError) -> LogError {
        tracing::error!(partition = self.partition_id, step, phase, to = %target, error = %error, "transition step failed");
        error
    }
}
