//! Partition transition context
//!
//! The components a role transition acts on. Owned by the transition
//! orchestrator; steps receive it mutably, one transition at a time.

use std::fmt;
use std::sync::Arc;

use crate::log::LogStream;

use super::{HealthMonitor, Role, StreamProcessor};

pub struct PartitionTransitionContext {
    partition_id: u32,

    /// Role of the last completed transition (None before the first)
    current_role: Option<Role>,

    /// Term of the last completed transition
    current_term: u64,

    log_stream: Option<LogStream>,

    /// At most one live processor
    stream_processor: Option<Arc<dyn StreamProcessor>>,

    health_monitor: Arc<dyn HealthMonitor>,

    /// Whether installed processors start processing or start paused
    should_process: bool,
}

impl PartitionTransitionContext {
    pub fn new(partition_id: u32, health_monitor: Arc<dyn HealthMonitor>) -> Self {
        Self {
            partition_id,
            current_role: None,
            current_term: 0,
            log_stream: None,
            stream_processor: None,
            health_monitor,
            should_process: true,
        }
    }

    /// Attach the partition's log stream
    pub fn with_log_stream(mut self, log_stream: LogStream) -> Self {
        self.log_stream = Some(log_stream);
        self
    }

    pub fn partition_id(&self) -> u32 {
        self.partition_id
    }

    pub fn current_role(&self) -> Option<Role> {
        self.current_role
    }

    pub fn set_current_role(&mut self, role: Role) {
        self.current_role = Some(role);
    }

    pub fn current_term(&self) -> u64 {
        self.current_term
    }

    pub fn set_current_term(&mut self, term: u64) {
        self.current_term = term;
    }

    pub fn log_stream(&self) -> Option<&LogStream> {
        self.log_stream.as_ref()
    }

    pub fn set_log_stream(&mut self, log_stream: Option<LogStream>) {
        self.log_stream = log_stream;
    }

    pub fn stream_processor(&self) -> Option<&Arc<dyn StreamProcessor>> {
        self.stream_processor.as_ref()
    }

    pub fn set_stream_processor(&mut self, processor: Option<Arc<dyn StreamProcessor>>) {
        self.stream_processor = processor;
    }

    /// Remove and return the processor
    pub fn take_stream_processor(&mut self) -> Option<Arc<dyn StreamProcessor>> {
        self.stream_processor.take()
    }

    pub fn health_monitor(&self) -> &Arc<dyn HealthMonitor> {
        &self.health_monitor
    }

    pub fn should_process(&self) -> bool {
        self.should_process
    }

    pub fn set_should_process(&mut self, should_process: bool) {
        self.should_process = should_process;
    }
}

impl fmt::Debug for PartitionTransitionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionTransitionContext")
            .field("partition_id", &self.partition_id)
            .field("current_role", &self.current_role)
            .field("current_term", &self.current_term)
            .field("log_stream", &self.log_stream)
            .field("has_stream_processor", &self.stream_processor.is_some())
            .field("should_process", &self.should_process)
            .finish()
    }
}
