//! Tests for Partition Transitions
//!
//! These tests verify:
//! - End-to-end role changes over a real log stream
//! - The role and term are recorded only after both phases succeed
//! - Concurrent transitions are rejected, never interleaved
//! - Install failures stop the partition and report unhealthy

mod support;

use std::sync::Arc;

use logstream::partition::{
    ComponentHealthMonitor, HealthStatus, LogStreamTransitionStep, PartitionTransition,
    PartitionTransitionContext, PartitionTransitionStep, Role, StreamProcessorMode,
    StreamProcessorTransitionStep,
};
use logstream::{ActorFuture, LogError, LogStream, LogStreamConfig, LogStreamState, MemoryLogStorage};

use support::{wait_until, CountingFactory};

// =============================================================================
// Helper Functions
// =============================================================================

struct Partition {
    transition: PartitionTransition,
    factory: Arc<CountingFactory>,
    monitor: Arc<ComponentHealthMonitor>,
    log_stream: LogStream,
}

fn setup_partition() -> Partition {
    let config = LogStreamConfig::builder()
        .log_name("partition-1")
        .partition_id(1)
        .write_buffer_size(64 * 1024)
        .max_append_block_size(4096)
        .build()
        .unwrap();
    let log_stream = LogStream::new(config, Arc::new(MemoryLogStorage::new())).unwrap();

    let factory = CountingFactory::new();
    let monitor = Arc::new(ComponentHealthMonitor::new());
    let context =
        PartitionTransitionContext::new(1, monitor.clone()).with_log_stream(log_stream.clone());
    let steps: Vec<Box<dyn PartitionTransitionStep>> = vec![
        Box::new(LogStreamTransitionStep::new()),
        Box::new(StreamProcessorTransitionStep::new(factory.clone())),
    ];

    Partition {
        transition: PartitionTransition::new(context, steps),
        factory,
        monitor,
        log_stream,
    }
}

// =============================================================================
// Role Change Tests
// =============================================================================

#[test]
fn test_uninitialized_to_follower() {
    let partition = setup_partition();
    assert_eq!(partition.transition.current_role(), None);

    partition.transition.transition_to(1, Role::Follower).join().unwrap();

    assert_eq!(partition.transition.current_role(), Some(Role::Follower));
    assert_eq!(partition.transition.current_term(), 1);
    assert_eq!(partition.log_stream.state(), LogStreamState::Open);
    assert_eq!(partition.log_stream.term(), 1);
    assert_eq!(partition.factory.built(), 1);
    assert_eq!(partition.factory.total_opens(), 1);

    let processor = partition.factory.last();
    assert_eq!(processor.mode, StreamProcessorMode::Replay);
    assert_eq!(processor.term, 1);
    assert!(processor.has_log_stream);
}

#[test]
fn test_follower_to_leader_replaces_processor() {
    let partition = setup_partition();
    partition.transition.transition_to(1, Role::Follower).join().unwrap();

    partition.transition.transition_to(2, Role::Leader).join().unwrap();

    assert_eq!(partition.transition.current_role(), Some(Role::Leader));
    assert_eq!(partition.log_stream.term(), 2);
    assert_eq!(partition.factory.built(), 2);
    assert_eq!(partition.factory.processor(0).closes(), 1);
    assert_eq!(partition.factory.processor(1).opens(), 1);
    assert_eq!(partition.factory.processor(1).mode, StreamProcessorMode::Processing);
}

#[test]
fn test_candidate_to_follower_keeps_processor() {
    let partition = setup_partition();
    partition.transition.transition_to(1, Role::Follower).join().unwrap();
    partition.transition.transition_to(2, Role::Candidate).join().unwrap();
    partition.transition.transition_to(2, Role::Follower).join().unwrap();

    assert_eq!(partition.factory.built(), 1);
    assert_eq!(partition.factory.total_opens(), 1);
    assert_eq!(partition.factory.total_closes(), 0);
    assert!(partition.transition.has_stream_processor());
}

#[test]
fn test_leader_to_inactive_closes_everything() {
    let partition = setup_partition();
    partition.transition.transition_to(1, Role::Leader).join().unwrap();
    assert_eq!(
        partition.monitor.status("log-stream-1"),
        Some(HealthStatus::Healthy)
    );

    partition.transition.transition_to(1, Role::Inactive).join().unwrap();

    assert_eq!(partition.transition.current_role(), Some(Role::Inactive));
    assert!(!partition.transition.has_stream_processor());
    assert_eq!(partition.factory.built(), 1);
    assert_eq!(partition.factory.processor(0).closes(), 1);
    assert_eq!(partition.log_stream.state(), LogStreamState::Closed);
    assert!(partition.monitor.components().is_empty());
}

#[test]
fn test_inactive_then_leader_reopens_log_stream() {
    let partition = setup_partition();
    partition.transition.transition_to(1, Role::Follower).join().unwrap();
    partition.transition.transition_to(1, Role::Inactive).join().unwrap();

    partition.transition.transition_to(2, Role::Leader).join().unwrap();

    assert_eq!(partition.log_stream.state(), LogStreamState::Open);
    assert_eq!(partition.factory.built(), 2);
    assert!(partition.transition.has_stream_processor());
}

#[test]
fn test_leader_can_write_to_log_stream() {
    let partition = setup_partition();
    partition.transition.transition_to(1, Role::Leader).join().unwrap();

    partition.log_stream.try_write(b"command").unwrap();
    assert!(partition
        .log_stream
        .write_buffer()
        .wait_until_drained(support::WAIT));
    assert_eq!(partition.log_stream.current_appender_position(), 7);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_transition_is_rejected() {
    let partition = setup_partition();
    let gate = ActorFuture::new();
    partition.factory.gate_opens(gate.clone());

    let first = partition.transition.transition_to(1, Role::Follower);
    // The first transition is now blocked opening its processor
    assert!(wait_until(|| partition.factory.built() == 1));
    assert!(partition.transition.is_transitioning());

    let second = partition.transition.transition_to(2, Role::Leader).join();
    assert!(matches!(
        second,
        Err(LogError::TransitionInProgress { partition_id: 1, .. })
    ));

    gate.complete(());
    first.join().unwrap();
    assert!(!partition.transition.is_transitioning());
    assert_eq!(partition.transition.current_role(), Some(Role::Follower));
    assert_eq!(partition.factory.built(), 1);

    // Accepted once the first one finished
    partition.transition.transition_to(2, Role::Leader).join().unwrap();
    assert_eq!(partition.transition.current_role(), Some(Role::Leader));
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_install_failure_keeps_previous_role() {
    let partition = setup_partition();
    partition.transition.transition_to(1, Role::Follower).join().unwrap();
    partition.factory.fail_open(true);

    let result = partition.transition.transition_to(2, Role::Leader).join();

    assert!(matches!(result, Err(LogError::TransitionFailed { .. })));
    assert_eq!(partition.transition.current_role(), Some(Role::Follower));
    assert_eq!(partition.transition.current_term(), 1);
    assert!(!partition.transition.has_stream_processor());
    assert!(!partition.monitor.health().is_healthy());
}

#[test]
fn test_partition_recovers_after_failed_install() {
    let partition = setup_partition();
    partition.factory.fail_build(true);
    assert!(partition.transition.transition_to(1, Role::Leader).join().is_err());

    partition.factory.fail_build(false);
    partition.transition.transition_to(2, Role::Leader).join().unwrap();

    assert!(partition.transition.has_stream_processor());
    assert_eq!(
        partition.monitor.status("stream-processor"),
        Some(HealthStatus::Healthy)
    );
}

#[test]
fn test_active_role_without_log_stream_fails() {
    let monitor = Arc::new(ComponentHealthMonitor::new());
    let steps: Vec<Box<dyn PartitionTransitionStep>> = vec![Box::new(LogStreamTransitionStep::new())];
    let transition = PartitionTransition::new(PartitionTransitionContext::new(7, monitor), steps);

    let result = transition.transition_to(1, Role::Follower).join();

    assert!(matches!(result, Err(LogError::InvalidState(_))));
    assert_eq!(transition.current_role(), None);
}
