//! Tests for the Block Index Controller
//!
//! These tests verify:
//! - Recovery of the next position from storage
//! - Index sampling by written bytes
//! - Torn tail truncation on open
//! - Corruption inside the log and at committed positions fails the open
//! - Snapshot persistence and validation against storage

use std::sync::Arc;

use bytes::BytesMut;
use logstream::log::{encode_frame, BlockIndex, BlockIndexController};
use logstream::{LogError, INVALID_POSITION};
use logstream::storage::{LogStorage, MemoryLogStorage};
use parking_lot::RwLock;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Write `count` records of `payload_len` bytes from position 0, one block each
fn write_records(storage: &MemoryLogStorage, count: usize, payload_len: usize) {
    let mut position = 0i64;
    for _ in 0..count {
        let mut block = BytesMut::new();
        encode_frame(&mut block, position, &vec![5u8; payload_len]);
        storage.append(&block).unwrap();
        position += payload_len as i64;
    }
}

fn setup_controller(
    storage: &Arc<MemoryLogStorage>,
    threshold: usize,
    snapshot: Option<std::path::PathBuf>,
) -> (BlockIndexController, Arc<RwLock<BlockIndex>>) {
    let index = Arc::new(RwLock::new(BlockIndex::new()));
    let controller =
        BlockIndexController::new(Arc::clone(&index), storage.clone(), threshold, 256, snapshot);
    (controller, index)
}

fn open_storage() -> Arc<MemoryLogStorage> {
    let storage = Arc::new(MemoryLogStorage::new());
    storage.open().unwrap();
    storage
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_open_empty_log() {
    let storage = open_storage();
    let (controller, index) = setup_controller(&storage, 100, None);

    let recovered = controller.open(INVALID_POSITION).unwrap();

    assert_eq!(recovered.next_position, 0);
    assert_eq!(recovered.last_position, None);
    assert_eq!(recovered.records_scanned, 0);
    assert!(!recovered.truncated_tail);
    assert!(index.read().is_empty());
    assert!(controller.is_open());
}

#[test]
fn test_open_recovers_next_position_and_samples_index() {
    let storage = open_storage();
    // 10 frames of 20 bytes (4 payload bytes each)
    write_records(&storage, 10, 4);
    let (controller, index) = setup_controller(&storage, 60, None);

    let recovered = controller.open(INVALID_POSITION).unwrap();

    assert_eq!(recovered.next_position, 40);
    assert_eq!(recovered.last_position, Some(36));
    assert_eq!(recovered.records_scanned, 10);
    // An entry every 3 frames (60 bytes): records 0, 3, 6, 9
    assert_eq!(
        index.read().entries().collect::<Vec<_>>(),
        vec![(0, 0), (12, 60), (24, 120), (36, 180)]
    );
}

#[test]
fn test_open_truncates_torn_tail() {
    let storage = open_storage();
    write_records(&storage, 3, 8);
    let good_end = storage.len() as u64;
    storage.append(&[0xAB; 10]).unwrap();

    let (controller, _index) = setup_controller(&storage, 1000, None);
    let recovered = controller.open(INVALID_POSITION).unwrap();

    assert!(recovered.truncated_tail);
    assert_eq!(recovered.next_position, 24);
    assert_eq!(storage.end_address().unwrap(), good_end);
}

#[test]
fn test_open_fails_on_corrupt_record_inside_log() {
    let storage = open_storage();
    // Three frames of 20 bytes; flip a payload byte of the second one
    let mut log = BytesMut::new();
    for position in [0i64, 4, 8] {
        encode_frame(&mut log, position, &[7u8; 4]);
    }
    log[20 + 16] ^= 0xFF;
    storage.append(&log).unwrap();

    let (controller, _index) = setup_controller(&storage, 1000, None);
    let result = controller.open(INVALID_POSITION);

    assert!(matches!(
        result,
        Err(LogError::Corruption { address: 20, .. })
    ));
    assert!(!controller.is_open());
    assert_eq!(storage.end_address().unwrap(), 60);
}

#[test]
fn test_open_keeps_torn_tail_at_committed_position() {
    let storage = open_storage();
    write_records(&storage, 3, 8);
    storage.append(&[0xAB; 10]).unwrap();
    let end = storage.end_address().unwrap();

    let (controller, _index) = setup_controller(&storage, 1000, None);
    let result = controller.open(24);

    assert!(matches!(result, Err(LogError::Corruption { .. })));
    assert_eq!(storage.end_address().unwrap(), end);

    // Below the commit position the torn frame is cut as usual
    let recovered = controller.open(23).unwrap();
    assert!(recovered.truncated_tail);
    assert_eq!(recovered.next_position, 24);
}

#[test]
fn test_open_fails_on_repeated_positions() {
    let storage = open_storage();
    write_records(&storage, 3, 4);
    write_records(&storage, 3, 4);

    let (controller, _index) = setup_controller(&storage, 1000, None);
    let result = controller.open(INVALID_POSITION);

    assert!(matches!(
        result,
        Err(LogError::Corruption { address: 60, .. })
    ));
    assert_eq!(storage.end_address().unwrap(), 120);
}

// =============================================================================
// Sampling Tests
// =============================================================================

#[test]
fn test_on_block_written_samples_by_bytes() {
    let storage = open_storage();
    let (controller, index) = setup_controller(&storage, 100, None);
    controller.open(INVALID_POSITION).unwrap();

    controller.on_block_written(0, 0, 60).unwrap();
    controller.on_block_written(10, 60, 60).unwrap();
    controller.on_block_written(20, 120, 60).unwrap();
    controller.on_block_written(30, 180, 60).unwrap();

    assert_eq!(
        index.read().entries().collect::<Vec<_>>(),
        vec![(0, 0), (20, 120)]
    );
}

#[test]
fn test_truncate_forces_next_entry() {
    let storage = open_storage();
    let (controller, index) = setup_controller(&storage, 1000, None);
    controller.open(INVALID_POSITION).unwrap();

    controller.on_block_written(0, 0, 50).unwrap();
    controller.on_block_written(10, 50, 50).unwrap();
    controller.truncate(10, 50);
    controller.on_block_written(10, 50, 50).unwrap();

    assert_eq!(
        index.read().entries().collect::<Vec<_>>(),
        vec![(0, 0), (10, 50)]
    );
}

// =============================================================================
// Snapshot Tests
// =============================================================================

#[test]
fn test_close_writes_snapshot_and_open_loads_it() {
    let temp = TempDir::new().unwrap();
    let snapshot = temp.path().join("log.idx");
    let storage = open_storage();
    write_records(&storage, 10, 4);

    let (controller, index) = setup_controller(&storage, 60, Some(snapshot.clone()));
    controller.open(INVALID_POSITION).unwrap();
    let expected = index.read().clone();
    controller.close().unwrap();
    assert!(snapshot.exists());

    let (reopened, reopened_index) = setup_controller(&storage, 60, Some(snapshot));
    let recovered = reopened.open(INVALID_POSITION).unwrap();

    assert_eq!(*reopened_index.read(), expected);
    // Only the tail after the last snapshot entry is scanned
    assert_eq!(recovered.records_scanned, 1);
    assert_eq!(recovered.next_position, 40);
}

#[test]
fn test_snapshot_entries_past_storage_end_are_dropped() {
    let temp = TempDir::new().unwrap();
    let snapshot = temp.path().join("log.idx");
    let storage = open_storage();
    write_records(&storage, 10, 4);

    let (controller, _) = setup_controller(&storage, 60, Some(snapshot.clone()));
    controller.open(INVALID_POSITION).unwrap();
    controller.close().unwrap();

    // Storage lost its last 5 records after the snapshot was written
    storage.truncate(100).unwrap();

    let (reopened, index) = setup_controller(&storage, 60, Some(snapshot));
    let recovered = reopened.open(INVALID_POSITION).unwrap();

    assert_eq!(recovered.next_position, 20);
    assert!(index.read().entries().all(|(_, address)| address < 100));
}
