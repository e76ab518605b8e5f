//! Tests for Log Storage and record framing
//!
//! These tests verify:
//! - Append/read/truncate on file and memory storage
//! - Persistence across close/open
//! - Rejected calls on closed storage
//! - Frame encoding, checksums and torn frames

use bytes::{Bytes, BytesMut};
use logstream::log::{decode_frame, encode_frame, frame_length, FRAME_HEADER_SIZE};
use logstream::storage::{FileLogStorage, LogStorage, MemoryLogStorage};
use logstream::LogError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_storage() -> (TempDir, FileLogStorage) {
    let temp_dir = TempDir::new().unwrap();
    let storage = FileLogStorage::open_path(&temp_dir.path().join("partition-1.log")).unwrap();
    (temp_dir, storage)
}

/// Append/read/truncate contract shared by every storage
fn check_append_read_truncate(storage: &dyn LogStorage) {
    assert_eq!(storage.end_address().unwrap(), 0);

    let first = storage.append(b"hello").unwrap();
    let second = storage.append(b"world!").unwrap();
    assert_eq!(first, 0);
    assert_eq!(second, 5);
    assert_eq!(storage.end_address().unwrap(), 11);

    assert_eq!(storage.read(0, 5).unwrap(), Bytes::from_static(b"hello"));
    assert_eq!(storage.read(5, 100).unwrap(), Bytes::from_static(b"world!"));
    assert!(storage.read(11, 10).unwrap().is_empty());

    storage.truncate(5).unwrap();
    assert_eq!(storage.end_address().unwrap(), 5);
    assert!(storage.read(5, 10).unwrap().is_empty());

    assert!(matches!(
        storage.truncate(100),
        Err(LogError::InvalidArgument(_))
    ));

    let third = storage.append(b"again").unwrap();
    assert_eq!(third, 5);
    storage.flush().unwrap();
}

// =============================================================================
// File Storage Tests
// =============================================================================

#[test]
fn test_file_storage_append_read_truncate() {
    let (_temp, storage) = setup_temp_storage();
    check_append_read_truncate(&storage);
}

#[test]
fn test_file_storage_survives_reopen() {
    let (_temp, storage) = setup_temp_storage();
    storage.append(b"durable").unwrap();
    storage.close().unwrap();
    assert!(!storage.is_open());

    storage.open().unwrap();
    assert_eq!(storage.end_address().unwrap(), 7);
    assert_eq!(storage.read(0, 7).unwrap(), Bytes::from_static(b"durable"));
}

#[test]
fn test_file_storage_rejects_calls_when_closed() {
    let temp_dir = TempDir::new().unwrap();
    let storage = FileLogStorage::new(temp_dir.path().join("closed.log"));

    assert!(matches!(storage.append(b"x"), Err(LogError::InvalidState(_))));
    assert!(matches!(storage.read(0, 1), Err(LogError::InvalidState(_))));
    assert!(matches!(storage.end_address(), Err(LogError::InvalidState(_))));
}

#[test]
fn test_file_storage_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("dir").join("p.log");
    let storage = FileLogStorage::open_path(&path).unwrap();
    storage.append(b"x").unwrap();
    assert!(path.exists());
    assert_eq!(storage.path(), path.as_path());
}

// =============================================================================
// Memory Storage Tests
// =============================================================================

#[test]
fn test_memory_storage_append_read_truncate() {
    let storage = MemoryLogStorage::new();
    storage.open().unwrap();
    check_append_read_truncate(&storage);
    assert_eq!(storage.flush_count(), 1);
}

#[test]
fn test_memory_storage_keeps_data_across_close() {
    let storage = MemoryLogStorage::new();
    storage.open().unwrap();
    storage.append(b"abc").unwrap();
    storage.close().unwrap();

    assert!(matches!(storage.append(b"x"), Err(LogError::InvalidState(_))));

    storage.open().unwrap();
    assert_eq!(storage.len(), 3);
    assert_eq!(storage.contents(), Bytes::from_static(b"abc"));
}

// =============================================================================
// Frame Tests
// =============================================================================

#[test]
fn test_frame_layout() {
    let mut buf = BytesMut::new();
    encode_frame(&mut buf, 42, b"payload");
    assert_eq!(buf.len(), frame_length(7));
    assert_eq!(&buf[0..4], &7u32.to_le_bytes());
    assert_eq!(&buf[8..16], &42i64.to_le_bytes());
    assert_eq!(&buf[FRAME_HEADER_SIZE..], b"payload");

    let record = decode_frame(&buf.freeze(), 100).unwrap().unwrap();
    assert_eq!(record.position, 42);
    assert_eq!(record.address, 100);
    assert_eq!(record.payload, Bytes::from_static(b"payload"));
    assert_eq!(record.next_address(), 100 + frame_length(7) as u64);
    assert_eq!(record.next_position(), 49);
}

#[test]
fn test_decode_empty_is_end_of_log() {
    assert!(decode_frame(&Bytes::new(), 0).unwrap().is_none());
}

#[test]
fn test_decode_torn_frame_is_corruption() {
    let mut buf = BytesMut::new();
    encode_frame(&mut buf, 0, b"0123456789");
    let torn = buf.freeze().slice(..FRAME_HEADER_SIZE + 4);

    assert!(matches!(
        decode_frame(&torn, 64),
        Err(LogError::Corruption { address: 64, .. })
    ));
    assert!(matches!(
        decode_frame(&torn.slice(..3), 64),
        Err(LogError::Corruption { address: 64, .. })
    ));
}

#[test]
fn test_decode_detects_flipped_payload_bit() {
    let mut buf = BytesMut::new();
    encode_frame(&mut buf, 7, b"checksummed");
    let last = buf.len() - 1;
    buf[last] ^= 0x01;

    assert!(matches!(
        decode_frame(&buf.freeze(), 0),
        Err(LogError::Corruption { .. })
    ));
}
