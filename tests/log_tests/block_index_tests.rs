//! Tests for the Block Index
//!
//! These tests verify:
//! - Floor lookups (exact, between entries, before first entry)
//! - Strictly increasing appends
//! - Truncation by position and by address
//! - Snapshot write/read

use logstream::log::{BlockIndex, IndexLookup};
use logstream::LogError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Index with entries (0, 0), (100, 1000), (200, 2000), ...
fn index_with_entries(count: i64) -> BlockIndex {
    let mut index = BlockIndex::new();
    for i in 0..count {
        index.append(i * 100, (i * 1000) as u64).unwrap();
    }
    index
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[test]
fn test_lookup_empty_index() {
    let index = BlockIndex::new();
    assert_eq!(index.lookup(42), IndexLookup::BeforeFirstEntry);
    assert_eq!(index.lookup(42).address_or(7), 7);
}

#[test]
fn test_lookup_exact_entry() {
    let index = index_with_entries(5);
    assert_eq!(
        index.lookup(200),
        IndexLookup::Entry {
            position: 200,
            address: 2000
        }
    );
}

#[test]
fn test_lookup_returns_floor_entry() {
    let index = index_with_entries(5);
    assert_eq!(
        index.lookup(250),
        IndexLookup::Entry {
            position: 200,
            address: 2000
        }
    );
    assert_eq!(
        index.lookup(i64::MAX),
        IndexLookup::Entry {
            position: 400,
            address: 4000
        }
    );
}

#[test]
fn test_lookup_before_first_entry() {
    let mut index = BlockIndex::new();
    index.append(50, 500).unwrap();
    assert_eq!(index.lookup(49), IndexLookup::BeforeFirstEntry);
}

// =============================================================================
// Append Tests
// =============================================================================

#[test]
fn test_append_rejects_non_increasing_position() {
    let mut index = index_with_entries(2);
    let result = index.append(100, 5000);
    assert!(matches!(result, Err(LogError::InvalidArgument(_))));
    assert_eq!(index.len(), 2);
}

#[test]
fn test_append_rejects_non_increasing_address() {
    let mut index = index_with_entries(2);
    let result = index.append(150, 1000);
    assert!(matches!(result, Err(LogError::InvalidArgument(_))));
}

// =============================================================================
// Truncation Tests
// =============================================================================

#[test]
fn test_truncate_after_keeps_entries_at_or_below() {
    let mut index = index_with_entries(5);
    index.truncate_after(200);
    assert_eq!(index.len(), 3);
    assert_eq!(index.last_entry(), Some((200, 2000)));

    // Appends continue after the new last entry
    index.append(210, 2100).unwrap();
}

#[test]
fn test_truncate_after_max_keeps_everything() {
    let mut index = index_with_entries(3);
    index.truncate_after(i64::MAX);
    assert_eq!(index.len(), 3);
}

#[test]
fn test_truncate_from_address() {
    let mut index = index_with_entries(5);
    index.truncate_from_address(2000);
    assert_eq!(
        index.entries().collect::<Vec<_>>(),
        vec![(0, 0), (100, 1000)]
    );
}

// =============================================================================
// Snapshot Tests
// =============================================================================

#[test]
fn test_snapshot_round_trip() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("log.idx");
    let index = index_with_entries(10);

    index.write_snapshot(&path).unwrap();
    let loaded = BlockIndex::read_snapshot(&path).unwrap();

    assert_eq!(loaded, Some(index));
}

#[test]
fn test_snapshot_missing_file() {
    let temp = TempDir::new().unwrap();
    let loaded = BlockIndex::read_snapshot(&temp.path().join("missing.idx")).unwrap();
    assert!(loaded.is_none());
}
