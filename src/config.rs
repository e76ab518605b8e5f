//! Configuration for a partition log stream
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{LogError, Result};

/// Main configuration for a LogStream instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogStreamConfig {
    // -------------------------------------------------------------------------
    // Identity
    // -------------------------------------------------------------------------
    /// Human readable log name, used for thread names and snapshot files
    pub log_name: String,

    /// Partition this log belongs to
    pub partition_id: u32,

    /// Directory for the block index snapshot
    /// Internal structure:
    ///   {data_dir}/
    ///     └── {log_name}.idx   (block index snapshot, written on close)
    ///
    /// `None` keeps the index in memory only; it is rebuilt from storage on open.
    pub data_dir: Option<PathBuf>,

    // -------------------------------------------------------------------------
    // Write Buffer Configuration
    // -------------------------------------------------------------------------
    /// Capacity of the claim/commit ring buffer (in bytes)
    pub write_buffer_size: usize,

    /// How long close waits for outstanding claims (milliseconds)
    pub close_grace_period_ms: u64,

    // -------------------------------------------------------------------------
    // Appender Configuration
    // -------------------------------------------------------------------------
    /// Largest block the controller writes with a single storage append
    pub max_append_block_size: usize,

    /// Sync strategy: how often to flush storage after appending blocks
    pub sync_strategy: SyncStrategy,

    /// Open the log without an appender (read-only replica)
    pub appender_disabled: bool,

    // -------------------------------------------------------------------------
    // Index / Read Configuration
    // -------------------------------------------------------------------------
    /// Target number of bytes between two block index entries
    pub index_block_size: usize,

    /// Allowed deviation from `index_block_size`, in (0, 1]
    pub deviation: f32,

    /// Size of the window a reader fetches from storage at once
    pub read_block_size: usize,
}

/// Storage sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStrategy {
    /// flush after every appended block (safest, slowest)
    EveryBlock,

    /// flush after N appended blocks (balanced durability/performance)
    EveryNBlocks { count: usize },
}

impl Default for LogStreamConfig {
    fn default() -> Self {
        Self {
            log_name: "log".to_string(),
            partition_id: 0,
            data_dir: None,
            write_buffer_size: 16 * 1024 * 1024,    // 16 MB
            close_grace_period_ms: 5000,
            max_append_block_size: 4 * 1024 * 1024, // 4 MB
            sync_strategy: SyncStrategy::EveryBlock,
            appender_disabled: false,
            index_block_size: 4 * 1024 * 1024,      // 4 MB
            deviation: 0.1,
            read_block_size: 1024,
        }
    }
}

impl LogStreamConfig {
    /// Create a new config builder
    pub fn builder() -> LogStreamConfigBuilder {
        LogStreamConfigBuilder::default()
    }

    /// Check that all knobs are within their valid ranges
    pub fn validate(&self) -> Result<()> {
        if self.log_name.is_empty() {
            return Err(LogError::Config("log_name must not be empty".to_string()));
        }
        if self.write_buffer_size == 0 {
            return Err(LogError::Config("write_buffer_size must be > 0".to_string()));
        }
        if self.max_append_block_size == 0 {
            return Err(LogError::Config("max_append_block_size must be > 0".to_string()));
        }
        if self.index_block_size == 0 {
            return Err(LogError::Config("index_block_size must be > 0".to_string()));
        }
        if self.read_block_size == 0 {
            return Err(LogError::Config("read_block_size must be > 0".to_string()));
        }
        if !(self.deviation > 0.0 && self.deviation <= 1.0) {
            return Err(LogError::Config(format!(
                "deviation must be in (0, 1], got {}",
                self.deviation
            )));
        }
        if let SyncStrategy::EveryNBlocks { count: 0 } = self.sync_strategy {
            return Err(LogError::Config(
                "EveryNBlocks sync strategy needs count > 0".to_string(),
            ));
        }
        if self.max_fragment_length() == 0 {
            return Err(LogError::Config(format!(
                "buffer/block size too small to hold a single record (header is {} bytes)",
                crate::log::FRAME_HEADER_SIZE
            )));
        }
        Ok(())
    }

    /// Largest payload a single record may carry
    ///
    /// A record must fit into the write buffer and into one append block.
    pub fn max_fragment_length(&self) -> usize {
        self.write_buffer_size
            .min(self.max_append_block_size)
            .saturating_sub(crate::log::FRAME_HEADER_SIZE)
    }

    /// Bytes written between two block index entries
    pub fn index_sampling_threshold(&self) -> usize {
        let threshold = self.index_block_size as f64 * (1.0 - self.deviation as f64);
        (threshold as usize).max(1)
    }

    /// Path of the block index snapshot, if snapshots are enabled
    pub fn index_snapshot_path(&self) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.idx", self.log_name)))
    }
}

/// Builder for LogStreamConfig
#[derive(Default)]
pub struct LogStreamConfigBuilder {
    config: LogStreamConfig,
}

impl LogStreamConfigBuilder {
    /// Set the log name
    pub fn log_name(mut self, name: impl Into<String>) -> Self {
        self.config.log_name = name.into();
        self
    }

    /// Set the partition id
    pub fn partition_id(mut self, partition_id: u32) -> Self {
        self.config.partition_id = partition_id;
        self
    }

    /// Set the directory holding the block index snapshot
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = Some(path.into());
        self
    }

    /// Set the write buffer capacity (in bytes)
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.config.write_buffer_size = size;
        self
    }

    /// Set the close grace period (in milliseconds)
    pub fn close_grace_period_ms(mut self, ms: u64) -> Self {
        self.config.close_grace_period_ms = ms;
        self
    }

    /// Set the maximum append block size (in bytes)
    pub fn max_append_block_size(mut self, size: usize) -> Self {
        self.config.max_append_block_size = size;
        self
    }

    /// Set the storage sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Open the log without an appender
    pub fn appender_disabled(mut self, disabled: bool) -> Self {
        self.config.appender_disabled = disabled;
        self
    }

    /// Set the index block size (in bytes)
    pub fn index_block_size(mut self, size: usize) -> Self {
        self.config.index_block_size = size;
        self
    }

    /// Set the index deviation factor
    pub fn deviation(mut self, deviation: f32) -> Self {
        self.config.deviation = deviation;
        self
    }

    /// Set the reader block size (in bytes)
    pub fn read_block_size(mut self, size: usize) -> Self {
        self.config.read_block_size = size;
        self
    }

    pub fn build(self) -> Result<LogStreamConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
