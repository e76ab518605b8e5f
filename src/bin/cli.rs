//! logstream CLI
//!
//! Command-line interface for inspecting and editing a file-backed log.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use logstream::{FileLogStorage, LogError, LogStream, LogStreamConfig, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// logstream CLI
#[derive(Parser, Debug)]
#[command(name = "logstream-cli")]
#[command(about = "Append to, dump and truncate a partition log file")]
#[command(version)]
struct Args {
    /// Log file
    #[arg(short, long, global = true, default_value = "./partition-1.log")]
    file: PathBuf,

    /// Partition id recorded in the log config
    #[arg(short, long, global = true, default_value = "1")]
    partition: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Append one record per payload
    Append {
        /// Record payloads
        #[arg(required = true)]
        payloads: Vec<String>,

        /// How long to wait for write buffer space (ms)
        #[arg(long, default_value = "1000")]
        timeout_ms: u64,
    },

    /// Print the records of the log
    Dump {
        /// Start at the first record at or after this position
        #[arg(long)]
        from: Option<i64>,

        /// Bytes of payload to show per record
        #[arg(long, default_value = "32")]
        preview: usize,
    },

    /// Delete the record at a position and everything after it
    Truncate {
        /// First position to delete
        position: i64,

        /// Commit position; committed records are never truncated
        #[arg(long)]
        commit_position: Option<i64>,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,logstream=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();
    tracing::debug!("logstream CLI v{}", logstream::VERSION);

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Commands::Append {
            payloads,
            timeout_ms,
        } => {
            let stream = open_stream(&args.file, args.partition, false)?;
            let first = stream.current_appender_position();
            let mut next = first;

            for payload in &payloads {
                stream.write(payload.as_bytes(), Duration::from_millis(timeout_ms))?;
                next += payload.len() as i64;
            }
            stream.close().join()?;

            println!(
                "appended {} records at positions [{}, {})",
                payloads.len(),
                first,
                next
            );
        }

        Commands::Dump { from, preview } => {
            let stream = open_stream(&args.file, args.partition, true)?;
            let mut reader = stream.new_reader();
            if let Some(position) = from {
                reader.seek(position)?;
            }

            println!("{:>12}  {:>12}  {:>8}  payload", "position", "address", "length");
            let mut count = 0u64;
            for record in reader {
                let record = record?;
                let shown = &record.payload[..record.payload.len().min(preview)];
                println!(
                    "{:>12}  {:>12}  {:>8}  {}",
                    record.position,
                    record.address,
                    record.payload.len(),
                    String::from_utf8_lossy(shown)
                );
                count += 1;
            }
            println!("{} records", count);
            stream.close().join()?;
        }

        Commands::Truncate {
            position,
            commit_position,
        } => {
            let stream = open_stream(&args.file, args.partition, true)?;
            if let Some(commit_position) = commit_position {
                stream.set_commit_position(commit_position);
            }
            let result = stream.truncate(position).join();
            stream.close().join()?;
            result?;
            println!("truncated from position {}", position);
        }
    }
    Ok(())
}

/// Open the log at `file`; the block index snapshot lives next to it
fn open_stream(file: &Path, partition: u32, read_only: bool) -> Result<LogStream> {
    let log_name = file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| LogError::Config(format!("invalid log file {}", file.display())))?;

    let mut builder = LogStreamConfig::builder()
        .log_name(log_name)
        .partition_id(partition)
        .appender_disabled(read_only);
    if let Some(dir) = file.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
        builder = builder.data_dir(dir);
    }

    let storage = Arc::new(FileLogStorage::new(file));
    let stream = LogStream::new(builder.build()?, storage)?;
    stream.open().join()?;
    Ok(stream)
}
