//! CLI commands

use crate::core::temporal::Timestamp;
use crate::error::Result;
use crate::store::TemporalStore;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

/// Temporal-KV CLI
#[derive(Parser)]
#[command(name = "temporal-kv")]
#[command(about = "Temporal key-value store")]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the file backend, overrides the configured backend
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a value for a key at a timestamp
    Put {
        /// Key
        #[arg(short, long)]
        key: String,
        /// Value
        #[arg(short, long)]
        value: String,
        /// Logical timestamp
        #[arg(short, long, allow_negative_numbers = true)]
        timestamp: i64,
    },
    /// Read the value of a key at or before a timestamp
    Get {
        /// Key
        #[arg(short, long)]
        key: String,
        /// Logical timestamp (AS OF), defaults to now in milliseconds
        #[arg(short, long, allow_negative_numbers = true)]
        timestamp: Option<i64>,
    },
    /// List every version of a key
    History {
        /// Key
        #[arg(short, long)]
        key: String,
    },
}

impl Commands {
    /// Run the command against `store`, writing results to `out`
    pub async fn execute<W: Write>(self, store: &TemporalStore, out: &mut W) -> Result<()> {
        match self {
            Commands::Put {
                key,
                value,
                timestamp,
            } => {
                let record = store.put(&key, &value, Timestamp::new(timestamp)).await?;
                writeln!(out, "{}", serde_json::to_string(&record)?)?;
            }
            Commands::Get { key, timestamp } => {
                let timestamp = timestamp.map(Timestamp::new).unwrap_or_else(Timestamp::now_millis);
                match store.get(&key, timestamp).await? {
                    Some(value) => writeln!(out, "{value}")?,
                    None => tracing::info!(key = %key, %timestamp, "no value at or before timestamp"),
                }
            }
            Commands::History { key } => {
                for record in store.history(&key).await? {
                    writeln!(out, "{}", serde_json::to_string(&record)?)?;
                }
            }
        }
        Ok(())
    }
}
