//! segdb CLI
//!
//! Maintenance tools for segdb data directories.
//!
//! # Commands
//!
//! - `inspect` - Show entities, segments, and storage totals
//! - `verify` - Check segment checksums
//! - `compact` - Merge small sealed segments
//! - `cleanup` - Delete sealed segments older than a number of days
//! - `drop` - Remove an entity and all its files

mod commands;

use clap::{Parser, Subcommand};
use commands::OpenOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// segdb command-line maintenance tools.
#[derive(Parser)]
#[command(name = "segdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data root
    #[arg(global = true, short, long)]
    root: Option<PathBuf>,

    /// Passphrase of an encrypted data root
    #[arg(global = true, long)]
    passphrase: Option<String>,

    /// AES key size in bits (128, 192, 256)
    #[arg(global = true, long, default_value_t = 256)]
    key_bits: u32,

    /// PBKDF2 iteration count
    #[arg(global = true, long)]
    iterations: Option<u32>,

    /// Gzip files written by this command
    #[arg(global = true, long)]
    compress: bool,

    /// Maximum segment size in megabytes
    #[arg(global = true, long, default_value_t = 10)]
    max_segment_mb: u64,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show entities, segments, and storage totals
    Inspect {
        /// Show per-segment details
        #[arg(short, long)]
        segments: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check segment checksums
    Verify {
        /// Entity to verify (all entities if omitted)
        entity: Option<String>,
    },

    /// Merge small sealed segments of an entity
    Compact {
        /// Entity to compact
        entity: String,

        /// Show planned batches without merging
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Delete sealed segments older than a number of days
    Cleanup {
        /// Entity to clean up
        entity: String,

        /// Age threshold in days
        #[arg(long)]
        older_than_days: u32,
    },

    /// Remove an entity with its segments, metadata, and index
    Drop {
        /// Entity to drop
        entity: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("segdb CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("segdb core v{}", segdb_core::VERSION);
        return Ok(());
    }

    let root = cli.root.ok_or("data root required (--root)")?;
    let options = OpenOptions {
        root,
        passphrase: cli.passphrase,
        key_bits: cli.key_bits,
        iterations: cli.iterations,
        compress: cli.compress,
        max_segment_mb: cli.max_segment_mb,
    };

    match cli.command {
        Commands::Inspect { segments, format } => {
            commands::inspect::run(&options, segments, &format)?;
        }
        Commands::Verify { entity } => {
            commands::verify::run(&options, entity.as_deref())?;
        }
        Commands::Compact { entity, dry_run } => {
            commands::compact::run(&options, &entity, dry_run)?;
        }
        Commands::Cleanup {
            entity,
            older_than_days,
        } => {
            commands::cleanup::run(&options, &entity, older_than_days)?;
        }
        Commands::Drop { entity } => {
            commands::drop_entity::run(&options, &entity)?;
        }
        Commands::Version => {}
    }

    Ok(())
}
