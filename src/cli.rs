//! Command-line interface definitions for letssync.
//!
//! The CLI definitions are shared between the main binary and build tools (like
//! xtask) for man page generation.
//!
//! Note: Field-level documentation is provided via clap attributes, so we allow
//! missing_docs for this module to avoid redundant documentation.

#![allow(missing_docs)]

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Main CLI structure for letssync.
#[derive(Parser)]
#[command(
    name = "letssync",
    version = crate::VERSION,
    about = "Snapshot, diff and rebuild certificate directories",
    long_about = "Models a Let's Encrypt style configuration directory as a typed tree that can be \
                  scanned, serialized, diffed against another copy and written back without \
                  clobbering existing files"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: ~/.config/letssync/config.toml)
    #[arg(long, global = true, env = "LETSSYNC_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress informational messages
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// All available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Scan a directory and print its snapshot
    Scan {
        /// Directory to scan
        dir: PathBuf,

        /// Write the snapshot to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Logical tree name stored in the snapshot
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show differences between two directories or snapshots
    Diff {
        /// First side (directory or snapshot file)
        old: PathBuf,

        /// Second side (directory or snapshot file)
        new: PathBuf,

        /// Only list changed paths
        #[arg(long)]
        name_only: bool,
    },

    /// Rebuild a snapshot onto disk
    Write {
        /// Snapshot file produced by `scan`
        snapshot: PathBuf,

        /// Directory to write the tree into
        dir: PathBuf,

        /// Replace existing files and symlinks
        #[arg(long)]
        overwrite: bool,
    },

    /// Copy a directory tree to a new location
    Copy {
        /// Directory to copy
        src: PathBuf,

        /// Destination root
        dst: PathBuf,

        /// Replace existing files and symlinks
        #[arg(long)]
        overwrite: bool,
    },

    /// Report symlinks that do not resolve inside a directory
    Check {
        /// Directory to check
        dir: PathBuf,
    },

    /// Get and set configuration options
    Config {
        /// Configuration key (section.key)
        key: Option<String>,

        /// Value to set
        value: Option<String>,

        /// List all configuration values
        #[arg(short, long)]
        list: bool,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
