#![warn(missing_docs)]
#![allow(clippy::indexing_slicing)] // Arena ids are only handed out by the tree that owns the slot

//! # letssync - certificate directory snapshots and drift detection
//!
//! letssync models a TLS certificate configuration directory (a Let's Encrypt
//! style layout of accounts, renewal configs, archived certificates and the
//! `live` symlinks pointing at them) as a typed in-memory tree. A tree can be
//! scanned from disk, serialized to a portable JSON text form, copied to a new
//! root, diffed against another tree and written back onto disk without ever
//! clobbering existing files unless asked to.
//!
//! ## Architecture
//!
//! - [`tree`]: arena tree, node kinds, kind registry, scan, symlink resolution,
//!   serialization and persistence
//! - [`diff`]: node equality, per-attribute deltas, unified hunks for content
//! - [`certs`]: account and renewal kinds for certificate directories
//! - [`config`]: TOML configuration parsing and validation
//! - [`commands`]: CLI command implementations
//! - [`output`]: colored, verbosity-aware terminal output
//! - [`utils`]: ignore patterns, path and permission helpers
//!
//! ## Example Usage
//!
//! ```no_run
//! # fn main() -> Result<(), letssync::TreeError> {
//! letssync::certs::install()?;
//!
//! let local = letssync::build(std::path::Path::new("/etc/letsencrypt"))?;
//! let snapshot = local.to_text()?;
//!
//! let remote = letssync::from_text(&snapshot)?;
//! for path in local.get_diff(&remote).changed_paths() {
//!     println!("{path}");
//! }
//! # Ok(())
//! # }
//! ```

/// Command-line interface definitions (argument parsing structures).
pub mod cli;

/// Certificate-directory node kinds, override rules and lookups.
pub mod certs;

/// CLI command implementations.
pub mod commands;

/// Configuration parsing, validation, and management.
pub mod config;

/// Tree equality and diffing (unified diff, binary detection).
pub mod diff;

/// Error taxonomy of the tree layer.
pub mod error;

/// Output formatting.
pub mod output;

/// The in-memory tree model.
pub mod tree;

/// Utility functions and helpers.
pub mod utils;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub use diff::{Delta, DiffOptions, Side, TreeDiff};
pub use error::TreeError;
pub use tree::builder::TreeBuilder;
pub use tree::record::NodeRecord;
pub use tree::registry::{register_node_kind, register_override_rule, register_post_build_hook};
pub use tree::write::{WriteOptions, WriteReport};
pub use tree::{BuildMode, Node, NodeId, Tree};

/// Current version of the letssync binary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file path relative to the home directory.
pub const DEFAULT_CONFIG_PATH: &str = ".config/letssync/config.toml";

/// Environment variable overriding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "LETSSYNC_CONFIG_PATH";

/// Scan `path` with the process-wide kind registry.
///
/// # Errors
///
/// See [`TreeBuilder::build`].
pub fn build(path: &Path) -> error::Result<Tree> {
    TreeBuilder::default().build(path)
}

/// Decode a tree from its text form with the process-wide kind registry.
///
/// # Errors
///
/// See [`Tree::from_text`].
pub fn from_text(text: &str) -> error::Result<Tree> {
    Tree::from_text(text, tree::registry::global())
}

/// Settings shared by every command.
///
/// # Examples
///
/// ```no_run
/// use letssync::SyncContext;
///
/// # fn main() -> anyhow::Result<()> {
/// // Default location, or $LETSSYNC_CONFIG_PATH
/// let ctx = SyncContext::new(None)?;
///
/// // Explicit location (for testing)
/// let ctx = SyncContext::new_explicit("/tmp/letssync/config.toml".into())?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SyncContext {
    /// Path to the configuration file.
    pub config_path: PathBuf,

    /// Loaded configuration settings.
    pub config: config::Config,
}

impl SyncContext {
    /// Load the configuration from `config_path`, else `$LETSSYNC_CONFIG_PATH`,
    /// else the default path under the home directory.
    ///
    /// Unknown keys in the file are reported as warnings, not errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined or the
    /// configuration file cannot be read or is invalid.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path,
            None => match std::env::var(CONFIG_PATH_ENV) {
                Ok(path) => PathBuf::from(path),
                Err(_) => {
                    let home = dirs::home_dir().context("Could not find home directory")?;
                    home.join(DEFAULT_CONFIG_PATH)
                }
            },
        };
        let config_path = utils::paths::expand_tilde(&config_path)?;

        let config = config::Config::load(&config_path)
            .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

        if config_path.exists() {
            let validator = config::validator::ConfigValidator::new();
            if let Err(e) = validator.validate_config_file(&config_path) {
                output::warning(&format!("Configuration validation failed: {e}"));
            }
        }

        Ok(Self { config_path, config })
    }

    /// Load the configuration from an explicit path without consulting the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn new_explicit(config_path: PathBuf) -> Result<Self> {
        let config = config::Config::load(&config_path)?;
        Ok(Self { config_path, config })
    }
}
