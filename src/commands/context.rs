use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::SyncContext;
use crate::diff::DiffOptions;
use crate::tree::Tree;
use crate::tree::builder::TreeBuilder;
use crate::tree::write::WriteOptions;

/// Trait providing common operations for command modules
pub trait CommandContext {
    /// Scan builder honoring the configured ignore patterns
    fn tree_builder(&self) -> TreeBuilder;

    /// Loads a tree from a directory (scanned) or a snapshot file (decoded)
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read, scanned or decoded
    fn load_tree(&self, source: &Path) -> Result<Tree>;

    /// Write options from the configuration; `overwrite` can only turn overwriting on
    fn write_options(&self, overwrite: bool) -> WriteOptions;

    /// Diff options from the configuration
    fn diff_options(&self) -> DiffOptions;
}

impl CommandContext for SyncContext {
    fn tree_builder(&self) -> TreeBuilder {
        TreeBuilder::default().ignore_patterns(self.config.scan.ignore_patterns.clone())
    }

    fn load_tree(&self, source: &Path) -> Result<Tree> {
        let metadata =
            fs::metadata(source).with_context(|| format!("Cannot access {}", source.display()))?;
        if metadata.is_dir() {
            self.tree_builder()
                .build(source)
                .with_context(|| format!("Failed to scan {}", source.display()))
        } else {
            read_snapshot(source)
        }
    }

    fn write_options(&self, overwrite: bool) -> WriteOptions {
        WriteOptions {
            overwrite: overwrite || self.config.write.overwrite,
            preserve_permissions: self.config.write.preserve_permissions,
        }
    }

    fn diff_options(&self) -> DiffOptions {
        self.config.diff_options()
    }
}

/// Decode a snapshot file written by `scan`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not UTF-8 or does not hold
/// a valid snapshot
pub fn read_snapshot(path: &Path) -> Result<Tree> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let text = simdutf8::basic::from_utf8(&bytes)
        .map_err(|_| anyhow::anyhow!("Snapshot {} is not valid UTF-8", path.display()))?;
    crate::from_text(text).with_context(|| format!("Failed to decode snapshot {}", path.display()))
}
