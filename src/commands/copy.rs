use crate::SyncContext;
use crate::commands::CommandContext;
use crate::commands::write::print_report;
use crate::output;
use crate::tree::write::WriteReport;
use crate::utils::paths::make_absolute;
use anyhow::{Context, Result};
use std::path::Path;

/// Scan `src`, relocate the tree onto `dst` and write it there.
///
/// # Errors
///
/// Returns an error if:
/// - `src` cannot be scanned
/// - The scanned tree contains unresolved symlinks
/// - Any directory, file or symlink under `dst` cannot be created
pub fn execute(ctx: &SyncContext, src: &Path, dst: &Path, overwrite: bool) -> Result<WriteReport> {
    let tree = ctx
        .tree_builder()
        .build(src)
        .with_context(|| format!("Failed to scan {}", src.display()))?;

    let root = make_absolute(dst).with_context(|| format!("Cannot resolve {}", dst.display()))?;
    let copy = tree.copy(Some(&root))?;
    output::verbose(&format!("Copying {} nodes to {}", copy.len(), root.display()));

    let report = copy
        .write_with(ctx.write_options(overwrite))
        .with_context(|| format!("Failed to write {}", dst.display()))?;
    print_report(&report, dst);
    Ok(report)
}
