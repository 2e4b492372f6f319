use crate::SyncContext;
use crate::commands::CommandContext;
use crate::commands::context::read_snapshot;
use crate::output;
use crate::tree::write::WriteReport;
use crate::utils::paths::make_absolute;
use anyhow::{Context, Result};
use std::path::Path;

/// Rebuild the snapshot at `snapshot` under `dir`.
///
/// The snapshot's own root path is ignored; `dir` becomes the new root.
///
/// # Errors
///
/// Returns an error if:
/// - The snapshot cannot be read or decoded
/// - The tree contains unresolved symlinks
/// - Any directory, file or symlink cannot be created
pub fn execute(ctx: &SyncContext, snapshot: &Path, dir: &Path, overwrite: bool) -> Result<WriteReport> {
    let mut tree = read_snapshot(snapshot)?;
    let root = make_absolute(dir).with_context(|| format!("Cannot resolve {}", dir.display()))?;
    tree.set_root_path(root);

    let report = tree
        .write_with(ctx.write_options(overwrite))
        .with_context(|| format!("Failed to write {}", dir.display()))?;
    print_report(&report, dir);
    Ok(report)
}

/// Summarize a write for the user.
pub fn print_report(report: &WriteReport, dir: &Path) {
    output::action(
        "Wrote",
        &format!(
            "{}: {} directories, {} files, {} symlinks",
            dir.display(),
            report.directories_created,
            report.files_written,
            report.links_created
        ),
    );
    if report.skipped > 0 {
        output::info(&format!(
            "{} existing paths left untouched (use --overwrite to replace them)",
            report.skipped
        ));
    }
}
