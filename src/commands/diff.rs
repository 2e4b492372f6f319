use crate::SyncContext;
use crate::commands::CommandContext;
use crate::diff::unified::write_patch;
use crate::diff::{Delta, TreeDiff};
use crate::output::{self, Change};
use anyhow::Result;
use colored::Colorize;
use serde_json::Value;
use std::io::{self, IsTerminal, Write};
use std::path::Path;

/// How a delta reads in a listing.
#[must_use]
pub const fn change_of(delta: &Delta) -> Change {
    if delta.is_addition() {
        Change::Added
    } else if delta.is_removal() {
        Change::Removed
    } else {
        Change::Modified
    }
}

/// Execute diff command to show differences between two trees
///
/// Each side is either a directory (scanned) or a snapshot file (decoded).
///
/// # Errors
///
/// Returns an error if either side cannot be loaded or stdout cannot be
/// written.
pub fn execute(ctx: &SyncContext, old: &Path, new: &Path, name_only: bool) -> Result<()> {
    let old_tree = ctx.load_tree(old)?;
    let new_tree = ctx.load_tree(new)?;
    let diff = old_tree.get_diff_with(&new_tree, &ctx.diff_options());

    if diff.is_clean() {
        output::info("No differences found");
        return Ok(());
    }

    let stdout = io::stdout();
    let colorize = ctx.config.diff.colorize && stdout.is_terminal();
    let mut writer = stdout.lock();
    render(&diff, name_only, colorize, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Print every changed path with its marker, then (unless `name_only`) the
/// differing attributes of paths present on both sides.
///
/// # Errors
///
/// Returns an error if the writer fails.
pub fn render(diff: &TreeDiff, name_only: bool, colorize: bool, writer: &mut dyn Write) -> io::Result<()> {
    for (path, delta) in diff.changed() {
        let shown = if path.is_empty() { "." } else { path };
        let change = change_of(delta);
        writeln!(writer, "{} {shown}", output::change_marker(change, colorize))?;
        if name_only || change != Change::Modified {
            continue;
        }

        for (name, attribute) in &delta.attributes {
            if let Some(patch) = &attribute.patch {
                write_patch(patch, colorize, writer)?;
                continue;
            }
            let label = if colorize { name.dimmed().to_string() } else { name.clone() };
            writeln!(
                writer,
                "    {label}: {} -> {}",
                describe(attribute.this.as_ref()),
                describe(attribute.other.as_ref())
            )?;
        }
    }
    Ok(())
}

fn describe(value: Option<&Value>) -> String {
    match value {
        None => "(absent)".to_string(),
        Some(Value::String(text)) => format!("{text:?}"),
        Some(other) => other.to_string(),
    }
}
