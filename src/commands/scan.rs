use crate::SyncContext;
use crate::commands::CommandContext;
use crate::output;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Scan `dir` and print its snapshot, or save it to `output_path`.
///
/// The tree is named `name`, falling back to `tree.name` from the config.
/// Unresolved symlinks are reported as warnings; they do not fail the scan.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be scanned
/// - The snapshot cannot be encoded or written
pub fn execute(ctx: &SyncContext, dir: &Path, output_path: Option<&Path>, name: Option<&str>) -> Result<()> {
    let name = name.map_or_else(|| ctx.config.tree.name.clone(), str::to_string);
    let tree = ctx
        .tree_builder()
        .name(name)
        .build(dir)
        .with_context(|| format!("Failed to scan {}", dir.display()))?;
    let text = tree.to_text()?;

    match output_path {
        Some(path) => {
            fs::write(path, format!("{text}\n"))
                .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
            output::action(
                "Scanned",
                &format!("{} ({} nodes) into {}", dir.display(), tree.len(), path.display()),
            );
        }
        None => println!("{text}"),
    }

    for id in tree.unresolved_links() {
        let node = tree.node(id);
        output::warning(&format!(
            "unresolved symlink {} -> {}",
            node.relative_path(),
            node.link_target().unwrap_or_default()
        ));
    }
    Ok(())
}
