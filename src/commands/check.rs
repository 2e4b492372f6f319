use crate::SyncContext;
use crate::certs;
use crate::commands::CommandContext;
use crate::output;
use anyhow::{Result, bail};
use std::path::Path;

/// Scan `dir` and report symlinks that do not resolve inside it.
///
/// Also reports renewal configs naming an account that is not present.
///
/// # Errors
///
/// Returns an error if the directory cannot be scanned or any symlink is
/// unresolved.
pub fn execute(ctx: &SyncContext, dir: &Path) -> Result<()> {
    let tree = ctx.load_tree(dir)?;

    let index = certs::renewals(&tree);
    for (domain, conf) in &index.by_domain {
        if certs::renewal_account(&tree, *conf).is_none() {
            output::warning(&format!("renewal config for {domain} names no account in this tree"));
        }
    }

    let unresolved = tree.unresolved_links();
    if unresolved.is_empty() {
        output::success(&format!(
            "{}: {} nodes, every symlink resolves",
            dir.display(),
            tree.len()
        ));
        return Ok(());
    }

    for id in &unresolved {
        let node = tree.node(*id);
        println!(
            "{} -> {}",
            node.relative_path(),
            node.link_target().unwrap_or_default()
        );
    }
    bail!("{} unresolved symlinks in {}", unresolved.len(), dir.display())
}
