use crate::error::{Result, TreeError};
use crate::tree::kind::{DIRECTORY, FILE, SYMLINK, Shape};
use crate::tree::registry::KindRegistry;
use crate::tree::{BuildMode, Node, NodeId, Payload, Tree};
use crate::utils::permissions::FilePermissions;
use crate::utils::{paths, should_ignore, system_time_to_epoch};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, debug, info, span, warn};
use walkdir::WalkDir;

/// Scans a directory into a [`Tree`].
///
/// Every scan is a full rebuild. Entries are visited in file-name order so two
/// scans of the same directory serialize identically.
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    registry: Arc<KindRegistry>,
    name: Option<String>,
    ignore_patterns: Vec<String>,
}

impl TreeBuilder {
    /// Builder resolving kinds and override rules against `registry`.
    #[must_use]
    pub const fn new(registry: Arc<KindRegistry>) -> Self {
        Self {
            registry,
            name: None,
            ignore_patterns: Vec::new(),
        }
    }

    /// Logical tree name. Defaults to the root directory's basename.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Glob patterns; matching entries (and everything below them) are skipped.
    #[must_use]
    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Scan `path` and every entry below it.
    ///
    /// # Errors
    ///
    /// - [`TreeError::Filesystem`] if `path` is not a readable directory or any
    ///   stat, listing or read fails
    /// - [`TreeError::InvalidContent`] if a file is not UTF-8 text or a domain
    ///   kind cannot interpret it
    /// - any error raised by a post-build hook
    pub fn build(&self, path: &Path) -> Result<Tree> {
        let root_path = paths::make_absolute(path).map_err(|e| TreeError::fs("resolve", path, e))?;
        let span = span!(Level::DEBUG, "tree_build", root = %root_path.display());
        let _guard = span.enter();

        let metadata = fs::metadata(&root_path).map_err(|e| TreeError::fs("stat", &root_path, e))?;
        if !metadata.is_dir() {
            return Err(TreeError::fs(
                "scan",
                &root_path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }

        let root_id = root_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let root = Node::new(
            root_id.clone(),
            DIRECTORY,
            FilePermissions::from_metadata(&metadata).mode(),
            modified_of(&root_path, &metadata)?,
            Payload::Directory,
        );
        let name = self.name.clone().unwrap_or(root_id);
        let mut tree = Tree::with_root(name, root_path.clone(), BuildMode::Scan, Arc::clone(&self.registry), root);
        let root = tree.root();
        run_scan_hooks(&mut tree, root, &root_path)?;

        // parents[d] is the node entries at depth d + 1 attach to.
        let mut parents = vec![tree.root()];
        let mut skipped = 0usize;

        let walker = WalkDir::new(&root_path)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let relative = entry.path().strip_prefix(&root_path).unwrap_or(entry.path());
                !should_ignore(relative, &self.ignore_patterns)
            });

        for entry in walker {
            let entry = entry.map_err(|e| walk_error(e, &root_path))?;
            let depth = entry.depth();
            parents.truncate(depth);
            let Some(&parent) = parents.last() else {
                continue;
            };

            let Some(node) = scan_entry(&entry)? else {
                warn!(path = %entry.path().display(), "skipping special file");
                skipped += 1;
                continue;
            };

            let is_dir = node.shape() == Shape::Directory;
            let id = tree.add_child(parent, node)?;
            run_scan_hooks(&mut tree, id, entry.path())?;
            if is_dir {
                parents.push(id);
            }
        }

        tree.complete()?;
        info!(
            tree = tree.name(),
            nodes = tree.len(),
            skipped,
            unresolved = tree.unresolved_links().len(),
            "scan complete"
        );
        Ok(tree)
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new(crate::tree::registry::global())
    }
}

/// Read one directory entry into a detached node. `None` for sockets, fifos
/// and devices.
fn scan_entry(entry: &walkdir::DirEntry) -> Result<Option<Node>> {
    let path = entry.path();
    let id = entry.file_name().to_string_lossy().into_owned();
    let metadata = entry.metadata().map_err(|e| walk_error(e, path))?;
    let mode = FilePermissions::from_metadata(&metadata).mode();
    let modified = modified_of(path, &metadata)?;
    let file_type = entry.file_type();

    let (kind, payload) = if file_type.is_dir() {
        (DIRECTORY, Payload::Directory)
    } else if file_type.is_symlink() {
        let target = fs::read_link(path).map_err(|e| TreeError::fs("read link", path, e))?;
        let target = target.into_os_string().into_string().map_err(|_| TreeError::InvalidContent {
            path: path.to_path_buf(),
            reason: "link target is not UTF-8".to_string(),
        })?;
        (SYMLINK, Payload::symlink(target))
    } else if file_type.is_file() {
        let bytes = fs::read(path).map_err(|e| TreeError::fs("read", path, e))?;
        let content = simdutf8::basic::from_utf8(&bytes).map_err(|_| TreeError::InvalidContent {
            path: path.to_path_buf(),
            reason: "file is not UTF-8 text".to_string(),
        })?;
        (
            FILE,
            Payload::File {
                content: content.to_owned(),
            },
        )
    } else {
        return Ok(None);
    };

    debug!(id = %id, kind, mode = format_args!("{mode:o}"), "scanned entry");
    Ok(Some(Node::new(id, kind, mode, modified, payload)))
}

/// Let every kind in the node's lineage derive its attributes, root-most first.
fn run_scan_hooks(tree: &mut Tree, id: NodeId, path: &Path) -> Result<()> {
    let def = Arc::clone(tree.kind_def(id)?);
    for kind in def.lineage() {
        kind.on_scan(tree.node_mut(id), path)?;
    }
    Ok(())
}

fn modified_of(path: &Path, metadata: &fs::Metadata) -> Result<f64> {
    metadata
        .modified()
        .map(system_time_to_epoch)
        .map_err(|e| TreeError::fs("stat", path, e))
}

fn walk_error(err: walkdir::Error, fallback: &Path) -> TreeError {
    let path: PathBuf = err.path().map_or_else(|| fallback.to_path_buf(), Path::to_path_buf);
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::other("directory walk failed"));
    TreeError::fs("read directory", path, source)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::tree::kind::NodeKind;
    use std::os::unix::fs::{PermissionsExt, symlink};
    use tempfile::TempDir;

    #[derive(Debug)]
    struct Keys;

    impl NodeKind for Keys {
        fn name(&self) -> &'static str {
            "Keys"
        }

        fn shape(&self) -> Shape {
            Shape::Directory
        }

        fn parent(&self) -> Option<&'static str> {
            Some(DIRECTORY)
        }
    }

    fn layout() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("archive/example.com")).unwrap();
        fs::create_dir_all(root.join("live/example.com")).unwrap();
        fs::create_dir_all(root.join("keys")).unwrap();
        fs::write(root.join("archive/example.com/cert1.pem"), "CERT1").unwrap();
        fs::write(root.join("keys/0000_key.pem"), "KEY").unwrap();
        fs::set_permissions(root.join("keys/0000_key.pem"), fs::Permissions::from_mode(0o600)).unwrap();
        symlink(
            "../../archive/example.com/cert1.pem",
            root.join("live/example.com/cert.pem"),
        )
        .unwrap();
        temp
    }

    #[test]
    fn test_scan_classifies_entries() {
        let temp = layout();
        let tree = TreeBuilder::new(Arc::new(KindRegistry::core()))
            .build(temp.path())
            .unwrap();

        assert_eq!(tree.build_mode(), BuildMode::Scan);
        let root_id = temp.path().file_name().unwrap().to_string_lossy();
        assert_eq!(tree.node(tree.root()).id(), root_id);
        assert_eq!(tree.name(), root_id);

        let cert = tree.lookup("archive/example.com/cert1.pem").unwrap();
        assert_eq!(tree.node(cert).kind(), FILE);
        assert_eq!(tree.content(cert), Some("CERT1"));

        let key = tree.lookup("keys/0000_key.pem").unwrap();
        assert_eq!(tree.node(key).mode() & 0o777, 0o600);

        let link = tree.lookup("live/example.com/cert.pem").unwrap();
        assert_eq!(tree.node(link).kind(), SYMLINK);
        assert_eq!(tree.resolved_target(link), Some(cert));
        assert_eq!(tree.content(link), Some("CERT1"));
    }

    #[test]
    fn test_children_sorted_by_name() {
        let temp = layout();
        let tree = TreeBuilder::new(Arc::new(KindRegistry::core()))
            .build(temp.path())
            .unwrap();
        let ids: Vec<&str> = tree.node(tree.root()).children().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["archive", "keys", "live"]);
    }

    #[test]
    fn test_ignore_patterns_prune_subtrees() {
        let temp = layout();
        fs::write(temp.path().join("keys/.0000_key.pem.swp"), "junk").unwrap();
        let tree = TreeBuilder::new(Arc::new(KindRegistry::core()))
            .name("local")
            .ignore_patterns(vec!["archive".to_string(), "*.swp".to_string()])
            .build(temp.path())
            .unwrap();

        assert_eq!(tree.name(), "local");
        assert!(tree.search(tree.root(), "archive").is_none());
        assert!(tree.search(tree.root(), "keys/.0000_key.pem.swp").is_none());
        assert!(tree.search(tree.root(), "keys/0000_key.pem").is_some());

        let link = tree.lookup("live/example.com/cert.pem").unwrap();
        assert_eq!(tree.content(link), None);
        assert_eq!(tree.unresolved_links(), vec![link]);
    }

    #[test]
    fn test_override_rules_apply_during_scan() {
        let temp = layout();
        let mut registry = KindRegistry::core();
        registry.register_kind(Keys).unwrap();
        registry.register_override(|q| (q.parent_is_root && q.proposed_id == "keys").then_some("Keys"));

        let tree = TreeBuilder::new(Arc::new(registry)).build(temp.path()).unwrap();
        assert_eq!(tree.node(tree.lookup("keys").unwrap()).kind(), "Keys");
        assert_eq!(tree.node(tree.lookup("live").unwrap()).kind(), DIRECTORY);
    }

    #[test]
    fn test_binary_content_rejected() {
        let temp = layout();
        fs::write(temp.path().join("keys/raw.der"), [0xff, 0xfe, 0x00, 0x80]).unwrap();
        let err = TreeBuilder::new(Arc::new(KindRegistry::core()))
            .build(temp.path())
            .unwrap_err();
        assert!(matches!(err, TreeError::InvalidContent { .. }));
    }

    #[test]
    fn test_missing_root_is_filesystem_error() {
        let temp = TempDir::new().unwrap();
        let err = TreeBuilder::new(Arc::new(KindRegistry::core()))
            .build(&temp.path().join("absent"))
            .unwrap_err();
        assert_eq!(err.category(), "filesystem");
    }
}
