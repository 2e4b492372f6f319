use crate::error::{Result, TreeError};
use crate::tree::{NodeId, Payload, Tree};
use crate::utils::permissions::FilePermissions;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{Level, debug, info, span};

/// How [`Tree::write_with`] treats paths that already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Replace existing files and symlinks. Directories are never replaced.
    pub overwrite: bool,
    /// Apply each node's stored mode to what gets created.
    pub preserve_permissions: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            preserve_permissions: true,
        }
    }
}

/// What a write actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    /// Directories that did not exist and were created.
    pub directories_created: usize,
    /// Files written, new or overwritten.
    pub files_written: usize,
    /// Symlinks created, new or replaced.
    pub links_created: usize,
    /// Existing paths left untouched.
    pub skipped: usize,
}

impl Tree {
    /// Persist the tree under its root path.
    ///
    /// # Errors
    ///
    /// See [`Tree::write_with`].
    pub fn write(&self, overwrite: bool) -> Result<WriteReport> {
        self.write_with(WriteOptions {
            overwrite,
            ..WriteOptions::default()
        })
    }

    /// Persist the tree under its root path, parents before children.
    ///
    /// Existing directories are kept as they are. Existing files and symlinks
    /// are only replaced when `options.overwrite` is set.
    ///
    /// # Errors
    ///
    /// - [`TreeError::UnresolvedLink`] if any symlink does not resolve; nothing
    ///   is written in that case
    /// - [`TreeError::Filesystem`] if a mkdir, write, chmod or symlink call
    ///   fails; whatever was written before the failure stays on disk
    pub fn write_with(&self, options: WriteOptions) -> Result<WriteReport> {
        let span = span!(Level::DEBUG, "tree_write", root = %self.root_path().display(), overwrite = options.overwrite);
        let _guard = span.enter();

        if let Some(&first) = self.unresolved_links().first() {
            let node = self.node(first);
            return Err(TreeError::UnresolvedLink {
                relative_path: node.relative_path().to_string(),
                target: node.link_target().unwrap_or_default().to_string(),
            });
        }

        let mut report = WriteReport::default();
        let mut created_dirs: Vec<(PathBuf, u32)> = Vec::new();

        for id in self.descendants(self.root()) {
            let path = self.path(id);
            let node = self.node(id);
            match node.payload() {
                Payload::Directory => {
                    if create_directory(&path, id == self.root())? {
                        report.directories_created += 1;
                        created_dirs.push((path, node.mode()));
                    }
                }
                Payload::File { content } => {
                    if !options.overwrite && exists(&path)? {
                        debug!(path = %path.display(), "file exists, skipping");
                        report.skipped += 1;
                        continue;
                    }
                    write_file(&path, content)?;
                    FilePermissions::from_mode(node.mode())
                        .apply_to_path(&path, options.preserve_permissions)
                        .map_err(|e| TreeError::fs("chmod", &path, e))?;
                    report.files_written += 1;
                }
                Payload::Symlink { .. } => {
                    if !options.overwrite && exists(&path)? {
                        debug!(path = %path.display(), "link exists, skipping");
                        report.skipped += 1;
                        continue;
                    }
                    let target = self.link_text(id)?;
                    create_symlink(&path, &target)?;
                    report.links_created += 1;
                }
            }
        }

        // Deepest first, so a read-only directory never blocks its own children.
        for (path, mode) in created_dirs.iter().rev() {
            FilePermissions::from_mode(*mode)
                .apply_to_path(path, options.preserve_permissions)
                .map_err(|e| TreeError::fs("chmod", path, e))?;
        }

        info!(
            directories = report.directories_created,
            files = report.files_written,
            links = report.links_created,
            skipped = report.skipped,
            "write complete"
        );
        Ok(report)
    }

    /// Target string to put on disk for a symlink: the relative path from the
    /// link's parent to the node it resolved to, so the written tree stays
    /// self-contained wherever it is rooted.
    fn link_text(&self, id: NodeId) -> Result<String> {
        let target = self.resolved_target(id).ok_or_else(|| {
            let node = self.node(id);
            TreeError::UnresolvedLink {
                relative_path: node.relative_path().to_string(),
                target: node.link_target().unwrap_or_default().to_string(),
            }
        })?;
        Ok(self.relative_link(id, target))
    }
}

fn exists(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(TreeError::fs("stat", path, e)),
    }
}

/// Returns whether the directory had to be created.
fn create_directory(path: &Path, is_root: bool) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(false),
        Ok(_) => Err(TreeError::fs(
            "create directory",
            path,
            io::Error::new(io::ErrorKind::AlreadyExists, "a non-directory is in the way"),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let created = if is_root {
                fs::create_dir_all(path)
            } else {
                fs::create_dir(path)
            };
            created.map_err(|e| TreeError::fs("create directory", path, e))?;
            debug!(path = %path.display(), "created directory");
            Ok(true)
        }
        Err(e) => Err(TreeError::fs("stat", path, e)),
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    // Writing through an existing link would clobber its target instead.
    if fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink()) {
        fs::remove_file(path).map_err(|e| TreeError::fs("remove", path, e))?;
    }
    fs::write(path, content).map_err(|e| TreeError::fs("write", path, e))?;
    debug!(path = %path.display(), bytes = content.len(), "wrote file");
    Ok(())
}

fn create_symlink(path: &Path, target: &str) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => {
            return Err(TreeError::fs(
                "create symlink",
                path,
                io::Error::new(io::ErrorKind::AlreadyExists, "a directory is in the way"),
            ));
        }
        Ok(_) => fs::remove_file(path).map_err(|e| TreeError::fs("remove", path, e))?,
        Err(_) => {}
    }

    symlink(target, path).map_err(|e| TreeError::fs("create symlink", path, e))?;
    debug!(path = %path.display(), target, "created symlink");
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &str, path: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, path)
}

#[cfg(not(unix))]
fn symlink(target: &str, _path: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot create a link to {target} on this platform"),
    ))
}
