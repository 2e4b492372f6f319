//! Node kinds: the capability interface every concrete node type implements.
//!
//! A kind is identified by its name (the `kind` tag in the text form), has a
//! storage [`Shape`], and may specialize a parent kind. Attribute lists are
//! additive along that parent chain; the merge happens once, when the kind is
//! registered (see [`super::registry::KindRegistry::register_kind`]).

use crate::error::Result;
use crate::tree::Node;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Kind name of plain directories.
pub const DIRECTORY: &str = "Directory";
/// Kind name of plain files.
pub const FILE: &str = "File";
/// Kind name of symbolic links.
pub const SYMLINK: &str = "Symlink";

/// Attributes every kind persists, whatever its lineage.
pub const BASE_ATTRIBUTES: &[&str] = &["id", "mode", "modified"];

/// Attribute carrying a file's full text.
pub const CONTENT: &str = "content";
/// Attribute carrying a symlink's raw target string.
pub const LINK_TARGET: &str = "link_target";

/// How a node is stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    /// A directory owning child nodes.
    Directory,
    /// A regular file with text content.
    File,
    /// A symbolic link resolved against the rest of the tree.
    Symlink,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory => write!(f, "directory"),
            Self::File => write!(f, "file"),
            Self::Symlink => write!(f, "symlink"),
        }
    }
}

/// Capability interface for a node kind.
///
/// Implementations are stateless descriptors; per-node data lives in [`Node`].
pub trait NodeKind: Send + Sync + fmt::Debug {
    /// Kind tag used in the text form and in override rules.
    fn name(&self) -> &'static str;

    /// Storage shape. Must match the parent kind's shape.
    fn shape(&self) -> Shape;

    /// Kind this one specializes, if any.
    fn parent(&self) -> Option<&'static str> {
        None
    }

    /// Attributes this kind adds to the persisted set.
    fn attributes(&self) -> &'static [&'static str] {
        &[]
    }

    /// Attributes this kind adds to node equality and diffing.
    fn compared(&self) -> &'static [&'static str] {
        &[]
    }

    /// Derive kind-specific attributes after a node was read from disk.
    ///
    /// Runs only for scanned nodes, once per kind in the lineage, root-most
    /// kind first. Deserialized nodes trust their record instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the scanned payload cannot be interpreted.
    fn on_scan(&self, _node: &mut Node, _path: &Path) -> Result<()> {
        Ok(())
    }
}

/// Plain directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct Directory;

impl NodeKind for Directory {
    fn name(&self) -> &'static str {
        DIRECTORY
    }

    fn shape(&self) -> Shape {
        Shape::Directory
    }
}

/// Plain text file.
#[derive(Debug, Clone, Copy, Default)]
pub struct File;

impl NodeKind for File {
    fn name(&self) -> &'static str {
        FILE
    }

    fn shape(&self) -> Shape {
        Shape::File
    }

    fn attributes(&self) -> &'static [&'static str] {
        &[CONTENT]
    }

    fn compared(&self) -> &'static [&'static str] {
        &[CONTENT]
    }
}

/// Symbolic link. Content is proxied through the resolved target, so only the
/// raw target string is persisted and compared.
#[derive(Debug, Clone, Copy, Default)]
pub struct Symlink;

impl NodeKind for Symlink {
    fn name(&self) -> &'static str {
        SYMLINK
    }

    fn shape(&self) -> Shape {
        Shape::Symlink
    }

    fn attributes(&self) -> &'static [&'static str] {
        &[LINK_TARGET]
    }

    fn compared(&self) -> &'static [&'static str] {
        &[LINK_TARGET]
    }
}
