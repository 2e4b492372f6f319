//! Tree comparison.
//!
//! This module provides:
//! - Node equality ([`Tree::node_eq`]) and recursive tree equality ([`Tree::is_equal`])
//! - Per-node attribute deltas ([`Tree::diff_node`])
//! - Tree-wide diffs keyed by relative path ([`Tree::get_diff`])
//! - Unified hunks for content changes, with binary detection
//!
//! Deltas record values as they appear in the text form, so a diff can be
//! serialized next to the trees it came from.

/// Binary content detection utilities
pub mod binary;
/// Unified diff generation for text content
pub mod unified;

pub use binary::is_binary_content;
pub use unified::{UnifiedDiffConfig, generate_unified_diff, unified_patch};

use crate::config::DiffAlgorithm;
use crate::tree::kind::{CONTENT, Shape};
use crate::tree::{LinkState, NodeId, Tree};
use serde::Serialize;
use serde_json::Value;
use similar::Algorithm;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{Level, debug, span};

/// Attribute reported when a symlink's resolution differs or either side dangles.
pub const RESOLVED: &str = "resolved";
/// Attribute reported when two nodes at one path have different kinds.
pub const KIND: &str = "kind";
/// Attribute reported when compared nodes sit at different relative paths.
pub const RELATIVE_PATH: &str = "relative_path";

/// Convert `DiffAlgorithm` config enum to `similar::Algorithm`
#[must_use]
pub const fn config_to_algorithm(algo: &DiffAlgorithm) -> Algorithm {
    match algo {
        DiffAlgorithm::Myers => Algorithm::Myers,
        DiffAlgorithm::Patience => Algorithm::Patience,
    }
}

/// Which tree of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The tree `get_diff` was called on.
    #[serde(rename = "self")]
    This,
    /// The tree passed as argument.
    Other,
}

/// Before/after values of one attribute. `None` means the node is absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeDelta {
    /// Value on this side.
    #[serde(rename = "self")]
    pub this: Option<Value>,
    /// Value on the other side.
    pub other: Option<Value>,
    /// Unified hunk (or a binary notice) for content changes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
}

/// Differences between two nodes at the same relative path.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Delta {
    /// Set when the node exists on one side only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absent: Option<Side>,
    /// Differing attributes by name.
    #[serde(flatten)]
    pub attributes: BTreeMap<String, AttributeDelta>,
}

impl Delta {
    /// Node only exists on the other side.
    #[must_use]
    pub const fn is_addition(&self) -> bool {
        matches!(self.absent, Some(Side::This))
    }

    /// Node only exists on this side.
    #[must_use]
    pub const fn is_removal(&self) -> bool {
        matches!(self.absent, Some(Side::Other))
    }

    /// Names of the differing attributes, sorted.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    fn record(&mut self, name: &str, this: Option<Value>, other: Option<Value>) {
        self.attributes.insert(
            name.to_string(),
            AttributeDelta {
                this,
                other,
                patch: None,
            },
        );
    }
}

/// Options shaping content patches.
#[derive(Debug, Clone, Copy)]
pub struct DiffOptions {
    /// Context lines around each hunk.
    pub context_lines: usize,
    /// Line diff algorithm.
    pub algorithm: Algorithm,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            context_lines: 3,
            algorithm: Algorithm::Myers,
        }
    }
}

/// Tree-wide comparison: every relative path found on either side, mapped to
/// its delta, or `None` where the two nodes are equal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeDiff {
    /// Name of the tree `get_diff` was called on.
    pub this_name: String,
    /// Name of the other tree.
    pub other_name: String,
    /// Per-path result, ordered by relative path.
    pub entries: BTreeMap<String, Option<Delta>>,
}

impl TreeDiff {
    /// Paths that differ, with their deltas.
    pub fn changed(&self) -> impl Iterator<Item = (&str, &Delta)> {
        self.entries
            .iter()
            .filter_map(|(path, delta)| delta.as_ref().map(|delta| (path.as_str(), delta)))
    }

    /// Paths that differ.
    #[must_use]
    pub fn changed_paths(&self) -> Vec<&str> {
        self.changed().map(|(path, _)| path).collect()
    }

    /// Delta recorded for `relative_path`; `None` if unchanged or unknown.
    #[must_use]
    pub fn get(&self, relative_path: &str) -> Option<&Delta> {
        self.entries.get(relative_path).and_then(Option::as_ref)
    }

    /// Whether the trees were equal everywhere.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.entries.values().all(Option::is_none)
    }
}

impl Tree {
    /// Node equality ignoring children: same kind, same relative path and
    /// equal compared attributes. A link that does not resolve on either side
    /// is never equal, even to an identical dangling link.
    fn attributes_eq(&self, id: NodeId, other: &Self, other_id: NodeId) -> bool {
        let (this_node, other_node) = (self.node(id), other.node(other_id));
        if this_node.kind() != other_node.kind() || this_node.relative_path() != other_node.relative_path() {
            return false;
        }
        if resolution(this_node.link_state()) == Some(false) || resolution(other_node.link_state()) == Some(false) {
            return false;
        }
        let Ok(def) = self.kind_def(id) else {
            return false;
        };
        def.compared()
            .iter()
            .all(|name| self.attribute(id, name) == other.attribute(other_id, name))
    }

    /// Node equality. Directories additionally need the same set of child ids.
    #[must_use]
    pub fn node_eq(&self, id: NodeId, other: &Self, other_id: NodeId) -> bool {
        if !self.attributes_eq(id, other, other_id) {
            return false;
        }
        if self.node(id).shape() != Shape::Directory {
            return true;
        }
        let ours: BTreeSet<&str> = self.node(id).children().map(|(child, _)| child).collect();
        let theirs: BTreeSet<&str> = other.node(other_id).children().map(|(child, _)| child).collect();
        ours == theirs
    }

    /// Recursive equality of the subtrees at `id` and `other_id`.
    ///
    /// A child without a same-id counterpart makes the subtrees unequal.
    #[must_use]
    pub fn subtree_eq(&self, id: NodeId, other: &Self, other_id: NodeId) -> bool {
        self.node_eq(id, other, other_id)
            && self.node(id).children().all(|(child_id, child)| {
                other
                    .node(other_id)
                    .child(child_id)
                    .is_some_and(|counterpart| self.subtree_eq(child, other, counterpart))
            })
    }

    /// Whether both trees hold equal nodes at every relative path.
    #[must_use]
    pub fn is_equal(&self, other: &Self) -> bool {
        self.subtree_eq(self.root(), other, other.root())
    }

    /// Attribute delta between two nodes, ignoring their children.
    ///
    /// Returns `None` when the nodes are equal.
    #[must_use]
    pub fn diff_node(&self, id: NodeId, other: &Self, other_id: NodeId, options: &DiffOptions) -> Option<Delta> {
        if self.attributes_eq(id, other, other_id) {
            return None;
        }

        let (this_node, other_node) = (self.node(id), other.node(other_id));
        let mut delta = Delta::default();

        if this_node.relative_path() != other_node.relative_path() {
            delta.record(
                RELATIVE_PATH,
                Some(Value::from(this_node.relative_path())),
                Some(Value::from(other_node.relative_path())),
            );
        }

        let this_def = self.kind_def(id).ok();
        let other_def = other.kind_def(other_id).ok();
        let names: Vec<&str> = if this_node.kind() == other_node.kind() {
            this_def.map(|def| def.compared().to_vec()).unwrap_or_default()
        } else {
            delta.record(
                KIND,
                Some(Value::from(this_node.kind())),
                Some(Value::from(other_node.kind())),
            );
            let mut union: Vec<&str> = Vec::new();
            for def in this_def.into_iter().chain(other_def) {
                for &name in def.attributes() {
                    if !union.contains(&name) {
                        union.push(name);
                    }
                }
            }
            union
        };

        for name in names {
            let (this_value, other_value) = (self.attribute(id, name), other.attribute(other_id, name));
            if this_value == other_value {
                continue;
            }
            let patch = if name == CONTENT {
                self.content_patch(id, other, other_id, options)
            } else {
                None
            };
            delta.attributes.insert(
                name.to_string(),
                AttributeDelta {
                    this: this_value,
                    other: other_value,
                    patch,
                },
            );
        }

        let this_resolved = resolution(this_node.link_state());
        let other_resolved = resolution(other_node.link_state());
        if this_resolved != other_resolved || this_resolved == Some(false) || other_resolved == Some(false) {
            delta.record(
                RESOLVED,
                this_resolved.map(Value::Bool),
                other_resolved.map(Value::Bool),
            );
        }

        Some(delta)
    }

    fn content_patch(&self, id: NodeId, other: &Self, other_id: NodeId, options: &DiffOptions) -> Option<String> {
        let (old, new) = (self.content(id)?, other.content(other_id)?);
        let old_label = format!("{}/{}", self.name(), self.node(id).relative_path());
        let new_label = format!("{}/{}", other.name(), other.node(other_id).relative_path());

        if is_binary_content(old) || is_binary_content(new) {
            let mut buffer = Vec::new();
            // Writing into a Vec cannot fail.
            let _ = unified::generate_binary_diff_message(&old_label, &new_label, &mut buffer);
            return Some(String::from_utf8_lossy(&buffer).into_owned());
        }

        let config = UnifiedDiffConfig {
            context_lines: options.context_lines,
            algorithm: options.algorithm,
            colorize: false,
        };
        Some(unified_patch(old, new, &old_label, &new_label, &config))
    }

    /// Delta for a node that exists on one side only: every declared attribute
    /// of the present node against an absent value.
    fn one_sided(&self, id: NodeId, absent: Side) -> Delta {
        let node = self.node(id);
        let mut delta = Delta {
            absent: Some(absent),
            attributes: BTreeMap::new(),
        };

        let mut present: Vec<(&str, Option<Value>)> = vec![(KIND, Some(Value::from(node.kind())))];
        if let Ok(def) = self.kind_def(id) {
            present.extend(def.attributes().iter().map(|&name| (name, self.attribute(id, name))));
        }
        if let Some(resolved) = resolution(node.link_state()) {
            present.push((RESOLVED, Some(Value::Bool(resolved))));
        }

        for (name, value) in present {
            let (this, other) = match absent {
                Side::This => (None, value),
                Side::Other => (value, None),
            };
            delta.record(name, this, other);
        }
        delta
    }

    /// Compare with `other` at every relative path present on either side.
    #[must_use]
    pub fn get_diff(&self, other: &Self) -> TreeDiff {
        self.get_diff_with(other, &DiffOptions::default())
    }

    /// [`Tree::get_diff`] with explicit patch options.
    #[must_use]
    pub fn get_diff_with(&self, other: &Self, options: &DiffOptions) -> TreeDiff {
        let span = span!(Level::DEBUG, "tree_diff", this = self.name(), other = other.name());
        let _guard = span.enter();

        let ours = self.paths_by_relative();
        let theirs = other.paths_by_relative();
        let all: BTreeSet<&str> = ours.keys().chain(theirs.keys()).copied().collect();

        let entries: BTreeMap<String, Option<Delta>> = all
            .into_iter()
            .map(|path| {
                let delta = match (ours.get(path), theirs.get(path)) {
                    (Some(&id), Some(&other_id)) => self.diff_node(id, other, other_id, options),
                    (Some(&id), None) => Some(self.one_sided(id, Side::Other)),
                    (None, Some(&other_id)) => Some(other.one_sided(other_id, Side::This)),
                    (None, None) => None,
                };
                (path.to_string(), delta)
            })
            .collect();

        let diff = TreeDiff {
            this_name: self.name().to_string(),
            other_name: other.name().to_string(),
            entries,
        };
        debug!(paths = diff.entries.len(), changed = diff.changed().count(), "diff complete");
        diff
    }

    fn paths_by_relative(&self) -> BTreeMap<&str, NodeId> {
        self.descendants(self.root())
            .into_iter()
            .map(|id| (self.node(id).relative_path(), id))
            .collect()
    }
}

/// `Some(resolved?)` for symlinks, `None` for everything else.
const fn resolution(state: Option<LinkState>) -> Option<bool> {
    match state {
        Some(LinkState::Resolved(_)) => Some(true),
        Some(LinkState::Pending | LinkState::Unresolved) => Some(false),
        None => None,
    }
}
