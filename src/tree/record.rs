//! Tagged-record serialization.
//!
//! Each node becomes `{ "kind": ..., <declared attributes>, "children": {...} }`.
//! The root record also carries the tree's `name` and absolute `path`.
//! Decoding trusts the record: override rules are never consulted and the
//! filesystem is never touched.

use crate::error::{Result, TreeError};
use crate::tree::kind::{BASE_ATTRIBUTES, CONTENT, LINK_TARGET, Shape};
use crate::tree::registry::{KindDef, KindRegistry};
use crate::tree::{BuildMode, Node, NodeId, Payload, Tree};
use hashlink::LinkedHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, debug, span};

/// Root-only attribute holding the tree's logical name.
pub const TREE_NAME: &str = "name";
/// Root-only attribute holding the tree's absolute root path.
pub const ROOT_PATH: &str = "path";

/// Serialized form of one node and its subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Kind tag naming a registered kind.
    pub kind: String,
    /// Declared attributes (plus `name`/`path` on the root).
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
    /// Child records keyed by child id, in tree order.
    #[serde(default)]
    pub children: LinkedHashMap<String, NodeRecord>,
}

impl NodeRecord {
    fn str_attr(&self, name: &str) -> Result<&str> {
        match self.attributes.get(name) {
            Some(Value::String(value)) => Ok(value),
            Some(_) => Err(TreeError::malformed(&self.kind, format!("{name:?} must be a string"))),
            None => Err(TreeError::malformed(&self.kind, format!("missing attribute {name:?}"))),
        }
    }

    fn optional_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }
}

impl Tree {
    /// Record for `id` and everything below it.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::UnknownKind`] if a node's kind vanished from the
    /// registry snapshot, which cannot happen for trees built by this crate.
    pub fn to_record(&self, id: NodeId) -> Result<NodeRecord> {
        let def = self.kind_def(id)?;
        let mut attributes = Map::new();
        for &name in def.attributes() {
            attributes.insert(name.to_string(), self.attribute(id, name).unwrap_or(Value::Null));
        }
        if id == self.root() {
            attributes.insert(TREE_NAME.to_string(), Value::String(self.name.clone()));
            attributes.insert(
                ROOT_PATH.to_string(),
                Value::String(self.root_path.to_string_lossy().into_owned()),
            );
        }

        let mut children = LinkedHashMap::new();
        for (child_id, child) in self.node(id).children() {
            children.insert(child_id.to_string(), self.to_record(child)?);
        }

        Ok(NodeRecord {
            kind: def.name().to_string(),
            attributes,
            children,
        })
    }

    /// Record of the whole tree.
    ///
    /// # Errors
    ///
    /// See [`Tree::to_record`].
    pub fn serialize(&self) -> Result<NodeRecord> {
        self.to_record(self.root())
    }

    /// Canonical text form: pretty-printed JSON of [`Tree::serialize`].
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::Encoding`] if JSON encoding fails.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.serialize()?)?)
    }

    /// Rebuild a tree from its record, trusting every kind tag and attribute.
    ///
    /// # Errors
    ///
    /// - [`TreeError::UnknownKind`] if a record names an unregistered kind
    /// - [`TreeError::MalformedRecord`] if a declared attribute is missing or mistyped
    /// - [`TreeError::IdCollision`] never for well-formed records, since child
    ///   keys are unique
    pub fn from_record(record: &NodeRecord, registry: Arc<KindRegistry>) -> Result<Self> {
        let span = span!(Level::DEBUG, "tree_deserialize", kind = %record.kind);
        let _guard = span.enter();

        let def = Arc::clone(registry.kind(&record.kind)?);
        let root = node_from_record(record, &def)?;
        let name = record
            .optional_str(TREE_NAME)
            .map_or_else(|| root.id().to_string(), str::to_string);
        let root_path = record
            .optional_str(ROOT_PATH)
            .map_or_else(|| PathBuf::from(root.id()), PathBuf::from);

        let mut tree = Self::with_root(name, root_path, BuildMode::Deserialize, registry, root);
        let root_id = tree.root();
        tree.replay_children(root_id, record)?;
        tree.complete()?;
        debug!(nodes = tree.len(), "deserialized tree");
        Ok(tree)
    }

    /// Parse the text form produced by [`Tree::to_text`].
    ///
    /// # Errors
    ///
    /// [`TreeError::Encoding`] for invalid JSON, otherwise see [`Tree::from_record`].
    pub fn from_text(text: &str, registry: Arc<KindRegistry>) -> Result<Self> {
        let record: NodeRecord = serde_json::from_str(text)?;
        Self::from_record(&record, registry)
    }

    /// Structurally distinct copy built by serializing and deserializing this
    /// tree, optionally relocated under `new_root`.
    ///
    /// Symlinks are resolved afresh inside the copy.
    ///
    /// # Errors
    ///
    /// See [`Tree::serialize`] and [`Tree::from_record`].
    pub fn copy(&self, new_root: Option<&Path>) -> Result<Self> {
        let mut copy = Self::from_record(&self.serialize()?, Arc::clone(&self.registry))?;
        if let Some(root) = new_root {
            copy.set_root_path(root);
        }
        Ok(copy)
    }

    fn replay_children(&mut self, parent: NodeId, record: &NodeRecord) -> Result<()> {
        if !record.children.is_empty() && self.node(parent).shape() != Shape::Directory {
            return Err(TreeError::malformed(
                &record.kind,
                format!("a {} cannot have children", self.node(parent).shape()),
            ));
        }

        for (key, child_record) in &record.children {
            let def = Arc::clone(self.registry.kind(&child_record.kind)?);
            let child = node_from_record(child_record, &def)?;
            if child.id() != key {
                return Err(TreeError::malformed(
                    &child_record.kind,
                    format!("child keyed {key:?} has id {:?}", child.id()),
                ));
            }
            let id = self.add_child(parent, child)?;
            self.replay_children(id, child_record)?;
        }
        Ok(())
    }
}

fn node_from_record(record: &NodeRecord, def: &KindDef) -> Result<Node> {
    let kind = def.name();
    let id = record.str_attr("id")?;

    let mode = record
        .attributes
        .get("mode")
        .and_then(Value::as_u64)
        .and_then(|mode| u32::try_from(mode).ok())
        .ok_or_else(|| TreeError::malformed(kind, "\"mode\" must be an unsigned 32-bit integer"))?;
    let modified = record
        .attributes
        .get("modified")
        .and_then(Value::as_f64)
        .ok_or_else(|| TreeError::malformed(kind, "\"modified\" must be a number"))?;

    let payload = match def.shape() {
        Shape::Directory => Payload::Directory,
        Shape::File => Payload::File {
            content: record.str_attr(CONTENT)?.to_string(),
        },
        Shape::Symlink => Payload::symlink(record.str_attr(LINK_TARGET)?),
    };

    let mut node = Node::new(id, kind, mode, modified, payload);
    for &name in def.attributes() {
        if BASE_ATTRIBUTES.contains(&name) || name == CONTENT || name == LINK_TARGET {
            continue;
        }
        let value = record
            .attributes
            .get(name)
            .ok_or_else(|| TreeError::malformed(kind, format!("missing attribute {name:?}")))?;
        node.set_attribute(name, value.clone());
    }
    Ok(node)
}
