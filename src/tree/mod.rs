//! In-memory model of a directory subtree.
//!
//! A [`Tree`] owns every [`Node`] in an arena; nodes refer to their parent,
//! their children and (for symlinks) their resolved target by [`NodeId`].
//! Absolute paths are never stored per node: they are derived from the tree's
//! root path and each node's cached relative path, so relocating a tree is a
//! single assignment.
//!
//! Trees come from exactly one of three places:
//!
//! - [`builder::TreeBuilder::build`] scans the live filesystem,
//! - [`Tree::from_record`] / [`Tree::from_text`] trust a serialized record,
//! - [`Tree::copy`] round-trips an existing tree through its record.
//!
//! In all three cases the tree is finished by the same completion pass, which
//! resolves symlinks and then runs registered post-build hooks.

/// Scan construction from the live filesystem.
pub mod builder;
/// Node kinds and the core Directory/File/Symlink kinds.
pub mod kind;
/// Symlink resolution and content proxying.
pub mod links;
/// Tagged-record serialization and the text form.
pub mod record;
/// Kind registry, override rules and post-build hooks.
pub mod registry;
/// Persistence onto disk.
pub mod write;

use crate::error::{Result, TreeError};
use hashlink::LinkedHashMap;
use kind::{CONTENT, LINK_TARGET, Shape};
use registry::{KindDef, KindRegistry, OverrideQuery};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, debug, span};

/// Index of a node inside its tree's arena.
///
/// Ids are only meaningful for the tree that handed them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Arena slot of this node.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a tree was constructed. Fixed for the lifetime of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Built from the live filesystem; override rules are consulted.
    Scan,
    /// Built from a trusted record; kind tags are taken as given.
    Deserialize,
}

/// Resolution state of a symlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// The completion pass has not run yet.
    Pending,
    /// Target found inside the same tree.
    Resolved(NodeId),
    /// Target not found inside the tree.
    Unresolved,
}

/// Shape-specific node data.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Directories carry no data beyond their children.
    Directory,
    /// Full text of a regular file.
    File {
        /// File content.
        content: String,
    },
    /// Raw link target plus its resolution against the tree.
    Symlink {
        /// Target string as read from disk or supplied in a record.
        target: String,
        /// Where the target points inside this tree.
        link: LinkState,
    },
}

impl Payload {
    /// Storage shape of this payload.
    #[must_use]
    pub const fn shape(&self) -> Shape {
        match self {
            Self::Directory => Shape::Directory,
            Self::File { .. } => Shape::File,
            Self::Symlink { .. } => Shape::Symlink,
        }
    }

    /// Symlink payload with a target that has not been resolved yet.
    #[must_use]
    pub fn symlink(target: impl Into<String>) -> Self {
        Self::Symlink {
            target: target.into(),
            link: LinkState::Pending,
        }
    }
}

/// A single directory, file or symlink.
#[derive(Debug, Clone)]
pub struct Node {
    id: String,
    kind: &'static str,
    mode: u32,
    modified: f64,
    relative_path: String,
    parent: Option<NodeId>,
    children: LinkedHashMap<String, NodeId>,
    payload: Payload,
    attributes: BTreeMap<String, Value>,
}

impl Node {
    /// Detached node. The kind is provisional until the node is attached.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: &'static str, mode: u32, modified: f64, payload: Payload) -> Self {
        Self {
            id: id.into(),
            kind,
            mode,
            modified,
            relative_path: String::new(),
            parent: None,
            children: LinkedHashMap::new(),
            payload,
            attributes: BTreeMap::new(),
        }
    }

    /// Id, unique among siblings; the file name for scanned nodes.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Kind tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        self.kind
    }

    /// Storage shape.
    #[must_use]
    pub const fn shape(&self) -> Shape {
        self.payload.shape()
    }

    /// Permission bits, including file-type bits when scanned.
    #[must_use]
    pub const fn mode(&self) -> u32 {
        self.mode
    }

    /// Update the permission bits.
    pub fn set_mode(&mut self, mode: u32) {
        self.mode = mode;
    }

    /// Modification time in seconds since the Unix epoch.
    #[must_use]
    pub const fn modified(&self) -> f64 {
        self.modified
    }

    /// Update the modification time.
    pub fn set_modified(&mut self, modified: f64) {
        self.modified = modified;
    }

    /// Path relative to the tree root, `/`-separated; empty for the root.
    #[must_use]
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Parent node, absent only for the root.
    #[must_use]
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child ids and nodes in insertion order.
    pub fn children(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.children.iter().map(|(id, node)| (id.as_str(), *node))
    }

    /// Child with the given id.
    #[must_use]
    pub fn child(&self, id: &str) -> Option<NodeId> {
        self.children.get(id).copied()
    }

    /// Number of children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Shape-specific data.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Raw symlink target, for symlinks.
    #[must_use]
    pub fn link_target(&self) -> Option<&str> {
        match &self.payload {
            Payload::Symlink { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Resolution state, for symlinks.
    #[must_use]
    pub const fn link_state(&self) -> Option<LinkState> {
        match &self.payload {
            Payload::Symlink { link, .. } => Some(*link),
            _ => None,
        }
    }

    /// Kind-specific attribute beyond the built-in ones.
    #[must_use]
    pub fn extra_attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Set a kind-specific attribute.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) {
        self.attributes.insert(name.into(), value);
    }
}

/// An arena-backed tree of nodes rooted at an absolute path.
#[derive(Debug, Clone)]
pub struct Tree {
    name: String,
    root_path: PathBuf,
    mode: BuildMode,
    nodes: Vec<Node>,
    registry: Arc<KindRegistry>,
}

const ROOT: NodeId = NodeId(0);

impl Tree {
    /// Start a tree from its root node.
    pub(crate) fn with_root(
        name: impl Into<String>,
        root_path: PathBuf,
        mode: BuildMode,
        registry: Arc<KindRegistry>,
        root: Node,
    ) -> Self {
        Self {
            name: name.into(),
            root_path,
            mode,
            nodes: vec![root],
            registry,
        }
    }

    /// Logical name, used to label the sides of a diff.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the tree (not its root node).
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// How this tree was constructed.
    #[must_use]
    pub const fn build_mode(&self) -> BuildMode {
        self.mode
    }

    /// Registry snapshot this tree resolves kinds against.
    #[must_use]
    pub fn registry(&self) -> &Arc<KindRegistry> {
        &self.registry
    }

    /// Root node.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        ROOT
    }

    /// Absolute location of the root.
    #[must_use]
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Move the whole tree. Every node's absolute path follows.
    pub fn set_root_path(&mut self, root_path: impl Into<PathBuf>) {
        self.root_path = root_path.into();
        debug!(root = %self.root_path.display(), "relocated tree");
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds only its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Node by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not handed out by this tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Node by id, or `None` for a foreign id.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Mutable node by id.
    ///
    /// Only mode, modification time and kind-specific attributes can be changed
    /// this way; ids go through [`Tree::rename`] and content through
    /// [`Tree::set_content`].
    ///
    /// # Panics
    ///
    /// Panics if `id` was not handed out by this tree.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Absolute path of a node: the root path joined with its relative path.
    #[must_use]
    pub fn path(&self, id: NodeId) -> PathBuf {
        let relative = self.node(id).relative_path();
        if relative.is_empty() {
            self.root_path.clone()
        } else {
            self.root_path.join(relative)
        }
    }

    /// Kind definition of a node.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::UnknownKind`] if the registry lacks the node's kind.
    pub fn kind_def(&self, id: NodeId) -> Result<&Arc<KindDef>> {
        self.registry.kind(self.node(id).kind())
    }

    /// Every node id below `from` (inclusive), depth first, parents before children.
    #[must_use]
    pub fn descendants(&self, from: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            order.push(id);
            let children: Vec<NodeId> = self.node(id).children().map(|(_, child)| child).collect();
            stack.extend(children.into_iter().rev());
        }
        order
    }

    /// Walk down from `from` one segment at a time.
    ///
    /// Empty and `.` segments are skipped. Returns `None` as soon as a segment is
    /// missing; there are no partial matches.
    #[must_use]
    pub fn search(&self, from: NodeId, relative_path: &str) -> Option<NodeId> {
        self.search_segments(from, relative_path.split('/'))
    }

    /// Segment-wise variant of [`Tree::search`].
    pub fn search_segments<'a>(
        &self,
        from: NodeId,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Option<NodeId> {
        segments
            .into_iter()
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .try_fold(from, |current, segment| self.node(current).child(segment))
    }

    /// Search from the root, failing with [`TreeError::NotFound`].
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NotFound`] if no node lives at `relative_path`.
    pub fn lookup(&self, relative_path: &str) -> Result<NodeId> {
        self.search(ROOT, relative_path)
            .ok_or_else(|| TreeError::NotFound(relative_path.to_string()))
    }

    /// Attach `node` under `parent`.
    ///
    /// In scan mode the registry's override rules may replace `node`'s kind
    /// first; in deserialize mode the kind is trusted as given. A symlink
    /// whose target is already in the tree resolves right away.
    ///
    /// # Errors
    ///
    /// - [`TreeError::IdCollision`] if `parent` already has a child with this id
    /// - [`TreeError::UnknownKind`] if the (possibly overridden) kind is not registered
    /// - [`TreeError::KindRegistration`] if the kind's shape does not fit the payload
    pub fn add_child(&mut self, parent: NodeId, mut node: Node) -> Result<NodeId> {
        let parent_node = self.node(parent);

        if self.mode == BuildMode::Scan {
            let query = OverrideQuery {
                requested: node.kind,
                parent_kind: parent_node.kind,
                parent_id: &parent_node.id,
                parent_is_root: parent == ROOT,
                proposed_id: &node.id,
            };
            let chosen = self.registry.resolve_kind(&query);
            if chosen != node.kind {
                debug!(id = %node.id, from = node.kind, to = chosen, "kind overridden");
                node.kind = self.registry.kind(chosen)?.name();
            }
        }

        let def = self.registry.kind(node.kind)?;
        if def.shape() != node.shape() {
            return Err(TreeError::KindRegistration {
                kind: node.kind.to_string(),
                reason: format!("kind is a {} but node {:?} is a {}", def.shape(), node.id, node.shape()),
            });
        }

        if parent_node.children.contains_key(&node.id) {
            return Err(TreeError::IdCollision {
                parent: parent_node.relative_path.clone(),
                id: node.id,
            });
        }

        node.relative_path = join_relative(&parent_node.relative_path, &node.id);
        node.parent = Some(parent);
        node.children.clear();

        let id = NodeId(self.nodes.len());
        let key = node.id.clone();
        let is_link = node.shape() == Shape::Symlink;
        self.nodes.push(node);
        self.nodes[parent.0].children.insert(key, id);
        if is_link {
            self.resolve_attached(id);
        }
        Ok(id)
    }

    /// Give a node a new id, rekeying its parent and recomputing the relative
    /// path of the node and every descendant.
    ///
    /// Links keep pointing at the nodes they resolved to: raw targets that
    /// went through the old id are rewritten to the new location.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::IdCollision`] if a sibling already uses `new_id`.
    pub fn rename(&mut self, id: NodeId, new_id: impl Into<String>) -> Result<()> {
        let new_id = new_id.into();
        let old_id = self.node(id).id.clone();
        if old_id == new_id {
            return Ok(());
        }

        if let Some(parent) = self.node(id).parent {
            let siblings = &self.nodes[parent.0].children;
            if siblings.contains_key(&new_id) {
                return Err(TreeError::IdCollision {
                    parent: self.node(parent).relative_path.clone(),
                    id: new_id,
                });
            }
            let rekeyed: LinkedHashMap<String, NodeId> = siblings
                .iter()
                .map(|(key, child)| {
                    let key = if *child == id { new_id.clone() } else { key.clone() };
                    (key, *child)
                })
                .collect();
            self.nodes[parent.0].children = rekeyed;
        }

        let links = self.resolved_pairs();
        self.nodes[id.0].id = new_id;
        self.refresh_relative_paths(id);
        self.retarget_links(&links);
        Ok(())
    }

    fn refresh_relative_paths(&mut self, from: NodeId) {
        for id in self.descendants(from) {
            let node = self.node(id);
            let relative = match node.parent {
                None => String::new(),
                Some(parent) => join_relative(&self.node(parent).relative_path, &node.id),
            };
            self.nodes[id.0].relative_path = relative;
        }
    }

    /// Value of a declared attribute, as it appears in the text form.
    #[must_use]
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<Value> {
        let node = self.node(id);
        match name {
            "id" => Some(Value::String(node.id.clone())),
            "mode" => Some(Value::from(node.mode)),
            "modified" => serde_json::Number::from_f64(node.modified).map(Value::Number),
            CONTENT => match &node.payload {
                Payload::File { content } => Some(Value::String(content.clone())),
                _ => None,
            },
            LINK_TARGET => node.link_target().map(|t| Value::String(t.to_string())),
            other => node.attributes.get(other).cloned(),
        }
    }

    /// Run the completion pass: resolve symlinks, then post-build hooks.
    pub(crate) fn complete(&mut self) -> Result<()> {
        let span = span!(Level::DEBUG, "tree_complete", tree = %self.name, nodes = self.nodes.len());
        let _guard = span.enter();

        self.resolve_links();

        let registry = Arc::clone(&self.registry);
        for (label, hook) in registry.hooks() {
            debug!(hook = label, "running post-build hook");
            hook(self)?;
        }
        Ok(())
    }
}

/// `parent/id`, or just `id` under the root.
fn join_relative(parent: &str, id: &str) -> String {
    if parent.is_empty() {
        id.to_string()
    } else {
        format!("{parent}/{id}")
    }
}
