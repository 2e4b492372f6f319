use crate::error::{Result, TreeError};
use crate::tree::{LinkState, NodeId, Payload, Tree};
use crate::utils::paths;
use std::path::Path;
use tracing::{debug, warn};

impl Tree {
    /// Resolve every symlink against the finished tree.
    ///
    /// Resolution is purely structural: leading `..` segments climb from the
    /// link's parent, the rest is searched downward. It never touches the
    /// filesystem, so scanned, deserialized and relocated trees agree.
    ///
    /// Run it again after attaching nodes a dangling link was waiting for.
    /// Returns the number of links left unresolved.
    pub fn resolve_links(&mut self) -> usize {
        let links: Vec<(NodeId, String)> = self
            .descendants(self.root())
            .into_iter()
            .filter_map(|id| {
                self.node(id)
                    .link_target()
                    .map(|target| (id, target.to_string()))
            })
            .collect();

        let mut unresolved = 0;
        for (id, target) in links {
            let state = match self.resolve_target(id, &target) {
                Some(found) => LinkState::Resolved(found),
                None => {
                    warn!(
                        link = self.node(id).relative_path(),
                        target = %target,
                        "symlink does not resolve inside the tree"
                    );
                    unresolved += 1;
                    LinkState::Unresolved
                }
            };
            self.set_link_state(id, state);
        }

        debug!(unresolved, "symlink resolution complete");
        unresolved
    }

    /// Resolve a freshly attached link if its target is already in the tree.
    /// Otherwise it stays pending until the next [`Tree::resolve_links`].
    pub(crate) fn resolve_attached(&mut self, id: NodeId) {
        let Some(target) = self.node(id).link_target() else {
            return;
        };
        if let Some(found) = self.resolve_target(id, target) {
            self.set_link_state(id, LinkState::Resolved(found));
        }
    }

    /// Every resolved link with the node it points at.
    pub(crate) fn resolved_pairs(&self) -> Vec<(NodeId, NodeId)> {
        self.descendants(self.root())
            .into_iter()
            .filter_map(|id| self.resolved_target(id).map(|target| (id, target)))
            .collect()
    }

    /// Point links back at the nodes they resolved to before ids changed.
    ///
    /// A raw target that no longer reaches its node is replaced by the relative
    /// path from the link's parent to that node.
    pub(crate) fn retarget_links(&mut self, pairs: &[(NodeId, NodeId)]) {
        for &(link, target) in pairs {
            let Some(raw) = self.node(link).link_target() else {
                continue;
            };
            if self.resolve_target(link, raw) == Some(target) {
                continue;
            }
            let rewritten = self.relative_link(link, target);
            debug!(link = self.node(link).relative_path(), to = %rewritten, "retargeted symlink");
            if let Payload::Symlink { target: slot, .. } = &mut self.nodes[link.index()].payload {
                *slot = rewritten;
            }
        }
        self.resolve_links();
    }

    /// Relative path from a link's parent directory to `target`.
    pub(crate) fn relative_link(&self, link: NodeId, target: NodeId) -> String {
        let from = self
            .node(link)
            .parent()
            .map_or("", |parent| self.node(parent).relative_path());
        paths::relative_between(from, self.node(target).relative_path())
    }

    fn set_link_state(&mut self, id: NodeId, state: LinkState) {
        if let Payload::Symlink { link, .. } = &mut self.nodes[id.index()].payload {
            *link = state;
        }
    }

    fn resolve_target(&self, link: NodeId, target: &str) -> Option<NodeId> {
        let (mut anchor, rest) = if target.starts_with('/') {
            // Absolute targets only resolve when they point into this tree.
            let inside = Path::new(target).strip_prefix(self.root_path()).ok()?;
            (self.root(), inside.to_str()?.to_string())
        } else {
            (self.node(link).parent()?, target.to_string())
        };

        let mut segments = rest
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .peekable();
        while segments.next_if_eq(&"..").is_some() {
            anchor = self.node(anchor).parent()?;
        }
        self.search_segments(anchor, segments)
    }

    /// Where a symlink points, if it resolved.
    #[must_use]
    pub fn resolved_target(&self, id: NodeId) -> Option<NodeId> {
        match self.node(id).link_state()? {
            LinkState::Resolved(target) => Some(target),
            LinkState::Pending | LinkState::Unresolved => None,
        }
    }

    /// Symlinks whose targets are not inside the tree.
    #[must_use]
    pub fn unresolved_links(&self) -> Vec<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .filter(|id| {
                matches!(
                    self.node(*id).link_state(),
                    Some(LinkState::Unresolved | LinkState::Pending)
                )
            })
            .collect()
    }

    /// Follow symlinks from `id` to the file that holds the content.
    fn content_holder(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        // A chain longer than the tree must contain a cycle.
        for _ in 0..=self.len() {
            match &self.node(current).payload {
                Payload::File { .. } => return Some(current),
                Payload::Symlink {
                    link: LinkState::Resolved(target),
                    ..
                } => current = *target,
                Payload::Symlink { .. } | Payload::Directory => return None,
            }
        }
        None
    }

    /// Text of a file, or of the file a symlink ultimately points to.
    ///
    /// Returns `None` for directories and for links that do not resolve to a
    /// file; an unresolved link never reads as empty content.
    #[must_use]
    pub fn content(&self, id: NodeId) -> Option<&str> {
        let holder = self.content_holder(id)?;
        match &self.node(holder).payload {
            Payload::File { content } => Some(content),
            _ => None,
        }
    }

    /// Replace the text of a file, writing through symlinks.
    ///
    /// # Errors
    ///
    /// - [`TreeError::UnresolvedLink`] if `id` is a link that does not lead to a file
    /// - [`TreeError::InvalidContent`] if `id` is a directory
    pub fn set_content(&mut self, id: NodeId, content: impl Into<String>) -> Result<()> {
        let Some(holder) = self.content_holder(id) else {
            let node = self.node(id);
            return Err(match node.link_target() {
                Some(target) => TreeError::UnresolvedLink {
                    relative_path: node.relative_path().to_string(),
                    target: target.to_string(),
                },
                None => TreeError::InvalidContent {
                    path: self.path(id),
                    reason: "directories have no content".to_string(),
                },
            });
        };

        if let Payload::File { content: slot } = &mut self.nodes[holder.index()].payload {
            *slot = content.into();
        }
        Ok(())
    }
}
