//! Kind table, override rules and post-build hooks.
//!
//! The registry is the extension point for domain modules: they register their
//! kinds (so records naming them can be decoded), override rules (so a scan can
//! upgrade a generic directory or file based on where it sits) and hooks that
//! run once a tree is complete.

use crate::error::{Result, TreeError};
use crate::tree::Tree;
use crate::tree::kind::{self, BASE_ATTRIBUTES, NodeKind, Shape};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use tracing::debug;

/// Structural context handed to override rules.
///
/// Rules see where a node is about to be attached, never what it contains.
#[derive(Debug, Clone, Copy)]
pub struct OverrideQuery<'a> {
    /// Kind the scanner classified the entry as.
    pub requested: &'a str,
    /// Kind of the parent node.
    pub parent_kind: &'a str,
    /// Id of the parent node.
    pub parent_id: &'a str,
    /// Whether the parent is the tree root.
    pub parent_is_root: bool,
    /// Id the new node will get.
    pub proposed_id: &'a str,
}

/// Override rule: returns the kind to use instead, or `None` for no opinion.
pub type OverrideRule = Arc<dyn Fn(&OverrideQuery<'_>) -> Option<&'static str> + Send + Sync>;

/// Hook run after every node exists and symlinks are resolved.
pub type PostBuildHook = Arc<dyn Fn(&mut Tree) -> Result<()> + Send + Sync>;

/// A registered kind with its lineage and merged attribute lists.
pub struct KindDef {
    name: &'static str,
    lineage: Vec<Arc<dyn NodeKind>>,
    shape: Shape,
    attributes: Vec<&'static str>,
    compared: Vec<&'static str>,
}

impl KindDef {
    /// Kind tag.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Storage shape shared by the whole lineage.
    #[must_use]
    pub const fn shape(&self) -> Shape {
        self.shape
    }

    /// Persisted attributes: base attributes, then each kind's additions, root-most first.
    #[must_use]
    pub fn attributes(&self) -> &[&'static str] {
        &self.attributes
    }

    /// Attributes taking part in equality and diffing.
    #[must_use]
    pub fn compared(&self) -> &[&'static str] {
        &self.compared
    }

    /// Whether this kind is `name` or specializes it.
    #[must_use]
    pub fn is_a(&self, name: &str) -> bool {
        self.lineage.iter().any(|k| k.name() == name)
    }

    /// Kinds from the root of the lineage down to this one.
    pub fn lineage(&self) -> impl Iterator<Item = &Arc<dyn NodeKind>> {
        self.lineage.iter()
    }
}

impl fmt::Debug for KindDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindDef")
            .field("name", &self.name())
            .field("shape", &self.shape)
            .field("attributes", &self.attributes)
            .field("compared", &self.compared)
            .finish()
    }
}

/// Table of node kinds plus the scan-time override rules and completion hooks.
#[derive(Clone)]
pub struct KindRegistry {
    kinds: HashMap<&'static str, Arc<KindDef>>,
    rules: Vec<OverrideRule>,
    hooks: Vec<(&'static str, PostBuildHook)>,
}

impl KindRegistry {
    /// Registry with no kinds at all. Most callers want [`KindRegistry::core`].
    #[must_use]
    pub fn empty() -> Self {
        Self {
            kinds: HashMap::new(),
            rules: Vec::new(),
            hooks: Vec::new(),
        }
    }

    /// Registry holding the three core kinds.
    #[must_use]
    pub fn core() -> Self {
        let mut registry = Self::empty();
        for core_kind in [
            Arc::new(kind::Directory) as Arc<dyn NodeKind>,
            Arc::new(kind::File),
            Arc::new(kind::Symlink),
        ] {
            let registered = registry.register_arc(core_kind);
            debug_assert!(registered.is_ok(), "core kinds have no parents and distinct names");
        }
        registry
    }

    /// Register a kind. Its parent, if any, must already be registered.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::KindRegistration`] if the name is taken, the parent
    /// is unknown, or the shape differs from the parent's.
    pub fn register_kind(&mut self, kind: impl NodeKind + 'static) -> Result<()> {
        self.register_arc(Arc::new(kind))
    }

    fn register_arc(&mut self, kind: Arc<dyn NodeKind>) -> Result<()> {
        let name = kind.name();
        if self.kinds.contains_key(name) {
            return Err(TreeError::KindRegistration {
                kind: name.to_string(),
                reason: "already registered".to_string(),
            });
        }

        let (mut lineage, mut attributes, mut compared) = match kind.parent() {
            None => (Vec::new(), BASE_ATTRIBUTES.to_vec(), Vec::new()),
            Some(parent_name) => {
                let parent = self.kinds.get(parent_name).ok_or_else(|| {
                    TreeError::KindRegistration {
                        kind: name.to_string(),
                        reason: format!("parent kind {parent_name:?} is not registered"),
                    }
                })?;
                if parent.shape != kind.shape() {
                    return Err(TreeError::KindRegistration {
                        kind: name.to_string(),
                        reason: format!(
                            "shape {} differs from parent {parent_name:?} ({})",
                            kind.shape(),
                            parent.shape
                        ),
                    });
                }
                (
                    parent.lineage.clone(),
                    parent.attributes.clone(),
                    parent.compared.clone(),
                )
            }
        };

        for &attr in kind.attributes() {
            if !attributes.contains(&attr) {
                attributes.push(attr);
            }
        }
        for &attr in kind.compared() {
            if !compared.contains(&attr) {
                compared.push(attr);
            }
        }

        let shape = kind.shape();
        lineage.push(kind);
        debug!(kind = name, ?attributes, "registered node kind");
        self.kinds.insert(
            name,
            Arc::new(KindDef {
                name,
                lineage,
                shape,
                attributes,
                compared,
            }),
        );
        Ok(())
    }

    /// Append an override rule. Later rules take precedence.
    pub fn register_override(
        &mut self,
        rule: impl Fn(&OverrideQuery<'_>) -> Option<&'static str> + Send + Sync + 'static,
    ) {
        self.rules.push(Arc::new(rule));
    }

    /// Append a post-build hook. Hooks run in registration order.
    pub fn register_post_build(
        &mut self,
        label: &'static str,
        hook: impl Fn(&mut Tree) -> Result<()> + Send + Sync + 'static,
    ) {
        self.hooks.push((label, Arc::new(hook)));
    }

    /// Look up a kind by name.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::UnknownKind`] if no such kind is registered.
    pub fn kind(&self, name: &str) -> Result<&Arc<KindDef>> {
        self.kinds
            .get(name)
            .ok_or_else(|| TreeError::UnknownKind(name.to_string()))
    }

    /// Whether a kind with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    /// Names of all registered kinds, sorted.
    #[must_use]
    pub fn kind_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.kinds.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Kind to construct for a scanned entry: the newest rule with an opinion
    /// wins, otherwise the requested kind stands.
    #[must_use]
    pub fn resolve_kind<'a>(&self, query: &OverrideQuery<'a>) -> &'a str {
        let chosen: Option<&'a str> = self.rules.iter().rev().find_map(|rule| rule(query));
        chosen.unwrap_or(query.requested)
    }

    /// Post-build hooks with their labels.
    pub(crate) fn hooks(&self) -> impl Iterator<Item = &(&'static str, PostBuildHook)> {
        self.hooks.iter()
    }
}

impl Default for KindRegistry {
    fn default() -> Self {
        Self::core()
    }
}

impl fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindRegistry")
            .field("kinds", &self.kind_names())
            .field("rules", &self.rules.len())
            .field(
                "hooks",
                &self.hooks.iter().map(|(label, _)| *label).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Process-wide registry used by [`crate::build`] and [`crate::from_text`].
static GLOBAL_REGISTRY: LazyLock<RwLock<Arc<KindRegistry>>> =
    LazyLock::new(|| RwLock::new(Arc::new(KindRegistry::core())));

/// Snapshot of the process-wide registry.
///
/// Trees keep the snapshot they were built with, so later registrations do not
/// affect them.
#[must_use]
pub fn global() -> Arc<KindRegistry> {
    let guard = GLOBAL_REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner);
    Arc::clone(&guard)
}

/// Mutate the process-wide registry under its write lock.
///
/// # Errors
///
/// Propagates whatever `update` returns; on error the registry is left unchanged.
pub fn update_global<F>(update: F) -> Result<()>
where
    F: FnOnce(&mut KindRegistry) -> Result<()>,
{
    let mut guard = GLOBAL_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    let mut next = KindRegistry::clone(&guard);
    update(&mut next)?;
    *guard = Arc::new(next);
    Ok(())
}

/// Register a kind in the process-wide registry.
///
/// # Errors
///
/// See [`KindRegistry::register_kind`].
pub fn register_node_kind(kind: impl NodeKind + 'static) -> Result<()> {
    update_global(|registry| registry.register_kind(kind))
}

/// Register an override rule in the process-wide registry.
pub fn register_override_rule(
    rule: impl Fn(&OverrideQuery<'_>) -> Option<&'static str> + Send + Sync + 'static,
) {
    // The closure never fails.
    let _ = update_global(|registry| {
        registry.register_override(rule);
        Ok(())
    });
}

/// Register a post-build hook in the process-wide registry.
pub fn register_post_build_hook(
    label: &'static str,
    hook: impl Fn(&mut Tree) -> Result<()> + Send + Sync + 'static,
) {
    let _ = update_global(|registry| {
        registry.register_post_build(label, hook);
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::kind::{DIRECTORY, FILE};

    #[derive(Debug)]
    struct Keyring;

    impl NodeKind for Keyring {
        fn name(&self) -> &'static str {
            "Keyring"
        }

        fn shape(&self) -> Shape {
            Shape::Directory
        }

        fn parent(&self) -> Option<&'static str> {
            Some(DIRECTORY)
        }

        fn attributes(&self) -> &'static [&'static str] {
            &["owner"]
        }
    }

    #[derive(Debug)]
    struct BadShape;

    impl NodeKind for BadShape {
        fn name(&self) -> &'static str {
            "BadShape"
        }

        fn shape(&self) -> Shape {
            Shape::File
        }

        fn parent(&self) -> Option<&'static str> {
            Some(DIRECTORY)
        }
    }

    fn query<'a>(requested: &'a str, parent_kind: &'a str, proposed_id: &'a str) -> OverrideQuery<'a> {
        OverrideQuery {
            requested,
            parent_kind,
            parent_id: "root",
            parent_is_root: true,
            proposed_id,
        }
    }

    #[test]
    fn test_core_kinds_registered() {
        let registry = KindRegistry::core();
        assert_eq!(registry.kind_names(), vec!["Directory", "File", "Symlink"]);
        let file = registry.kind(FILE).unwrap();
        assert_eq!(file.attributes(), &["id", "mode", "modified", "content"]);
        assert_eq!(file.compared(), &["content"]);
    }

    #[test]
    fn test_attributes_merge_along_lineage() {
        let mut registry = KindRegistry::core();
        registry.register_kind(Keyring).unwrap();
        let def = registry.kind("Keyring").unwrap();
        assert_eq!(def.attributes(), &["id", "mode", "modified", "owner"]);
        assert!(def.is_a(DIRECTORY));
        assert!(def.is_a("Keyring"));
        assert!(!def.is_a(FILE));
    }

    #[test]
    fn test_duplicate_and_shape_mismatch_rejected() {
        let mut registry = KindRegistry::core();
        registry.register_kind(Keyring).unwrap();
        assert!(matches!(
            registry.register_kind(Keyring),
            Err(TreeError::KindRegistration { .. })
        ));
        assert!(matches!(
            registry.register_kind(BadShape),
            Err(TreeError::KindRegistration { .. })
        ));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let mut registry = KindRegistry::empty();
        assert!(registry.register_kind(Keyring).is_err());
    }

    #[test]
    fn test_unknown_kind_lookup() {
        let registry = KindRegistry::core();
        assert!(matches!(
            registry.kind("Nope"),
            Err(TreeError::UnknownKind(name)) if name == "Nope"
        ));
    }

    #[test]
    fn test_last_registered_rule_wins() {
        let mut registry = KindRegistry::core();
        registry.register_override(|q| (q.proposed_id == "keys").then_some("First"));
        registry.register_override(|q| (q.proposed_id == "keys").then_some("Second"));
        registry.register_override(|_| None);

        assert_eq!(registry.resolve_kind(&query(DIRECTORY, DIRECTORY, "keys")), "Second");
        assert_eq!(registry.resolve_kind(&query(DIRECTORY, DIRECTORY, "other")), DIRECTORY);
    }
}
