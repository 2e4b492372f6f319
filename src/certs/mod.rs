//! Certificate-directory kinds layered on the generic tree.
//!
//! A Let's Encrypt style configuration directory looks like
//!
//! ```text
//! accounts/<server>/directory/<account id>/{meta,regr,private_key}.json
//! renewal/<domain>.conf
//! archive/<domain>/{cert,chain,fullchain,privkey}N.pem
//! live/<domain>/{cert,chain,fullchain,privkey}.pem -> ../../archive/<domain>/...
//! ```
//!
//! [`register`] adds kinds for the account and renewal parts of that layout,
//! the override rules that pick them during a scan, and a post-build hook that
//! records on each account the domains whose renewal config names it.

use crate::error::{Result, TreeError};
use crate::tree::kind::{DIRECTORY, FILE, NodeKind, Shape};
use crate::tree::registry::{self, KindRegistry, OverrideQuery};
use crate::tree::{Node, NodeId, Payload, Tree};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, warn};

/// Collection of accounts, or an ACME server level below one.
pub const ACCOUNTS: &str = "Accounts";
/// A single ACME account directory.
pub const ACCOUNT: &str = "Account";
/// JSON file inside an account directory.
pub const ACCOUNT_FILE: &str = "AccountFile";
/// The `renewal` directory.
pub const RENEWALS: &str = "Renewals";
/// A `<domain>.conf` renewal config.
pub const RENEWAL_CONF: &str = "RenewalConf";

/// Domains renewed with an account.
pub const DOMAINS: &str = "domains";
/// Parsed JSON of an account file.
pub const DATA: &str = "data";
/// Account named by a renewal config.
pub const ACCOUNT_ID: &str = "account_id";
/// Domain a renewal config belongs to.
pub const DOMAIN: &str = "domain";

const RENEWAL_SUFFIX: &str = ".conf";

#[derive(Debug)]
struct Accounts;

impl NodeKind for Accounts {
    fn name(&self) -> &'static str {
        ACCOUNTS
    }

    fn shape(&self) -> Shape {
        Shape::Directory
    }

    fn parent(&self) -> Option<&'static str> {
        Some(DIRECTORY)
    }
}

#[derive(Debug)]
struct Account;

impl NodeKind for Account {
    fn name(&self) -> &'static str {
        ACCOUNT
    }

    fn shape(&self) -> Shape {
        Shape::Directory
    }

    fn parent(&self) -> Option<&'static str> {
        Some(DIRECTORY)
    }

    fn attributes(&self) -> &'static [&'static str] {
        &[DOMAINS]
    }

    fn compared(&self) -> &'static [&'static str] {
        &[DOMAINS]
    }

    fn on_scan(&self, node: &mut Node, _path: &Path) -> Result<()> {
        // Filled in by the post-build hook once renewal configs exist.
        node.set_attribute(DOMAINS, Value::Array(Vec::new()));
        Ok(())
    }
}

#[derive(Debug)]
struct AccountFile;

impl NodeKind for AccountFile {
    fn name(&self) -> &'static str {
        ACCOUNT_FILE
    }

    fn shape(&self) -> Shape {
        Shape::File
    }

    fn parent(&self) -> Option<&'static str> {
        Some(FILE)
    }

    fn attributes(&self) -> &'static [&'static str] {
        &[DATA]
    }

    fn compared(&self) -> &'static [&'static str] {
        &[DATA]
    }

    fn on_scan(&self, node: &mut Node, path: &Path) -> Result<()> {
        let data = serde_json::from_str(file_text(node)).map_err(|e| TreeError::InvalidContent {
            path: path.to_path_buf(),
            reason: format!("account file is not JSON: {e}"),
        })?;
        node.set_attribute(DATA, data);
        Ok(())
    }
}

#[derive(Debug)]
struct Renewals;

impl NodeKind for Renewals {
    fn name(&self) -> &'static str {
        RENEWALS
    }

    fn shape(&self) -> Shape {
        Shape::Directory
    }

    fn parent(&self) -> Option<&'static str> {
        Some(DIRECTORY)
    }
}

#[derive(Debug)]
struct RenewalConf;

impl NodeKind for RenewalConf {
    fn name(&self) -> &'static str {
        RENEWAL_CONF
    }

    fn shape(&self) -> Shape {
        Shape::File
    }

    fn parent(&self) -> Option<&'static str> {
        Some(FILE)
    }

    fn attributes(&self) -> &'static [&'static str] {
        &[ACCOUNT_ID, DOMAIN]
    }

    fn on_scan(&self, node: &mut Node, path: &Path) -> Result<()> {
        let domain = node.id().strip_suffix(RENEWAL_SUFFIX).unwrap_or(node.id()).to_string();
        let account = match parse_account_id(file_text(node)) {
            Some(account) => Value::String(account),
            None => {
                warn!(path = %path.display(), "renewal config names no account");
                Value::Null
            }
        };
        node.set_attribute(ACCOUNT_ID, account);
        node.set_attribute(DOMAIN, Value::String(domain));
        Ok(())
    }
}

fn file_text(node: &Node) -> &str {
    match node.payload() {
        Payload::File { content } => content,
        _ => "",
    }
}

/// `account = <id>` from the `[renewalparams]` section of a renewal config.
#[must_use]
pub fn parse_account_id(text: &str) -> Option<String> {
    let mut in_params = false;
    for line in text.lines().map(str::trim) {
        if line.starts_with('#') || line.is_empty() {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_params = section.trim() == "renewalparams";
            continue;
        }
        if !in_params {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) if key.trim() == "account" => {
                let value = value.trim();
                return (!value.is_empty()).then(|| value.to_string());
            }
            _ => {}
        }
    }
    None
}

/// Whether `id` looks like an ACME account id (32 hex digits).
#[must_use]
pub fn is_account_id(id: &str) -> bool {
    id.len() == 32 && id.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Kind a scanned entry gets from its position in the layout.
fn classify(query: &OverrideQuery<'_>) -> Option<&'static str> {
    match (query.requested, query.parent_kind) {
        (DIRECTORY, _) if query.parent_is_root && query.proposed_id == "accounts" => Some(ACCOUNTS),
        (DIRECTORY, _) if query.parent_is_root && query.proposed_id == "renewal" => Some(RENEWALS),
        (DIRECTORY, ACCOUNTS) => {
            if is_account_id(query.proposed_id) || query.parent_id == "directory" {
                Some(ACCOUNT)
            } else {
                Some(ACCOUNTS)
            }
        }
        (FILE, ACCOUNT) => Some(ACCOUNT_FILE),
        (FILE, RENEWALS) if query.proposed_id.ends_with(RENEWAL_SUFFIX) => Some(RENEWAL_CONF),
        _ => None,
    }
}

/// Add the certificate kinds, their override rule and the domain hook.
///
/// # Errors
///
/// Returns [`TreeError::KindRegistration`] if any of the kinds is already
/// registered or the core kinds are missing.
pub fn register(registry: &mut KindRegistry) -> Result<()> {
    registry.register_kind(Accounts)?;
    registry.register_kind(Account)?;
    registry.register_kind(AccountFile)?;
    registry.register_kind(Renewals)?;
    registry.register_kind(RenewalConf)?;
    registry.register_override(classify);
    registry.register_post_build("certs-account-domains", link_account_domains);
    Ok(())
}

/// Register the certificate kinds in the process-wide registry.
///
/// Calling it again is a no-op.
///
/// # Errors
///
/// See [`register`].
pub fn install() -> Result<()> {
    registry::update_global(|registry| {
        if registry.contains(ACCOUNTS) {
            return Ok(());
        }
        register(registry)
    })
}

/// Nodes whose kind is `kind` or specializes it, in tree order.
fn nodes_of(tree: &Tree, kind: &str) -> Vec<NodeId> {
    tree.descendants(tree.root())
        .into_iter()
        .filter(|id| tree.kind_def(*id).is_ok_and(|def| def.is_a(kind)))
        .collect()
}

fn string_attribute(tree: &Tree, id: NodeId, name: &str) -> Option<String> {
    tree.node(id).extra_attribute(name)?.as_str().map(str::to_string)
}

/// Account id to account directory.
#[must_use]
pub fn accounts(tree: &Tree) -> BTreeMap<String, NodeId> {
    nodes_of(tree, ACCOUNT)
        .into_iter()
        .map(|id| (tree.node(id).id().to_string(), id))
        .collect()
}

/// Renewal configs indexed by domain and by account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenewalIndex {
    /// Domain to its renewal config.
    pub by_domain: BTreeMap<String, NodeId>,
    /// Account id to the domains renewed with it.
    pub by_account: BTreeMap<String, BTreeSet<String>>,
}

/// Index every renewal config in the tree.
#[must_use]
pub fn renewals(tree: &Tree) -> RenewalIndex {
    let mut index = RenewalIndex::default();
    for conf in nodes_of(tree, RENEWAL_CONF) {
        let Some(domain) = string_attribute(tree, conf, DOMAIN) else {
            continue;
        };
        if let Some(account) = string_attribute(tree, conf, ACCOUNT_ID) {
            index.by_account.entry(account).or_default().insert(domain.clone());
        }
        index.by_domain.insert(domain, conf);
    }
    index
}

/// Account directory a renewal config names, if it is in the tree.
#[must_use]
pub fn renewal_account(tree: &Tree, conf: NodeId) -> Option<NodeId> {
    let account = string_attribute(tree, conf, ACCOUNT_ID)?;
    accounts(tree).get(&account).copied()
}

/// Domains recorded on an account, sorted.
#[must_use]
pub fn account_domains(tree: &Tree, account: NodeId) -> Vec<String> {
    tree.node(account)
        .extra_attribute(DOMAINS)
        .and_then(Value::as_array)
        .map(|domains| domains.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn link_account_domains(tree: &mut Tree) -> Result<()> {
    let index = renewals(tree);
    for account in nodes_of(tree, ACCOUNT) {
        let mut domains: BTreeSet<String> = account_domains(tree, account).into_iter().collect();
        if let Some(renewed) = index.by_account.get(tree.node(account).id()) {
            domains.extend(renewed.iter().cloned());
        }
        debug!(account = tree.node(account).id(), count = domains.len(), "account domains");
        let domains: Vec<Value> = domains.into_iter().map(Value::String).collect();
        tree.node_mut(account).set_attribute(DOMAINS, Value::Array(domains));
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::tree::builder::TreeBuilder;
    use std::fs;
    use std::os::unix::fs::symlink;
    use std::sync::Arc;
    use tempfile::TempDir;

    const ACCOUNT_HASH: &str = "0123456789abcdef0123456789abcdef";

    fn certs_registry() -> Arc<KindRegistry> {
        let mut registry = KindRegistry::core();
        register(&mut registry).unwrap();
        Arc::new(registry)
    }

    fn layout() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let account = root.join("accounts/acme-v02.api.letsencrypt.org/directory").join(ACCOUNT_HASH);
        fs::create_dir_all(&account).unwrap();
        fs::write(account.join("meta.json"), r#"{"creation_host": "web1"}"#).unwrap();
        fs::write(account.join("regr.json"), r#"{"body": {}}"#).unwrap();
        fs::create_dir_all(root.join("renewal")).unwrap();
        fs::write(
            root.join("renewal/example.com.conf"),
            format!("version = 2.0.0\n\n[renewalparams]\nauthenticator = webroot\naccount = {ACCOUNT_HASH}\n"),
        )
        .unwrap();
        fs::write(root.join("renewal/README"), "notes").unwrap();
        fs::create_dir_all(root.join("archive/example.com")).unwrap();
        fs::write(root.join("archive/example.com/cert1.pem"), "CERT1").unwrap();
        fs::create_dir_all(root.join("live/example.com")).unwrap();
        symlink("../../archive/example.com/cert1.pem", root.join("live/example.com/cert.pem")).unwrap();
        temp
    }

    #[test]
    fn test_scan_picks_certificate_kinds() {
        let temp = layout();
        let tree = TreeBuilder::new(certs_registry()).build(temp.path()).unwrap();

        let kind_at = |path: &str| tree.node(tree.lookup(path).unwrap()).kind();
        assert_eq!(kind_at("accounts"), ACCOUNTS);
        assert_eq!(kind_at("accounts/acme-v02.api.letsencrypt.org"), ACCOUNTS);
        assert_eq!(kind_at("accounts/acme-v02.api.letsencrypt.org/directory"), ACCOUNTS);
        let account_path = format!("accounts/acme-v02.api.letsencrypt.org/directory/{ACCOUNT_HASH}");
        assert_eq!(kind_at(account_path.as_str()), ACCOUNT);
        assert_eq!(kind_at(format!("{account_path}/meta.json").as_str()), ACCOUNT_FILE);
        assert_eq!(kind_at("renewal"), RENEWALS);
        assert_eq!(kind_at("renewal/example.com.conf"), RENEWAL_CONF);
        assert_eq!(kind_at("renewal/README"), FILE);
        assert_eq!(kind_at("archive"), DIRECTORY);
        assert_eq!(kind_at("live/example.com"), DIRECTORY);
    }

    #[test]
    fn test_scan_derives_attributes() {
        let temp = layout();
        let tree = TreeBuilder::new(certs_registry()).build(temp.path()).unwrap();

        let conf = tree.lookup("renewal/example.com.conf").unwrap();
        assert_eq!(tree.attribute(conf, DOMAIN), Some(Value::from("example.com")));
        assert_eq!(tree.attribute(conf, ACCOUNT_ID), Some(Value::from(ACCOUNT_HASH)));

        let account = accounts(&tree)[ACCOUNT_HASH];
        assert_eq!(account_domains(&tree, account), vec!["example.com"]);
        assert_eq!(renewal_account(&tree, conf), Some(account));

        let meta = tree.search(account, "meta.json").unwrap();
        assert_eq!(tree.attribute(meta, DATA), Some(serde_json::json!({"creation_host": "web1"})));
    }

    #[test]
    fn test_account_lookup_matches_search() {
        let temp = layout();
        let tree = TreeBuilder::new(certs_registry()).build(temp.path()).unwrap();
        let searched = tree
            .search(
                tree.root(),
                &format!("accounts/acme-v02.api.letsencrypt.org/directory/{ACCOUNT_HASH}"),
            )
            .unwrap();
        assert_eq!(accounts(&tree).get(ACCOUNT_HASH), Some(&searched));
    }

    #[test]
    fn test_renewal_index() {
        let temp = layout();
        fs::write(
            temp.path().join("renewal/example.org.conf"),
            format!("[renewalparams]\naccount = {ACCOUNT_HASH}\n"),
        )
        .unwrap();
        let tree = TreeBuilder::new(certs_registry()).build(temp.path()).unwrap();
        let index = renewals(&tree);

        assert_eq!(index.by_domain.len(), 2);
        let domains: Vec<&str> = index.by_account[ACCOUNT_HASH].iter().map(String::as_str).collect();
        assert_eq!(domains, vec!["example.com", "example.org"]);
    }

    #[test]
    fn test_kinds_survive_text_round_trip() {
        let temp = layout();
        let registry = certs_registry();
        let tree = TreeBuilder::new(Arc::clone(&registry)).build(temp.path()).unwrap();
        let restored = Tree::from_text(&tree.to_text().unwrap(), registry).unwrap();

        assert!(restored.is_equal(&tree));
        let conf = restored.lookup("renewal/example.com.conf").unwrap();
        assert_eq!(restored.node(conf).kind(), RENEWAL_CONF);
        let account = accounts(&restored)[ACCOUNT_HASH];
        assert_eq!(account_domains(&restored, account), vec!["example.com"]);
    }

    #[test]
    fn test_invalid_account_json_rejected() {
        let temp = layout();
        let account = temp
            .path()
            .join("accounts/acme-v02.api.letsencrypt.org/directory")
            .join(ACCOUNT_HASH);
        fs::write(account.join("private_key.json"), "not json").unwrap();
        let err = TreeBuilder::new(certs_registry()).build(temp.path()).unwrap_err();
        assert_eq!(err.category(), "invalid-content");
    }

    #[test]
    fn test_register_twice_rejected() {
        let mut registry = KindRegistry::core();
        register(&mut registry).unwrap();
        assert!(register(&mut registry).is_err());
    }

    #[test]
    fn test_parse_account_id() {
        assert_eq!(
            parse_account_id("[renewalparams]\n  account = abc \n"),
            Some("abc".to_string())
        );
        assert_eq!(parse_account_id("account = top-level\n[renewalparams]\n"), None);
        assert_eq!(parse_account_id("[other]\naccount = abc\n"), None);
        assert_eq!(parse_account_id("[renewalparams]\naccount =\n"), None);
    }

    #[test]
    fn test_is_account_id() {
        assert!(is_account_id(ACCOUNT_HASH));
        assert!(!is_account_id("acme-v02.api.letsencrypt.org"));
        assert!(!is_account_id("0123456789abcdef"));
    }
}
