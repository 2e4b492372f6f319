mod common;

use anyhow::Result;
use common::{CertDir, DOMAIN, certs_registry};
use letssync::tree::builder::TreeBuilder;
use letssync::tree::kind::SYMLINK;
use letssync::tree::{Node, Payload};
use letssync::{Tree, TreeError};
use std::fs;
use std::path::Path;

fn scan(path: &Path) -> Result<Tree> {
    Ok(TreeBuilder::new(certs_registry()).build(path)?)
}

#[test]
fn test_text_round_trip_both_directions() -> Result<()> {
    let dir = CertDir::new()?;
    let tree = scan(dir.path())?;

    let restored = Tree::from_text(&tree.to_text()?, certs_registry())?;
    assert!(restored.is_equal(&tree));
    assert!(tree.is_equal(&restored));
    assert_eq!(restored.name(), tree.name());
    assert_eq!(restored.root_path(), tree.root_path());
    assert_eq!(restored.to_text()?, tree.to_text()?);
    Ok(())
}

#[test]
fn test_repeated_scans_serialize_identically() -> Result<()> {
    let dir = CertDir::new()?;
    assert_eq!(scan(dir.path())?.to_text()?, scan(dir.path())?.to_text()?);
    Ok(())
}

#[test]
fn test_copy_is_equal_both_directions() -> Result<()> {
    let dir = CertDir::new()?;
    let tree = scan(dir.path())?;
    let copy = tree.copy(None)?;

    assert!(copy.is_equal(&tree));
    assert!(tree.is_equal(&copy));
    assert_eq!(copy.root_path(), tree.root_path());
    Ok(())
}

#[test]
fn test_relocated_copy_keeps_relative_structure() -> Result<()> {
    let dir = CertDir::new()?;
    let tree = scan(dir.path())?;
    let new_root = dir.sibling("mirror");
    let copy = tree.copy(Some(&new_root))?;

    assert_eq!(copy.root_path(), new_root);
    let ours: Vec<&str> = tree
        .descendants(tree.root())
        .into_iter()
        .map(|id| tree.node(id).relative_path())
        .collect();
    let theirs: Vec<&str> = copy
        .descendants(copy.root())
        .into_iter()
        .map(|id| copy.node(id).relative_path())
        .collect();
    assert_eq!(ours, theirs);

    let cert = copy.lookup(&format!("live/{DOMAIN}/cert.pem"))?;
    assert_eq!(copy.path(cert), new_root.join("live").join(DOMAIN).join("cert.pem"));
    Ok(())
}

#[test]
fn test_relocated_copy_resolves_every_link() -> Result<()> {
    let dir = CertDir::new()?;
    let tree = scan(dir.path())?;
    assert!(tree.unresolved_links().is_empty());

    let copy = tree.copy(Some(&dir.sibling("elsewhere")))?;
    assert!(copy.unresolved_links().is_empty());

    for id in tree.descendants(tree.root()) {
        let Some(target) = tree.resolved_target(id) else {
            continue;
        };
        let relative = tree.node(id).relative_path();
        let copied = copy.lookup(relative)?;
        let copied_target = copy.resolved_target(copied).expect("link still resolves");
        assert_eq!(
            copy.node(copied_target).relative_path(),
            tree.node(target).relative_path()
        );
        assert_eq!(copy.content(copied), tree.content(id));
    }
    Ok(())
}

#[test]
fn test_write_then_rebuild_is_equal() -> Result<()> {
    let dir = CertDir::new()?;
    let tree = scan(dir.path())?;
    let target = dir.sibling("restored");

    let report = tree.copy(Some(&target))?.write(false)?;
    assert_eq!(report.skipped, 0);
    assert_eq!(report.links_created, 4);

    let rebuilt = scan(&target)?;
    assert!(rebuilt.is_equal(&tree));
    assert!(tree.get_diff(&rebuilt).is_clean());
    Ok(())
}

#[test]
fn test_write_without_overwrite_keeps_disk_content() -> Result<()> {
    let dir = CertDir::new()?;
    let mut tree = scan(dir.path())?;
    let cert_path = dir.path().join("archive").join(DOMAIN).join("cert1.pem");
    let before = fs::read_to_string(&cert_path)?;

    let live_cert = tree.lookup(&format!("live/{DOMAIN}/cert.pem"))?;
    tree.set_content(live_cert, "tampered")?;
    tree.write(false)?;
    tree.write(false)?;

    assert_eq!(fs::read_to_string(&cert_path)?, before);
    Ok(())
}

#[test]
fn test_write_with_overwrite_replaces_content() -> Result<()> {
    let dir = CertDir::new()?;
    let mut tree = scan(dir.path())?;
    let live_cert = tree.lookup(&format!("live/{DOMAIN}/cert.pem"))?;
    tree.set_content(live_cert, "replaced")?;
    tree.write(true)?;

    let cert_path = dir.path().join("archive").join(DOMAIN).join("cert1.pem");
    assert_eq!(fs::read_to_string(cert_path)?, "replaced");
    Ok(())
}

#[test]
fn test_unresolved_link_is_reported_not_empty() -> Result<()> {
    let dir = CertDir::new()?;
    fs::remove_file(dir.path().join("archive").join(DOMAIN).join("chain1.pem"))?;
    let tree = scan(dir.path())?;

    let chain = tree.lookup(&format!("live/{DOMAIN}/chain.pem"))?;
    assert_eq!(tree.unresolved_links(), vec![chain]);
    assert_eq!(tree.content(chain), None);

    let err = tree.copy(Some(&dir.sibling("copy")))?.write(false).unwrap_err();
    assert!(matches!(err, TreeError::UnresolvedLink { .. }));
    assert!(!dir.sibling("copy").exists());
    Ok(())
}

#[test]
fn test_rename_moves_descendants() -> Result<()> {
    let dir = CertDir::new()?;
    let mut tree = scan(dir.path())?;
    let live = tree.lookup("live")?;
    tree.rename(live, "current")?;

    let cert = tree.lookup(&format!("current/{DOMAIN}/cert.pem"))?;
    assert_eq!(tree.node(cert).relative_path(), format!("current/{DOMAIN}/cert.pem"));
    assert!(tree.search(tree.root(), "live").is_none());
    Ok(())
}

#[test]
fn test_rename_then_write_keeps_links_working() -> Result<()> {
    let dir = CertDir::new()?;
    let mut tree = scan(dir.path())?;
    let archive = tree.lookup("archive")?;
    tree.rename(archive, "archive-old")?;
    assert!(tree.unresolved_links().is_empty());
    assert!(tree.copy(None)?.unresolved_links().is_empty());

    let target = dir.sibling("renamed");
    tree.set_root_path(&target);
    tree.write(false)?;

    let live = target.join("live").join(DOMAIN);
    assert_eq!(
        fs::read_link(live.join("cert.pem"))?,
        Path::new("../../archive-old").join(DOMAIN).join("cert1.pem")
    );
    assert!(fs::read_to_string(live.join("cert.pem"))?.contains("generation 1"));

    let rebuilt = scan(&target)?;
    assert!(rebuilt.unresolved_links().is_empty());
    assert!(rebuilt.is_equal(&tree));
    Ok(())
}

#[test]
fn test_link_added_after_build_resolves() -> Result<()> {
    let dir = CertDir::new()?;
    let mut tree = scan(dir.path())?;
    let domain = tree.lookup(&format!("live/{DOMAIN}"))?;
    let alt = tree.add_child(
        domain,
        Node::new(
            "alt.pem",
            SYMLINK,
            0o120_777,
            0.0,
            Payload::symlink(format!("../../archive/{DOMAIN}/cert1.pem")),
        ),
    )?;

    let cert = tree.lookup(&format!("archive/{DOMAIN}/cert1.pem"))?;
    assert_eq!(tree.resolved_target(alt), Some(cert));
    assert_eq!(tree.content(alt), tree.content(cert));
    assert!(tree.unresolved_links().is_empty());

    let target = dir.sibling("extended");
    tree.copy(Some(&target))?.write(false)?;
    assert_eq!(
        fs::read_to_string(target.join("live").join(DOMAIN).join("alt.pem"))?,
        fs::read_to_string(dir.path().join("archive").join(DOMAIN).join("cert1.pem"))?
    );
    Ok(())
}
