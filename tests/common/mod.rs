#![allow(dead_code)]

use anyhow::Result;
use filetime::FileTime;
use letssync::certs;
use letssync::tree::registry::KindRegistry;
use std::fs;
use std::os::unix::fs::{PermissionsExt, symlink};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use walkdir::WalkDir;

pub const ACCOUNT_ID: &str = "0123456789abcdef0123456789abcdef";
pub const DOMAIN: &str = "example.com";
pub const PEMS: [&str; 4] = ["cert", "chain", "fullchain", "privkey"];

/// Fixed modification time so repeated scans serialize identically.
const PINNED: i64 = 1_700_000_000;

/// Registry with the core and certificate kinds, independent of the global one.
pub fn certs_registry() -> Arc<KindRegistry> {
    let mut registry = KindRegistry::core();
    certs::register(&mut registry).expect("certificate kinds register on a core registry");
    Arc::new(registry)
}

/// A certificate directory laid out in a temporary directory:
///
/// ```text
/// letsencrypt/
///   accounts/<ACCOUNT_ID>/{meta,regr,private_key}.json
///   renewal/example.com.conf
///   archive/example.com/{cert,chain,fullchain,privkey}1.pem
///   live/example.com/{cert,chain,fullchain,privkey}.pem -> ../../archive/example.com/*1.pem
/// ```
pub struct CertDir {
    pub temp_dir: TempDir,
    pub root: PathBuf,
}

impl CertDir {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join("letsencrypt");

        let account = root.join("accounts").join(ACCOUNT_ID);
        fs::create_dir_all(&account)?;
        fs::write(account.join("meta.json"), r#"{"creation_host": "web1", "creation_dt": "2024-01-01T00:00:00Z"}"#)?;
        fs::write(account.join("regr.json"), r#"{"body": {}, "uri": "https://acme.example/acct/1"}"#)?;
        fs::write(account.join("private_key.json"), r#"{"kty": "RSA", "n": "abc", "e": "AQAB"}"#)?;
        fs::set_permissions(account.join("private_key.json"), fs::Permissions::from_mode(0o600))?;

        fs::create_dir_all(root.join("renewal"))?;
        fs::write(
            root.join("renewal").join(format!("{DOMAIN}.conf")),
            format!(
                "version = 2.0.0\narchive_dir = /etc/letsencrypt/archive/{DOMAIN}\n\n\
                 [renewalparams]\nauthenticator = webroot\naccount = {ACCOUNT_ID}\n"
            ),
        )?;

        fs::create_dir_all(root.join("archive").join(DOMAIN))?;
        fs::create_dir_all(root.join("live").join(DOMAIN))?;
        let dir = Self { temp_dir, root };
        dir.issue(1)?;
        dir.pin_times()?;
        Ok(dir)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Another root next to this one, not created yet.
    pub fn sibling(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Archive generation `n` of every PEM and point the live links at it.
    pub fn issue(&self, n: u32) -> Result<()> {
        let archive = self.root.join("archive").join(DOMAIN);
        let live = self.root.join("live").join(DOMAIN);
        for pem in PEMS {
            let file = archive.join(format!("{pem}{n}.pem"));
            fs::write(&file, format!("-----BEGIN {pem}-----\ngeneration {n}\n-----END {pem}-----\n"))?;
            if pem == "privkey" {
                fs::set_permissions(&file, fs::Permissions::from_mode(0o600))?;
            }

            let link = live.join(format!("{pem}.pem"));
            if fs::symlink_metadata(&link).is_ok() {
                fs::remove_file(&link)?;
            }
            symlink(format!("../../archive/{DOMAIN}/{pem}{n}.pem"), &link)?;
        }
        Ok(())
    }

    /// Renew the domain: second archive generation, live links repointed.
    pub fn renew(&self) -> Result<()> {
        self.issue(2)?;
        self.pin_times()
    }

    fn pin_times(&self) -> Result<()> {
        let time = FileTime::from_unix_time(PINNED, 0);
        for entry in WalkDir::new(&self.root) {
            filetime::set_symlink_file_times(entry?.path(), time, time)?;
        }
        Ok(())
    }
}
