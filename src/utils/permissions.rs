use std::fs;
use std::io;
use std::path::Path;

/// Cross-platform file permissions handling
///
/// The stored mode may carry file-type bits (as scanned); only the permission
/// bits are ever applied back to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilePermissions {
    mode: u32,
}

impl FilePermissions {
    /// Create permissions from a raw mode value
    #[must_use]
    pub const fn from_mode(mode: u32) -> Self {
        Self { mode }
    }

    /// Get the raw mode value
    #[must_use]
    pub const fn mode(&self) -> u32 {
        self.mode
    }

    /// Permission bits only (setuid/setgid/sticky plus rwx triplets)
    #[must_use]
    pub const fn permission_bits(&self) -> u32 {
        self.mode & 0o7777
    }

    /// Read permissions from already-fetched metadata
    #[must_use]
    pub fn from_metadata(metadata: &fs::Metadata) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            Self::from_mode(metadata.mode())
        }

        #[cfg(windows)]
        {
            // Read-only is the only bit Windows can round-trip
            let mode = if metadata.permissions().readonly() {
                0o444
            } else {
                0o644
            };
            Self::from_mode(mode)
        }

        #[cfg(not(any(unix, windows)))]
        {
            let _ = metadata;
            Self::from_mode(0o644)
        }
    }

    /// Apply permissions to a path if `preserve_permissions` is enabled
    ///
    /// # Errors
    ///
    /// Returns an error if setting permissions fails (only on platforms that support it)
    pub fn apply_to_path(&self, path: &Path, preserve_permissions: bool) -> io::Result<()> {
        if !preserve_permissions {
            return Ok(());
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(self.permission_bits()))?;
        }

        #[cfg(windows)]
        {
            let is_readonly = (self.mode & 0o200) == 0;
            let mut permissions = fs::metadata(path)?.permissions();
            permissions.set_readonly(is_readonly);
            fs::set_permissions(path, permissions)?;
        }

        #[cfg(not(any(unix, windows)))]
        {
            let _ = path;
        }

        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_file_type_bits_stripped() {
        let perms = FilePermissions::from_mode(0o100_600);
        assert_eq!(perms.permission_bits(), 0o600);
        assert_eq!(perms.mode(), 0o100_600);
    }

    #[test]
    fn test_apply_and_read_back() {
        let temp = TempDir::new().unwrap();
        let key = temp.path().join("privkey.pem");
        fs::write(&key, "KEY").unwrap();

        FilePermissions::from_mode(0o100_600)
            .apply_to_path(&key, true)
            .unwrap();
        let metadata = fs::metadata(&key).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o7777, 0o600);
        assert_eq!(FilePermissions::from_metadata(&metadata).permission_bits(), 0o600);
    }

    #[test]
    fn test_apply_disabled_is_noop() {
        let temp = TempDir::new().unwrap();
        let key = temp.path().join("privkey.pem");
        fs::write(&key, "KEY").unwrap();
        fs::set_permissions(&key, fs::Permissions::from_mode(0o644)).unwrap();

        FilePermissions::from_mode(0o600).apply_to_path(&key, false).unwrap();
        assert_eq!(fs::metadata(&key).unwrap().permissions().mode() & 0o7777, 0o644);
    }
}
