use anyhow::{Context, Result};
use std::io;
use std::path::{Path, PathBuf};

/// Expands tilde in path to home directory
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    if let Some(path_str) = path.to_str() {
        if path_str.starts_with("~/") || path_str == "~" {
            let home = dirs::home_dir().context("Could not find home directory")?;
            if path_str == "~" {
                Ok(home)
            } else {
                Ok(home.join(&path_str[2..]))
            }
        } else {
            Ok(path.to_path_buf())
        }
    } else {
        Ok(path.to_path_buf())
    }
}

/// Makes a path absolute, resolving relative paths from current directory
///
/// # Errors
///
/// Returns an error if the current directory cannot be determined
pub fn make_absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        let current_dir = std::env::current_dir()?;
        Ok(current_dir.join(path))
    }
}

/// Relative path from directory `from_dir` to `to`, both `/`-separated and
/// relative to the same root (the empty string is the root itself).
///
/// This is the string written into a symlink living in `from_dir` that should
/// point at `to`.
#[must_use]
pub fn relative_between(from_dir: &str, to: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|s| !s.is_empty()).collect();
    let target: Vec<&str> = to.split('/').filter(|s| !s.is_empty()).collect();

    let shared = from
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = std::iter::repeat_n("..", from.len() - shared).collect();
    parts.extend(&target[shared..]);

    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde() {
        let home = dirs::home_dir().unwrap();

        let tilde_path = PathBuf::from("~/letsencrypt");
        let result = expand_tilde(&tilde_path).unwrap();
        assert_eq!(result, home.join("letsencrypt"));

        let just_tilde = PathBuf::from("~");
        let result = expand_tilde(&just_tilde).unwrap();
        assert_eq!(result, home);

        let no_tilde = PathBuf::from("/etc/letsencrypt");
        let result = expand_tilde(&no_tilde).unwrap();
        assert_eq!(result, no_tilde);
    }

    #[test]
    fn test_make_absolute() {
        let absolute = PathBuf::from("/absolute/path");
        let result = make_absolute(&absolute).unwrap();
        assert_eq!(result, absolute);

        let relative = PathBuf::from("relative/path");
        let result = make_absolute(&relative).unwrap();
        assert!(result.is_absolute());
        assert!(result.ends_with("relative/path"));
    }

    #[test]
    fn test_relative_between() {
        assert_eq!(
            relative_between("live/example.com", "archive/example.com/cert1.pem"),
            "../../archive/example.com/cert1.pem"
        );
        assert_eq!(relative_between("live/example.com", "live/example.com/cert.pem"), "cert.pem");
        assert_eq!(relative_between("", "archive/cert1.pem"), "archive/cert1.pem");
        assert_eq!(relative_between("a/b", "a"), "..");
        assert_eq!(relative_between("a", "a"), ".");
    }
}
