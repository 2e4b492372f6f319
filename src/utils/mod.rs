//! Utility functions and helpers.
//!
//! - Ignore pattern matching for scans
//! - Path manipulation (tilde expansion, link-relative paths)
//! - Cross-platform permission handling
//! - Timestamp conversion
//!
//! # Submodules
//!
//! - [`paths`]: Path manipulation
//! - [`permissions`]: Cross-platform file permissions
//!
//! # Examples
//!
//! ```
//! use letssync::utils::should_ignore;
//! use std::path::Path;
//!
//! let patterns = vec!["*.swp".to_string(), ".git".to_string()];
//! assert!(should_ignore(Path::new("renewal/.example.com.conf.swp"), &patterns));
//! assert!(!should_ignore(Path::new("renewal/example.com.conf"), &patterns));
//! ```

/// Path manipulation and resolution utilities
pub mod paths;
/// Unix permission handling
pub mod permissions;

use glob::Pattern;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Determines if a path should be ignored based on glob patterns.
///
/// A pattern matches if it matches the whole relative path or any single
/// component of it. A trailing `/` restricts the pattern to directory
/// components (every component but the last).
#[must_use]
pub fn should_ignore(path: &Path, patterns: &[String]) -> bool {
    let path_str = path.to_string_lossy();
    let components: Vec<_> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();

    for raw in patterns {
        let (raw, dirs_only) = match raw.strip_suffix('/') {
            Some(dir) => (dir, true),
            None => (raw.as_str(), false),
        };
        let Ok(pattern) = Pattern::new(raw) else {
            continue;
        };

        if !dirs_only && pattern.matches(&path_str) {
            return true;
        }

        let candidates = if dirs_only {
            &components[..components.len().saturating_sub(1)]
        } else {
            &components[..]
        };
        if candidates.iter().any(|c| pattern.matches(c)) {
            return true;
        }
    }

    false
}

/// Converts a timestamp to fractional seconds since the Unix epoch.
///
/// Times before the epoch come out negative.
#[must_use]
pub fn system_time_to_epoch(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs_f64(),
        Err(before) => -before.duration().as_secs_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_should_ignore_globs() {
        let patterns = vec![".git".to_string(), "*.swp".to_string(), "keys/".to_string()];

        assert!(should_ignore(Path::new(".git"), &patterns));
        assert!(should_ignore(Path::new("accounts/.git/HEAD"), &patterns));
        assert!(should_ignore(Path::new("renewal/a.conf.swp"), &patterns));
        assert!(should_ignore(Path::new("keys/0001_key.pem"), &patterns));
        assert!(!should_ignore(Path::new("keys"), &patterns));
        assert!(!should_ignore(Path::new("renewal/a.conf"), &patterns));
    }

    #[test]
    fn test_should_ignore_invalid_pattern_skipped() {
        let patterns = vec!["[".to_string()];
        assert!(!should_ignore(Path::new("["), &patterns));
    }

    #[test]
    fn test_system_time_to_epoch() {
        let later = UNIX_EPOCH + Duration::from_millis(1500);
        assert!((system_time_to_epoch(later) - 1.5).abs() < f64::EPSILON);

        let earlier = UNIX_EPOCH - Duration::from_secs(2);
        assert!((system_time_to_epoch(earlier) + 2.0).abs() < f64::EPSILON);
    }
}
