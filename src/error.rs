//! Error types for tree construction, persistence and comparison.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the tree layer.
pub type Result<T, E = TreeError> = std::result::Result<T, E>;

/// Failures surfaced by the tree layer.
///
/// Nothing here is retried internally; the caller decides whether to discard a
/// partially built or partially written tree and try again.
#[derive(Error, Debug)]
pub enum TreeError {
    /// A stat, read, mkdir, chmod, write or symlink call failed.
    #[error("failed to {op} {}: {source}", path.display())]
    Filesystem {
        /// Operation that failed ("stat", "read", "create directory", ...).
        op: &'static str,
        /// Path the operation was applied to.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A symlink whose target could not be located inside the tree.
    #[error("symlink {relative_path} -> {target} does not resolve inside the tree")]
    UnresolvedLink {
        /// Relative path of the symlink node.
        relative_path: String,
        /// Raw link target as read or supplied.
        target: String,
    },

    /// Two children with the same id under one parent.
    #[error("duplicate child id {id:?} under {parent:?}")]
    IdCollision {
        /// Relative path of the parent node.
        parent: String,
        /// Colliding id.
        id: String,
    },

    /// A record or override names a kind with no registered definition.
    #[error("unknown node kind {0:?}")]
    UnknownKind(String),

    /// A record is missing an attribute or carries one of the wrong type.
    #[error("malformed {kind} record: {reason}")]
    MalformedRecord {
        /// Kind tag of the offending record.
        kind: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The text form could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// File content was not text, or a domain payload could not be parsed.
    #[error("invalid content in {}: {reason}", path.display())]
    InvalidContent {
        /// Path of the offending file.
        path: PathBuf,
        /// Parser diagnostics.
        reason: String,
    },

    /// A kind, override rule or hook could not be registered.
    #[error("cannot register kind {kind:?}: {reason}")]
    KindRegistration {
        /// Kind being registered or referenced.
        kind: String,
        /// Why registration failed.
        reason: String,
    },

    /// A relative path did not name a node.
    #[error("no node at {0:?}")]
    NotFound(String),
}

impl TreeError {
    /// Wrap an I/O error with the operation and path it belongs to.
    pub(crate) fn fs(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            op,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(kind: &str, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }

    /// Short category name, mirroring the taxonomy callers switch on.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Filesystem { .. } => "filesystem",
            Self::UnresolvedLink { .. } => "unresolved-link",
            Self::IdCollision { .. } => "id-collision",
            Self::UnknownKind(_) => "unknown-kind",
            Self::MalformedRecord { .. } | Self::Encoding(_) => "malformed-record",
            Self::InvalidContent { .. } => "invalid-content",
            Self::KindRegistration { .. } => "registration",
            Self::NotFound(_) => "not-found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filesystem_error_message() {
        let err = TreeError::fs(
            "read",
            "/etc/letsencrypt/live",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("failed to read"));
        assert!(msg.contains("/etc/letsencrypt/live"));
        assert_eq!(err.category(), "filesystem");
    }

    #[test]
    fn test_unresolved_link_message() {
        let err = TreeError::UnresolvedLink {
            relative_path: "live/example.com/cert.pem".to_string(),
            target: "../../archive/example.com/cert1.pem".to_string(),
        };
        assert!(err.to_string().contains("live/example.com/cert.pem"));
        assert_eq!(err.category(), "unresolved-link");
    }
}
