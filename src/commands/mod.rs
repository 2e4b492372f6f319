/// Check a directory for unresolved symlinks.
pub mod check;
/// Get and set configuration values.
pub mod config;
/// Shared plumbing for commands.
pub mod context;
/// Scan a directory and relocate it onto another root.
pub mod copy;
/// Compare two directories or snapshots.
pub mod diff;
/// Scan a directory into a snapshot.
pub mod scan;
/// Rebuild a snapshot onto disk.
pub mod write;

pub use context::CommandContext;
