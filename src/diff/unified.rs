use colored::Colorize;
use similar::{Algorithm, ChangeTag, TextDiff};
use std::io::{self, Write};
use tracing::{Level, debug, span};

/// Configuration for unified diff generation
#[derive(Debug, Clone, Copy)]
pub struct UnifiedDiffConfig {
    /// Number of context lines around changes (typically 3)
    pub context_lines: usize,
    /// Diff algorithm to use (Myers, Patience)
    pub algorithm: Algorithm,
    /// Whether to colorize the output
    pub colorize: bool,
}

impl Default for UnifiedDiffConfig {
    fn default() -> Self {
        Self {
            context_lines: 3,
            algorithm: Algorithm::Myers,
            colorize: false,
        }
    }
}

/// Generate a unified diff between two file contents.
///
/// Produces Git-style unified diff output with:
/// - File headers (`--- a/label` and `+++ b/label`)
/// - Hunk headers (`@@ -10,7 +10,9 @@`)
/// - Context lines (unchanged, prefixed with space)
/// - Deletion lines (prefixed with `-`, colored red)
/// - Addition lines (prefixed with `+`, colored green)
///
/// Returns the number of changed lines written.
///
/// # Errors
///
/// Returns an error if writing to the output writer fails.
pub fn generate_unified_diff(
    old_content: &str,
    new_content: &str,
    old_label: &str,
    new_label: &str,
    config: &UnifiedDiffConfig,
    writer: &mut dyn Write,
) -> io::Result<usize> {
    let span = span!(
        Level::DEBUG,
        "diff_generation",
        path = new_label,
        algorithm = ?config.algorithm,
        context = config.context_lines
    );
    let _guard = span.enter();

    let diff = TextDiff::configure()
        .algorithm(config.algorithm)
        .diff_lines(old_content, new_content);

    let old_header = format!("--- a/{old_label}");
    let new_header = format!("+++ b/{new_label}");

    if config.colorize {
        writeln!(writer, "{}", old_header.red())?;
        writeln!(writer, "{}", new_header.green())?;
    } else {
        writeln!(writer, "{old_header}")?;
        writeln!(writer, "{new_header}")?;
    }

    let mut total_changes = 0;

    for hunk in diff
        .unified_diff()
        .context_radius(config.context_lines)
        .iter_hunks()
    {
        let hunk_header = hunk.header().to_string();
        if config.colorize {
            writeln!(writer, "{}", hunk_header.cyan())?;
        } else {
            writeln!(writer, "{hunk_header}")?;
        }

        for change in hunk.iter_changes() {
            let line = match change.tag() {
                ChangeTag::Delete => {
                    total_changes += 1;
                    paint(format!("-{change}"), config.colorize, Paint::Removed)
                }
                ChangeTag::Insert => {
                    total_changes += 1;
                    paint(format!("+{change}"), config.colorize, Paint::Added)
                }
                ChangeTag::Equal => format!(" {change}"),
            };

            write!(writer, "{line}")?;
            if change.missing_newline() {
                writeln!(writer)?;
                writeln!(writer, "\\ No newline at end of file")?;
            }
        }
    }

    debug!(path = new_label, changes = total_changes, "diff generation complete");
    Ok(total_changes)
}

/// Unified diff as a plain string, for storing alongside a delta.
#[must_use]
pub fn unified_patch(old_content: &str, new_content: &str, old_label: &str, new_label: &str, config: &UnifiedDiffConfig) -> String {
    let mut buffer = Vec::new();
    let plain = UnifiedDiffConfig {
        colorize: false,
        ..*config
    };
    // Writing into a Vec cannot fail.
    let _ = generate_unified_diff(old_content, new_content, old_label, new_label, &plain, &mut buffer);
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Generate a simple "Binary files differ" message for binary content.
///
/// # Errors
///
/// Returns an error if writing to the output fails.
pub fn generate_binary_diff_message(old_label: &str, new_label: &str, writer: &mut dyn Write) -> io::Result<()> {
    writeln!(writer, "Binary files a/{old_label} and b/{new_label} differ")
}

/// Re-emit a stored plain patch, colored line by line when `colorize` is set.
///
/// # Errors
///
/// Returns an error if writing to the output fails.
pub fn write_patch(patch: &str, colorize: bool, writer: &mut dyn Write) -> io::Result<()> {
    for line in patch.lines() {
        let painted = if line.starts_with('-') {
            paint(line.to_string(), colorize, Paint::Removed)
        } else if line.starts_with('+') {
            paint(line.to_string(), colorize, Paint::Added)
        } else if line.starts_with("@@") {
            paint(line.to_string(), colorize, Paint::Hunk)
        } else {
            line.to_string()
        };
        writeln!(writer, "{painted}")?;
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Paint {
    Removed,
    Added,
    Hunk,
}

fn paint(line: String, colorize: bool, paint: Paint) -> String {
    if !colorize {
        return line;
    }
    match paint {
        Paint::Removed => line.red().to_string(),
        Paint::Added => line.green().to_string(),
        Paint::Hunk => line.cyan().to_string(),
    }
}
