use content_inspector::{ContentType, inspect};
use tracing::debug;

/// Bytes inspected when classifying content.
const SNIFF_LEN: usize = 8192;

/// Check if text content should be treated as binary.
///
/// Content that made it into the tree is valid UTF-8, but may still carry
/// NUL bytes or other control data that a line diff would mangle. Only the
/// first 8KB are inspected; empty content is text.
#[must_use]
pub fn is_binary_content(content: &str) -> bool {
    let bytes = content.as_bytes();
    if bytes.is_empty() {
        return false;
    }

    let sample = &bytes[..bytes.len().min(SNIFF_LEN)];
    let is_binary = matches!(inspect(sample), ContentType::BINARY);
    debug!(is_binary, bytes_checked = sample.len(), "binary detection complete");
    is_binary
}
