use super::Config;
use anyhow::{Context, Result};
use std::path::Path;

/// Upper bound for `diff.context_lines`.
pub const MAX_CONTEXT_LINES: usize = 100;

/// Read, UTF-8 check and parse a configuration file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not UTF-8, is not valid
/// TOML, or holds out-of-range values.
pub fn parse_config_file(path: &Path) -> Result<Config> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    // Validate UTF-8 using SIMD
    let content = simdutf8::basic::from_utf8(&bytes)
        .map_err(|e| anyhow::anyhow!("Invalid UTF-8 in config file: {e}"))?;

    parse_config_str(content)
}

/// Parse configuration text and validate its values.
///
/// # Errors
///
/// Returns an error for invalid TOML or out-of-range values.
pub fn parse_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse TOML config")?;

    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    if config.tree.name.trim().is_empty() {
        anyhow::bail!("Tree name cannot be empty");
    }

    if config.diff.context_lines > MAX_CONTEXT_LINES {
        anyhow::bail!("Context lines cannot exceed {MAX_CONTEXT_LINES}");
    }

    for pattern in &config.scan.ignore_patterns {
        glob::Pattern::new(pattern)
            .with_context(|| format!("Invalid ignore pattern: {pattern}"))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiffAlgorithm;
    use tempfile::tempdir;

    #[test]
    fn test_parse_valid_config() {
        let toml_content = r#"
[tree]
name = "primary"

[scan]
ignore_patterns = [".git", "*.bak"]

[write]
overwrite = true

[diff]
context_lines = 5
algorithm = "patience"
colorize = false
"#;

        let config = parse_config_str(toml_content).unwrap();
        assert_eq!(config.tree.name, "primary");
        assert_eq!(config.scan.ignore_patterns, vec![".git", "*.bak"]);
        assert!(config.write.overwrite);
        assert!(config.write.preserve_permissions);
        assert_eq!(config.diff.context_lines, 5);
        assert_eq!(config.diff.algorithm, DiffAlgorithm::Patience);
        assert!(!config.diff.colorize);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = parse_config_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_malformed_toml() {
        let malformed = r#"
[tree
name = "x"
"#;
        let result = parse_config_str(malformed);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse TOML")
        );
    }

    #[test]
    fn test_parse_excessive_context_lines() {
        let invalid = r#"
[diff]
context_lines = 500
"#;
        assert!(parse_config_str(invalid).is_err());
    }

    #[test]
    fn test_parse_empty_tree_name() {
        let invalid = r#"
[tree]
name = ""
"#;
        assert!(parse_config_str(invalid).is_err());
    }

    #[test]
    fn test_parse_invalid_glob() {
        let invalid = r#"
[scan]
ignore_patterns = ["[unclosed"]
"#;
        assert!(parse_config_str(invalid).is_err());
    }

    #[test]
    fn test_parse_invalid_data_types() {
        let invalid = r#"
[diff]
context_lines = "three"
"#;
        assert!(parse_config_str(invalid).is_err());
    }

    #[test]
    fn test_parse_unknown_algorithm() {
        let invalid = r#"
[diff]
algorithm = "histogram"
"#;
        assert!(parse_config_str(invalid).is_err());
    }

    #[test]
    fn test_parse_invalid_utf8_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        std::fs::write(&path, [0xFF, 0xFE, 0xFD])?;

        let err = parse_config_file(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid UTF-8"));
        Ok(())
    }
}
