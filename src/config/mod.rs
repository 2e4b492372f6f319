/// TOML loading and value validation.
pub mod parser;
/// Unknown-key detection for configuration files.
pub mod validator;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Settings read from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Tree naming.
    #[serde(default)]
    pub tree: TreeConfig,

    /// What a scan skips.
    #[serde(default)]
    pub scan: ScanConfig,

    /// How trees are written back to disk.
    #[serde(default)]
    pub write: WriteConfig,

    /// How diffs are rendered.
    #[serde(default)]
    pub diff: DiffConfig,
}

/// `[tree]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeConfig {
    /// Logical name given to trees scanned without `--name`.
    #[serde(default = "default_tree_name")]
    pub name: String,
}

/// `[scan]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanConfig {
    /// Glob patterns matched against entry names and relative paths.
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
}

/// `[write]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WriteConfig {
    /// Replace existing files and links unless the command line says otherwise.
    #[serde(default)]
    pub overwrite: bool,
    /// Apply recorded modes to what gets written.
    #[serde(default = "default_true")]
    pub preserve_permissions: bool,
}

/// `[diff]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffConfig {
    /// Context lines around each hunk.
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,
    /// Line diff algorithm.
    #[serde(default)]
    pub algorithm: DiffAlgorithm,
    /// Color diff output on terminals.
    #[serde(default = "default_true")]
    pub colorize: bool,
}

/// Line diff algorithm choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffAlgorithm {
    /// Myers' O(ND) algorithm.
    #[default]
    Myers,
    /// Patience diff, better at moved blocks.
    Patience,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            name: default_tree_name(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: default_ignore_patterns(),
        }
    }
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            overwrite: false,
            preserve_permissions: true,
        }
    }
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            context_lines: default_context_lines(),
            algorithm: DiffAlgorithm::Myers,
            colorize: true,
        }
    }
}

impl Config {
    /// Every key accepted by [`Config::get`] and [`Config::set`], in file order.
    pub const KEYS: &[&str] = &[
        "tree.name",
        "scan.ignore_patterns",
        "write.overwrite",
        "write.preserve_permissions",
        "diff.context_lines",
        "diff.algorithm",
        "diff.colorize",
    ];

    /// Load configuration from a file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Cannot read the configuration file
    /// - Configuration file contains invalid TOML
    /// - A value is out of range
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        parser::parse_config_file(path)
    }

    /// Save configuration to a file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Cannot create parent directories
    /// - Cannot write to the file
    /// - TOML serialization fails
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create config file: {}", path.display()))?;
        file.write_all(toml_str.as_bytes())?;
        Ok(())
    }

    /// Diff options derived from the `[diff]` section.
    #[must_use]
    pub const fn diff_options(&self) -> crate::diff::DiffOptions {
        crate::diff::DiffOptions {
            context_lines: self.diff.context_lines,
            algorithm: crate::diff::config_to_algorithm(&self.diff.algorithm),
        }
    }

    /// Get a configuration value by `section.key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        let (section, field) = key.split_once('.')?;

        match (section, field) {
            ("tree", "name") => Some(self.tree.name.clone()),
            ("scan", "ignore_patterns") => Some(self.scan.ignore_patterns.join(",")),
            ("write", "overwrite") => Some(self.write.overwrite.to_string()),
            ("write", "preserve_permissions") => Some(self.write.preserve_permissions.to_string()),
            ("diff", "context_lines") => Some(self.diff.context_lines.to_string()),
            ("diff", "algorithm") => Some(format!("{:?}", self.diff.algorithm).to_lowercase()),
            ("diff", "colorize") => Some(self.diff.colorize.to_string()),
            _ => None,
        }
    }

    /// Set a configuration value by `section.key`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The key format is invalid (must be section.key)
    /// - The key is unknown
    /// - The value is invalid for the key
    pub fn set(&mut self, key: &str, value: String) -> Result<()> {
        let Some((section, field)) = key.split_once('.') else {
            return Err(anyhow::anyhow!("Invalid configuration key: {key}"));
        };

        match (section, field) {
            ("tree", "name") => {
                if value.trim().is_empty() {
                    return Err(anyhow::anyhow!("Tree name cannot be empty"));
                }
                self.tree.name = value;
            }
            ("scan", "ignore_patterns") => {
                self.scan.ignore_patterns = value
                    .split(',')
                    .map(str::trim)
                    .filter(|pattern| !pattern.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            ("write", "overwrite") => {
                self.write.overwrite = value
                    .parse()
                    .with_context(|| format!("Invalid boolean: {value}"))?;
            }
            ("write", "preserve_permissions") => {
                self.write.preserve_permissions = value
                    .parse()
                    .with_context(|| format!("Invalid boolean: {value}"))?;
            }
            ("diff", "context_lines") => {
                let lines: usize = value
                    .parse()
                    .with_context(|| format!("Invalid number: {value}"))?;
                if lines > parser::MAX_CONTEXT_LINES {
                    return Err(anyhow::anyhow!(
                        "Context lines cannot exceed {}",
                        parser::MAX_CONTEXT_LINES
                    ));
                }
                self.diff.context_lines = lines;
            }
            ("diff", "algorithm") => {
                self.diff.algorithm = match value.to_lowercase().as_str() {
                    "myers" => DiffAlgorithm::Myers,
                    "patience" => DiffAlgorithm::Patience,
                    _ => return Err(anyhow::anyhow!("Unknown diff algorithm: {value}")),
                };
            }
            ("diff", "colorize") => {
                self.diff.colorize = value
                    .parse()
                    .with_context(|| format!("Invalid boolean: {value}"))?;
            }
            _ => return Err(anyhow::anyhow!("Unknown configuration key: {key}")),
        }
        Ok(())
    }
}

// Default functions for serde
fn default_tree_name() -> String {
    "local".to_string()
}

fn default_ignore_patterns() -> Vec<String> {
    vec![".git".to_string(), "*.swp".to_string(), "*.tmp".to_string()]
}

const fn default_true() -> bool {
    true
}

const fn default_context_lines() -> usize {
    3
}
