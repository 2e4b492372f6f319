use anyhow::{Context, Result};
use colored::Colorize;
use std::collections::HashSet;
use std::path::Path;

/// Flags configuration keys that nothing reads.
pub struct ConfigValidator {
    /// Every recognized `section.key`
    known_fields: HashSet<&'static str>,
    /// Recognized section names
    known_sections: HashSet<&'static str>,
}

impl ConfigValidator {
    /// Create a new validator with known configuration fields
    #[must_use]
    pub fn new() -> Self {
        let known_fields: HashSet<&'static str> = super::Config::KEYS.iter().copied().collect();
        let known_sections = known_fields
            .iter()
            .filter_map(|field| field.split_once('.').map(|(section, _)| section))
            .collect();

        Self {
            known_fields,
            known_sections,
        }
    }

    /// Unknown keys in configuration text, in document order.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML
    pub fn unknown_fields(&self, content: &str) -> Result<Vec<String>> {
        let parsed: toml::Table = toml::from_str(content).context("Failed to parse TOML config")?;

        let mut unknown = Vec::new();
        for (section, value) in &parsed {
            let toml::Value::Table(fields) = value else {
                unknown.push(section.clone());
                continue;
            };
            if !self.known_sections.contains(section.as_str()) {
                unknown.push(section.clone());
                continue;
            }
            for key in fields.keys() {
                let full_key = format!("{section}.{key}");
                if !self.known_fields.contains(full_key.as_str()) {
                    unknown.push(full_key);
                }
            }
        }
        Ok(unknown)
    }

    /// Validate a configuration file and warn about unknown keys on stderr
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub fn validate_config_file(&self, config_path: &Path) -> Result<()> {
        if !config_path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        let unknown = self.unknown_fields(&content)?;

        if !unknown.is_empty() {
            eprintln!("{}", "Configuration warnings:".yellow().bold());
            for field in &unknown {
                eprintln!("  Unknown configuration field: {}", field.yellow());
            }
            eprintln!();
        }

        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}
