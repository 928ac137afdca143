//! Language table mapping submission language names to judge ids
//!
//! The set of accepted languages is closed: anything not in the table
//! (including aliases) is rejected before a single byte reaches the judge.

use std::collections::HashMap;
use std::fs;
use std::sync::OnceLock;

use anyhow::Context;
use serde::Deserialize;

/// Configuration for a supported language
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Canonical name, e.g. "c++"
    pub name: String,
    /// Numeric id the external judge expects
    pub judge_id: u32,
}

/// Raw TOML configuration for a language
#[derive(Debug, Deserialize)]
struct RawLanguageConfig {
    judge_id: u32,
    #[serde(default)]
    aliases: Vec<String>,
}

/// Global language table, initialized once at startup
static LANGUAGES: OnceLock<HashMap<String, LanguageConfig>> = OnceLock::new();

/// Initialize the language table from a TOML file
pub fn init_languages(path: &str) -> anyhow::Result<()> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read language config at {}", path))?;
    let raw_configs: HashMap<String, RawLanguageConfig> =
        toml::from_str(&content).context("Failed to parse language config")?;

    let mut languages = HashMap::new();

    for (name, raw) in raw_configs {
        let config = LanguageConfig {
            name: name.to_lowercase(),
            judge_id: raw.judge_id,
        };

        // Canonical name plus aliases all resolve to the same config
        languages.insert(name.to_lowercase(), config.clone());
        for alias in raw.aliases {
            languages.insert(alias.to_lowercase(), config.clone());
        }
    }

    LANGUAGES
        .set(languages)
        .map_err(|_| anyhow::anyhow!("Languages already initialized"))?;

    Ok(())
}

/// Look up a language by name or alias, case-insensitively
pub fn get_language(language: &str) -> Option<LanguageConfig> {
    LANGUAGES.get()?.get(&language.to_lowercase()).cloned()
}

/// All accepted names and aliases
pub fn get_supported_languages() -> Vec<String> {
    LANGUAGES
        .get()
        .map(|langs| langs.keys().cloned().collect())
        .unwrap_or_default()
}
