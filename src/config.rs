//! Configuration management for the DTIF pipeline
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (dtif.toml)
//! - Environment variables (DTIF__*)
//!
//! ## Example config file (dtif.toml):
//! ```toml
//! [resolver]
//! max_depth = 32
//! allow_network_references = false
//!
//! [resolver.context]
//! theme = "dark"
//! density = "compact"
//!
//! [normalizer]
//! max_nesting = 256
//!
//! [crawl]
//! max_documents = 256
//! ```

use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::Result;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DtifConfig {
    /// Resolver settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Normalizer settings
    #[serde(default)]
    pub normalizer: NormalizerConfig,

    /// External document crawl settings
    #[serde(default)]
    pub crawl: CrawlConfig,
}

/// Resolver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Maximum alias/override/fallback recursion depth
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Follow `http`/`https` references
    #[serde(default)]
    pub allow_network_references: bool,

    /// Context matched against override `$when` maps
    #[serde(default)]
    pub context: Map<String, Value>,
}

/// Normalizer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerConfig {
    #[serde(default = "default_max_nesting")]
    pub max_nesting: usize,
}

/// External crawl configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Upper bound on documents loaded by one crawl
    #[serde(default = "default_max_documents")]
    pub max_documents: usize,
}

// Default value functions
fn default_max_depth() -> usize {
    crate::resolver::DEFAULT_MAX_DEPTH
}

fn default_max_nesting() -> usize {
    256
}

fn default_max_documents() -> usize {
    256
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            allow_network_references: false,
            context: Map::new(),
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_nesting: default_max_nesting(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_documents: default_max_documents(),
        }
    }
}

impl DtifConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the defaults
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["dtif.toml", ".dtif.toml", "config/dtif.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("org", "dtif", "dtif") {
            let xdg_config = config_dir.config_dir().join("dtif.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        // Load from environment variables (DTIF__RESOLVER__MAX_DEPTH=...)
        builder = builder.add_source(
            Environment::with_prefix("DTIF")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let loaded: Self = config.try_deserialize()?;

        tracing::debug!(
            max_depth = loaded.resolver.max_depth,
            context_keys = loaded.resolver.context.len(),
            "loaded configuration"
        );
        Ok(loaded)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = DtifConfig::default();
        assert_eq!(config.resolver.max_depth, 32);
        assert!(!config.resolver.allow_network_references);
        assert_eq!(config.normalizer.max_nesting, 256);
        assert_eq!(config.crawl.max_documents, 256);
    }

    #[test]
    fn test_serialize_config() {
        let config = DtifConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[resolver]"));
        assert!(toml_str.contains("[crawl]"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[resolver]\nmax_depth = 8\n\n[resolver.context]\ntheme = \"dark\"\n",
        )
        .unwrap();

        let config = DtifConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.resolver.max_depth, 8);
        assert_eq!(config.resolver.context.get("theme"), Some(&json!("dark")));
        assert_eq!(config.crawl.max_documents, 256);
    }

    #[test]
    fn test_save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dtif.toml");

        let mut config = DtifConfig::default();
        config.resolver.allow_network_references = true;
        config.save(&path).unwrap();

        let loaded = DtifConfig::load_from(Some(&path)).unwrap();
        assert!(loaded.resolver.allow_network_references);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DtifConfig::load_from(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
