//! Configuration for catalog-core
//!
//! Defaults applied to new assets, query tuning, local storage keys and the
//! remote endpoint. Every section has a working default, so an empty file is
//! a valid configuration that runs fully offline.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::asset::FAVORITE_TAG;
use crate::error::ConfigError;
use crate::query::RECENT_LIMIT;

/// Top-level catalog configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Values filled in for drafts that omit them
    pub defaults: DefaultsConfig,
    /// View tuning
    pub query: QueryConfig,
    /// Local persistence keys
    pub storage: StorageConfig,
    /// Remote catalog endpoint
    pub remote: RemoteConfig,
}

/// Defaults for newly added assets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub owner: String,
    /// Quality score assigned when a draft has none (0-100)
    pub quality: u8,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            owner: "Catalog Admin".to_string(),
            quality: 82,
        }
    }
}

/// Query engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Maximum number of assets in the flat "recent" view
    pub recent_limit: usize,
    /// Tag that marks an asset as a favorite. Read-only for now; the
    /// catalog always uses the built-in tag.
    pub favorite_tag: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            recent_limit: RECENT_LIMIT,
            favorite_tag: FAVORITE_TAG.to_string(),
        }
    }
}

/// Local storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Prefix for the `<prefix>:assets` and `<prefix>:pending` keys
    pub key_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            key_prefix: "catalog".to_string(),
        }
    }
}

/// Remote endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the row service; `None` means run offline
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl RemoteConfig {
    /// A remote counts as configured only when it has a non-blank base URL.
    pub fn is_configured(&self) -> bool {
        self.base_url
            .as_deref()
            .map(|u| !u.trim().is_empty())
            .unwrap_or(false)
    }
}

impl CatalogConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize configuration to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json_str)?)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load and validate a config file; `.json` files are parsed as JSON,
    /// anything else as TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text)?,
            _ => Self::from_toml(&text)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.defaults.quality > 100 {
            return Err(ConfigError::OutOfRange(
                "defaults.quality must be between 0 and 100".to_string(),
            ));
        }

        if self.defaults.owner.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "defaults.owner must not be empty".to_string(),
            ));
        }

        if self.query.recent_limit == 0 {
            return Err(ConfigError::OutOfRange(
                "query.recent_limit must be positive".to_string(),
            ));
        }

        if self.query.favorite_tag != FAVORITE_TAG {
            return Err(ConfigError::Invalid(format!(
                "query.favorite_tag must be \"{}\"",
                FAVORITE_TAG
            )));
        }

        if self.storage.key_prefix.trim().is_empty() || self.storage.key_prefix.contains(':') {
            return Err(ConfigError::Invalid(
                "storage.key_prefix must be non-empty and must not contain ':'".to_string(),
            ));
        }

        if self.remote.is_configured() && self.remote.timeout_secs == 0 {
            return Err(ConfigError::OutOfRange(
                "remote.timeout_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
