use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;
use tracing::debug;

use crate::domain::BlacklistEntry;
use crate::infra::{llm, uex};

const APP_QUALIFIER: &str = "space";
const APP_ORG: &str = "UexTrader";
const APP_NAME: &str = "uex-trader";

/// Settings of the trading skill. Every field has a default, so a partial
/// file (or none at all) is fine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillConfig {
    pub uex_api_url: String,
    pub uex_api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    /// Overrides the platform data directory.
    pub cache_path: Option<PathBuf>,
    pub summarize_routes_by_commodity: bool,
    pub tradestart_mandatory: bool,
    pub default_route_count: usize,
    pub default_location_count: usize,
    pub trade_blacklist: Vec<BlacklistEntry>,
    /// Background price reload; off when unset.
    pub price_refresh_interval_secs: Option<u64>,
    pub llm: LlmConfig,
}

impl Default for SkillConfig {
    fn default() -> Self {
        Self {
            uex_api_url: uex::DEFAULT_BASE_URL.to_string(),
            uex_api_key: None,
            request_timeout_secs: 15,
            cache_enabled: true,
            cache_ttl_secs: 24 * 60 * 60,
            cache_path: None,
            summarize_routes_by_commodity: true,
            tradestart_mandatory: true,
            default_route_count: 1,
            default_location_count: 5,
            trade_blacklist: Vec::new(),
            price_refresh_interval_secs: None,
            llm: LlmConfig::default(),
        }
    }
}

impl SkillConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn price_refresh_interval(&self) -> Option<Duration> {
        self.price_refresh_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Without a key, names are matched by similarity alone.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: llm::DEFAULT_BASE_URL.to_string(),
            model: llm::DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .map(|dirs| dirs.config_dir().join("config.json"))
}

/// An explicit path must exist; the default location may be absent.
pub fn load_config(path: Option<&Path>) -> Result<SkillConfig, ConfigError> {
    let (path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => match default_config_path() {
            Some(path) => (path, false),
            None => return Ok(SkillConfig::default()),
        },
    };

    if !required && !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(SkillConfig::default());
    }

    let data = fs::read_to_string(&path)?;
    let config = serde_json::from_str(&data)?;
    debug!(path = %path.display(), "loaded config");
    Ok(config)
}

pub fn save_config(path: Option<&Path>, config: &SkillConfig) -> Result<PathBuf, ConfigError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path().ok_or(ConfigError::StorageUnavailable)?,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(&path, json)?;
    Ok(path)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("storage directory unavailable")]
    StorageUnavailable,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serde(#[from] SerdeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "tradestart_mandatory": false,
                "trade_blacklist": [{ "tradeport": "GrimHEX" }],
                "llm": { "model": "local-model" }
            }"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert!(!config.tradestart_mandatory);
        assert!(config.summarize_routes_by_commodity);
        assert_eq!(config.default_location_count, 5);
        assert_eq!(config.trade_blacklist[0].tradeport, "GrimHEX");
        assert_eq!(config.trade_blacklist[0].commodity, None);
        assert_eq!(config.llm.model, "local-model");
        assert_eq!(config.llm.timeout_secs, 10);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let error = load_config(Some(&dir.path().join("nope.json"))).unwrap_err();
        assert!(matches!(error, ConfigError::Io(_)));
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = SkillConfig {
            default_route_count: 3,
            price_refresh_interval_secs: Some(600),
            ..SkillConfig::default()
        };

        let written = save_config(Some(&path), &config).unwrap();
        assert_eq!(written, path);
        assert_eq!(load_config(Some(&path)).unwrap(), config);
        assert_eq!(config.price_refresh_interval(), Some(Duration::from_secs(600)));
    }
}
