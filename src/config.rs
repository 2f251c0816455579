use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cloud::{CloudOptions, DatabaseScope};
use crate::session::StoreOptions;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

fn default_container_id() -> String {
    "fieldwork.main".to_string()
}

fn default_poll_secs() -> u64 {
    60
}

/// Cloud container configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Enable background push and pull (default: false)
    #[serde(default)]
    pub enabled: bool,
    /// Server URL (e.g., "https://cloud.example.com")
    pub server_url: Option<String>,
    /// API key for authentication
    pub api_key: Option<String>,
    #[serde(default = "default_container_id")]
    pub container_id: String,
    #[serde(default)]
    pub scope: DatabaseScope,
    /// Seconds between pull polls (default: 60)
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        CloudConfig {
            enabled: false,
            server_url: None,
            api_key: None,
            container_id: default_container_id(),
            scope: DatabaseScope::default(),
            poll_secs: default_poll_secs(),
        }
    }
}

impl CloudConfig {
    /// Returns true if sync can run (enabled and has a server_url)
    pub fn is_configured(&self) -> bool {
        self.enabled && self.server_url.is_some()
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: ConfigValue<PathBuf>,
    /// Quiet seconds after an edit before saving
    pub save_debounce_secs: ConfigValue<u64>,
    /// Maximum seconds between saves while edits keep arriving
    pub save_interval_secs: ConfigValue<u64>,
    /// Tradesmen directory URL, if the roster should be imported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory_url: Option<String>,
    /// API key for the directory, if it requires one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory_api_key: Option<String>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Cloud container configuration
    pub cloud: CloudConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    save_debounce_secs: Option<u64>,
    save_interval_secs: Option<u64>,
    directory_url: Option<String>,
    directory_api_key: Option<String>,
    cloud: Option<CloudConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let default_db_path = Self::default_data_dir().join("fieldwork.db");

        // Start with defaults
        let mut database_path = ConfigValue::new(default_db_path, ConfigSource::Default);
        let mut save_debounce_secs = ConfigValue::new(5, ConfigSource::Default);
        let mut save_interval_secs = ConfigValue::new(30, ConfigSource::Default);
        let mut directory_url = None;
        let mut directory_api_key = None;
        let mut config_file = None;
        let mut cloud = CloudConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                // Resolve relative paths against config file's directory
                let resolved_path = if db_path.is_relative() {
                    path.parent().map(|p| p.join(&db_path)).unwrap_or(db_path)
                } else {
                    db_path
                };
                database_path = ConfigValue::new(resolved_path, ConfigSource::File);
            }
            if let Some(secs) = file_config.save_debounce_secs {
                save_debounce_secs = ConfigValue::new(secs, ConfigSource::File);
            }
            if let Some(secs) = file_config.save_interval_secs {
                save_interval_secs = ConfigValue::new(secs, ConfigSource::File);
            }
            if let Some(url) = file_config.directory_url {
                directory_url = Some(url);
            }
            if let Some(key) = file_config.directory_api_key {
                directory_api_key = Some(key);
            }
            if let Some(cloud_config) = file_config.cloud {
                cloud = cloud_config;
            }
        }

        // Apply environment variable overrides
        if let Ok(db_path) = std::env::var("FIELDWORK_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Ok(secs) = std::env::var("FIELDWORK_SAVE_DEBOUNCE_SECS") {
            if let Ok(secs) = secs.parse() {
                save_debounce_secs = ConfigValue::new(secs, ConfigSource::Environment);
            }
        }
        if let Ok(secs) = std::env::var("FIELDWORK_SAVE_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse() {
                save_interval_secs = ConfigValue::new(secs, ConfigSource::Environment);
            }
        }
        if let Ok(url) = std::env::var("FIELDWORK_DIRECTORY_URL") {
            directory_url = Some(url);
        }
        if let Ok(key) = std::env::var("FIELDWORK_DIRECTORY_API_KEY") {
            directory_api_key = Some(key);
        }
        if let Ok(enabled) = std::env::var("FIELDWORK_CLOUD_ENABLED") {
            cloud.enabled = enabled == "1" || enabled.eq_ignore_ascii_case("true");
        }
        if let Ok(url) = std::env::var("FIELDWORK_CLOUD_URL") {
            cloud.server_url = Some(url);
        }
        if let Ok(key) = std::env::var("FIELDWORK_CLOUD_API_KEY") {
            cloud.api_key = Some(key);
        }

        Ok(Self {
            database_path,
            save_debounce_secs,
            save_interval_secs,
            directory_url,
            directory_api_key,
            config_file,
            cloud,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/fieldwork/
    /// - macOS: ~/Library/Application Support/fieldwork/
    /// - Windows: %APPDATA%/fieldwork/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fieldwork")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/fieldwork/
    /// - macOS: ~/Library/Application Support/fieldwork/
    /// - Windows: %APPDATA%/fieldwork/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fieldwork")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }

    /// Session tuning derived from this configuration.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            database_path: Some(self.database_path.value.clone()),
            save_debounce: Duration::from_secs(self.save_debounce_secs.value),
            save_interval: Duration::from_secs(self.save_interval_secs.value),
            cloud_poll_interval: Duration::from_secs(self.cloud.poll_secs),
        }
    }

    /// Container connection settings, when sync is configured.
    pub fn cloud_options(&self) -> Option<CloudOptions> {
        if !self.cloud.is_configured() {
            return None;
        }
        Some(CloudOptions {
            server_url: self.cloud.server_url.clone()?,
            container_id: self.cloud.container_id.clone(),
            scope: self.cloud.scope,
            api_key: self.cloud.api_key.clone(),
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load(Some(config_path)).unwrap();
        assert!(config
            .database_path
            .value
            .to_string_lossy()
            .contains("fieldwork.db"));
        assert_eq!(config.database_path.source, ConfigSource::Default);
        assert_eq!(config.save_debounce_secs.value, 5);
        assert_eq!(config.save_interval_secs.value, 30);
        assert!(!config.cloud.enabled);
        assert_eq!(config.cloud.poll_secs, 60);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "database_path: /custom/path/db.sqlite").unwrap();
        writeln!(file, "save_debounce_secs: 2").unwrap();
        writeln!(file, "directory_url: https://directory.example.com").unwrap();
        writeln!(file, "cloud:").unwrap();
        writeln!(file, "  enabled: true").unwrap();
        writeln!(file, "  server_url: https://cloud.example.com").unwrap();
        writeln!(file, "  scope: shared").unwrap();

        let config = Config::load(Some(config_path.clone())).unwrap();
        assert_eq!(
            config.database_path.value,
            PathBuf::from("/custom/path/db.sqlite")
        );
        assert_eq!(config.database_path.source, ConfigSource::File);
        assert_eq!(config.save_debounce_secs.value, 2);
        assert_eq!(config.save_interval_secs.source, ConfigSource::Default);
        assert_eq!(
            config.directory_url.as_deref(),
            Some("https://directory.example.com")
        );
        assert!(config.cloud.is_configured());
        assert_eq!(config.cloud.scope, DatabaseScope::Shared);
        assert_eq!(config.cloud.container_id, "fieldwork.main");
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    #[ignore] // Run with --ignored; env vars can pollute parallel tests
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "save_debounce_secs: 9").unwrap();

        std::env::set_var("FIELDWORK_SAVE_DEBOUNCE_SECS", "3");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.save_debounce_secs.value, 3);
        assert_eq!(config.save_debounce_secs.source, ConfigSource::Environment);

        std::env::remove_var("FIELDWORK_SAVE_DEBOUNCE_SECS");
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(Some(config_path));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_cloud_options_requires_enabled_and_url() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "cloud:").unwrap();
        writeln!(file, "  server_url: https://cloud.example.com").unwrap();

        // Not enabled, so no options even though a URL is present.
        let config = Config::load(Some(config_path)).unwrap();
        assert!(config.cloud_options().is_none());
    }

    #[test]
    fn test_store_options_carry_timers() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "save_debounce_secs: 2").unwrap();
        writeln!(file, "save_interval_secs: 12").unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        let options = config.store_options();
        assert_eq!(options.save_debounce, Duration::from_secs(2));
        assert_eq!(options.save_interval, Duration::from_secs(12));
    }
}
