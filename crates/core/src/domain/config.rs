//! Configuration management for Sigscope
//!
//! This module provides:
//! - Configuration structs for the terminal app, backend connection, and analyser
//! - TOML serialization with validation
//! - A config manager that falls back to defaults on missing or corrupt files

use crate::domain::analysis::AnalysisConfig;
use crate::domain::backend::Transport;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Redraw interval of the terminal UI in milliseconds
    pub frame_interval_ms: u64,

    /// Points per series on downsampled time-domain charts
    pub stem_target_points: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
            stem_target_points: 50,
        }
    }
}

/// Processing backend connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,

    /// Whole-request timeout; processing long clips takes a while
    pub request_timeout_secs: u64,

    pub transport: Transport,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            request_timeout_secs: 120,
            transport: Transport::Single,
        }
    }
}

/// Complete Sigscope configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigscopeConfig {
    pub app: AppConfig,
    pub backend: BackendConfig,
    pub analysis: AnalysisConfig,
}

impl SigscopeConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = self.to_toml()?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the app cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.app.frame_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "app.frame_interval_ms must be positive".to_string(),
            ));
        }
        if self.app.stem_target_points == 0 {
            return Err(ConfigError::Invalid(
                "app.stem_target_points must be positive".to_string(),
            ));
        }

        let url = self.backend.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "backend.base_url '{}' must be an http(s) URL",
                self.backend.base_url
            )));
        }
        if self.backend.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "backend.request_timeout_secs must be positive".to_string(),
            ));
        }

        self.analysis
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Configuration manager for the main Sigscope config
///
/// Manages the configuration file at `~/.config/sigscope/config.toml`.
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");
        Self {
            config_dir,
            config_path,
        }
    }

    /// Manager for an explicit config file path
    pub fn for_file(config_path: PathBuf) -> Self {
        let config_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            config_dir,
            config_path,
        }
    }

    /// Get the default config directory path
    ///
    /// Returns `~/.config/sigscope` on Linux, the platform equivalent elsewhere.
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("sigscope"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// A missing file yields the defaults. A corrupt or invalid file is
    /// logged, backed up next to the original, and replaced by the defaults.
    #[instrument(skip(self))]
    pub async fn load(&self) -> SigscopeConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, using defaults"
            );
            return SigscopeConfig::default();
        }

        match SigscopeConfig::load_from_file(&self.config_path).await {
            Ok(config) => {
                info!(
                    path = %self.config_path.display(),
                    "Configuration loaded successfully"
                );
                config
            }
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using defaults"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                SigscopeConfig::default()
            }
        }
    }

    /// Save configuration to file
    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &SigscopeConfig) -> Result<()> {
        config.validate()?;
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_serialization() {
        let config = SigscopeConfig::default();

        let toml_str = config.to_toml().unwrap();
        let parsed: SigscopeConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, parsed);
        assert!(toml_str.contains("transport = \"single\""));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: SigscopeConfig = toml::from_str(
            r#"
            [backend]
            transport = "streaming"

            [analysis]
            fft_size = 4096
            "#,
        )
        .unwrap();

        assert_eq!(parsed.backend.transport, Transport::Streaming);
        assert_eq!(parsed.backend.base_url, "http://localhost:5000");
        assert_eq!(parsed.analysis.fft_size, 4096);
        assert_eq!(parsed.analysis.smoothing_time_constant, 0.5);
        assert_eq!(parsed.app.stem_target_points, 50);
    }

    #[test]
    fn test_validation() {
        assert!(SigscopeConfig::default().validate().is_ok());

        let mut config = SigscopeConfig::default();
        config.backend.base_url = "localhost:5000".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = SigscopeConfig::default();
        config.analysis.fft_size = 3000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = SigscopeConfig::default();
        config.app.frame_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut config = SigscopeConfig::default();
        config.backend.request_timeout_secs = 30;
        config.save_to_file(&config_path).await.unwrap();

        assert!(config_path.exists());

        let loaded = SigscopeConfig::load_from_file(&config_path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_manager_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::new(temp_dir.path().to_path_buf());

        assert!(!manager.exists());
        assert_eq!(manager.load().await, SigscopeConfig::default());
        // Loading never writes
        assert!(!manager.exists());
    }

    #[tokio::test]
    async fn test_manager_corrupt_file_backed_up() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::new(temp_dir.path().to_path_buf());
        fs::write(manager.config_path(), "[app\nframe_interval_ms = ")
            .await
            .unwrap();

        assert_eq!(manager.load().await, SigscopeConfig::default());
        assert!(temp_dir.path().join("config.toml.corrupt").exists());
    }

    #[tokio::test]
    async fn test_manager_save_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::for_file(temp_dir.path().join("sigscope.toml"));

        let mut config = SigscopeConfig::default();
        config.app.stem_target_points = 80;
        manager.save(&config).await.unwrap();

        assert_eq!(manager.load().await.app.stem_target_points, 80);
    }
}
