use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transfer::driver::DriverSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// Milliseconds between two progress steps of one upload.
    pub tick_interval_ms: u64,
    pub min_step: f64,
    pub max_step: f64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            min_step: 5.0,
            max_step: 15.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Where the upload snapshot lives. Absent means the platform data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraySettings {
    /// How many completed uploads the "Recent Files" pane lists.
    pub recent_limit: usize,
}

impl Default for TraySettings {
    fn default() -> Self {
        Self { recent_limit: 8 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing` filter directive; `RUST_LOG` wins when set.
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub upload: UploadSettings,
    pub storage: StorageSettings,
    pub tray: TraySettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load from the default location. A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let upload = &self.upload;
        if upload.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("upload.tick_interval_ms must be positive".into()));
        }
        if !(upload.min_step.is_finite() && upload.min_step > 0.0) {
            return Err(ConfigError::Invalid("upload.min_step must be positive".into()));
        }
        if !(upload.max_step.is_finite() && upload.max_step >= upload.min_step) {
            return Err(ConfigError::Invalid(
                "upload.max_step must not be smaller than upload.min_step".into(),
            ));
        }
        Ok(())
    }

    pub fn driver(&self) -> DriverSettings {
        DriverSettings {
            tick_interval: Duration::from_millis(self.upload.tick_interval_ms),
            min_step: self.upload.min_step,
            max_step: self.upload.max_step,
        }
    }

    pub fn log_directory(&self) -> PathBuf {
        self.logging
            .directory
            .clone()
            .unwrap_or_else(|| data_dir().join("logs"))
    }
}

pub fn config_path() -> PathBuf {
    let base = std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    base.join(".config").join("dropdeck").join("settings.toml")
}

/// `<data_dir>/dropdeck`, or `./dropdeck` when the platform has none.
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dropdeck")
}
