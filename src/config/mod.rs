//! Configuration file for socscope
//!
//! One TOML file holds the parameters of both targets plus capture, export
//! and runner settings. Every section is optional; missing keys take their
//! defaults.
//!
//! # Location
//!
//! `$SOCSCOPE_CONFIG` if set, otherwise the platform config directory:
//! - **Linux**: `~/.config/dev.socscope/socscope.toml`
//! - **macOS**: `~/Library/Application Support/dev.socscope/socscope.toml`
//! - **Windows**: `%APPDATA%\dev.socscope\socscope.toml`
//!
//! # Example
//!
//! ```toml
//! [edid_debug]
//! baud = 115200
//! capture_depth = 32768
//!
//! [[capture.triggers]]
//! kind = "match"
//! signal = "uart_sel"
//! value = "0x1"
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, SocError};
use crate::targets::{EdidDebugConfig, Hdmi2EthConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for the config directory
pub const APP_ID: &str = "dev.socscope";

pub const CONFIG_FILE: &str = "socscope.toml";

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "SOCSCOPE_CONFIG";

pub const CONFIG_VERSION: u32 = 1;

/// Default config file path
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocConfig {
    /// Version for future migration support
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub edid_debug: EdidDebugConfig,

    #[serde(default)]
    pub hdmi2eth: Hdmi2EthConfig,

    #[serde(default)]
    pub capture: CaptureSettings,

    #[serde(default)]
    pub export: ExportSettings,

    #[serde(default)]
    pub runtime: RuntimeSettings,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

impl Default for SocConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            edid_debug: EdidDebugConfig::default(),
            hdmi2eth: Hdmi2EthConfig::default(),
            capture: CaptureSettings::default(),
            export: ExportSettings::default(),
            runtime: RuntimeSettings::default(),
        }
    }
}

impl SocConfig {
    /// Parse a config from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| SocError::Config(format!("Failed to parse config: {}", e)))?;
        if config.version > CONFIG_VERSION {
            tracing::warn!(
                "Config version {} is newer than supported version {}",
                config.version,
                CONFIG_VERSION
            );
        }
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SocError::Serialization(format!("Failed to serialize config: {}", e)))
    }

    /// Load a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SocError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&text)
    }

    /// Load `path`, or the default location when `None`. A missing file
    /// yields defaults; a malformed one is reported and replaced by defaults.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path.map(Path::to_path_buf).or_else(config_path) else {
            tracing::warn!("Could not determine config path, using defaults");
            return Self::default();
        };
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save to `path`, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SocError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }
        let text = self.to_toml()?;
        std::fs::write(path, text).map_err(|e| {
            SocError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })?;
        tracing::info!("Config written to {:?}", path);
        Ok(())
    }
}
