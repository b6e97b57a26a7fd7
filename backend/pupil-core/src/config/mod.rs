pub mod sections;

pub use sections::{HostConfig, InterfaceConfig};

use crate::error::config::ConfigError;

use common::ErrorLocation;

use std::env;
use std::net::SocketAddr;
use std::panic::Location;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use url::Url;

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_DIR_NAME: &str = "pupil-interface";
const CONFIG_VERSION: u32 = 1;

pub const ENV_SUB_ADDRESS: &str = "PUPIL_SUB_ADDRESS";
pub const ENV_CONTROL_ADDRESS: &str = "PUPIL_CONTROL_ADDRESS";
pub const ENV_CONFIG_DIR: &str = "PUPIL_CONFIG_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PupilConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub interface: InterfaceConfig,

    #[serde(default)]
    pub host: HostConfig,
}

impl Default for PupilConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            interface: InterfaceConfig::default(),
            host: HostConfig::default(),
        }
    }
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

impl PupilConfig {
    /// Platform config directory, `PUPIL_CONFIG_DIR` taking precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoConfigDir`] if neither is available.
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        if let Ok(dir) = env::var(ENV_CONFIG_DIR) {
            return Ok(PathBuf::from(dir));
        }

        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME))
            .ok_or_else(|| ConfigError::NoConfigDir {
                location: ErrorLocation::from(Location::caller()),
            })
    }

    /// Read `.env`, load from the default directory, then apply environment
    /// overrides.
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }

        let mut config = Self::load(&Self::default_dir()?)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from {config_dir}/config.json.
    ///
    /// # Returns
    ///
    /// Returns defaults if the file is missing.
    /// Returns `Err(ConfigError)` if the file exists but is corrupted or invalid.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            info!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|e| {
            warn!("Failed to read config file: {e}");
            ConfigError::Read {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                source: e,
            }
        })?;

        let config: PupilConfig = serde_json::from_str(&contents).map_err(|e| {
            warn!("Failed to parse config JSON: {e}");
            ConfigError::Parse {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                reason: e.to_string(),
            }
        })?;

        config.validate()?;

        info!("Config loaded from {}", config_path.display());
        Ok(config)
    }

    /// Save config to {config_dir}/config.json using temp file + rename.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if validation, serialization, the write or the
    /// rename fails.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        std::fs::create_dir_all(config_dir).map_err(|e| ConfigError::Write {
            location: ErrorLocation::from(Location::caller()),
            path: config_dir.to_path_buf(),
            source: e,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let temp_path = config_dir.join(format!("{CONFIG_FILE_NAME}.tmp"));

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        std::fs::write(&temp_path, json).map_err(|e| ConfigError::Write {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&temp_path, &config_path).map_err(|e| ConfigError::Write {
            location: ErrorLocation::from(Location::caller()),
            path: config_path.clone(),
            source: e,
        })?;

        info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Replace endpoint addresses with `PUPIL_SUB_ADDRESS` and
    /// `PUPIL_CONTROL_ADDRESS` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(address) = env::var(ENV_SUB_ADDRESS) {
            debug!("{ENV_SUB_ADDRESS} override: {address}");
            self.interface.sub_address = address;
        }
        if let Ok(address) = env::var(ENV_CONTROL_ADDRESS) {
            debug!("{ENV_CONTROL_ADDRESS} override: {address}");
            self.interface.control_address = address;
        }
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version == 0 || self.version > CONFIG_VERSION {
            return Err(validation_error(format!(
                "Invalid version: {} (expected 1-{CONFIG_VERSION})",
                self.version
            )));
        }

        validate_ws_url("interface.sub_address", &self.interface.sub_address)?;
        validate_ws_url("interface.control_address", &self.interface.control_address)?;

        if self.interface.recording_source.trim().is_empty() {
            return Err(validation_error(
                "interface.recording_source cannot be empty".to_string(),
            ));
        }
        if self.interface.close_timeout_ms == 0 {
            return Err(validation_error(
                "interface.close_timeout_ms must be positive".to_string(),
            ));
        }
        if self.interface.reconnect_max_interval_ms == 0 {
            return Err(validation_error(
                "interface.reconnect_max_interval_ms must be positive".to_string(),
            ));
        }

        validate_bind("host.feed_bind", &self.host.feed_bind)?;
        validate_bind("host.control_bind", &self.host.control_bind)?;

        if self.host.identity.trim().is_empty() {
            return Err(validation_error("host.identity cannot be empty".to_string()));
        }
        if self.host.bus_capacity == 0 {
            return Err(validation_error(
                "host.bus_capacity must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[track_caller]
fn validation_error(reason: String) -> ConfigError {
    ConfigError::Validation {
        location: ErrorLocation::from(Location::caller()),
        reason,
    }
}

fn validate_ws_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| validation_error(format!("Invalid URL in {field}: {value} ({e})")))?;

    match url.scheme() {
        "ws" | "wss" => Ok(()),
        scheme => Err(validation_error(format!(
            "Invalid scheme in {field}: {scheme} (expected ws or wss)"
        ))),
    }
}

fn validate_bind(field: &str, value: &str) -> Result<(), ConfigError> {
    value
        .parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|e| validation_error(format!("Invalid bind address in {field}: {value} ({e})")))
}
