//! # Configuration
//!
//! TOML configuration for the heroledger binary and for embedders that want
//! the same defaults.
//!
//! - [`GameConfig`] - game version stamped into saves, experience per training
//! - [`ProgressionConfig`] - the leveling curve for new profiles
//! - [`StorageConfig`] - data directory and profile record key
//! - [`LoggingConfig`] - log level and files
//! - [`SecurityConfig`] - optional Argon2 cost parameters
//!
//! ```toml
//! [game]
//! version = "0.3.2"
//! exp_per_train = 10
//!
//! [progression]
//! base_exp_required = 100
//! exp_multiplier = 1.5
//! points_per_level = 3
//!
//! [storage]
//! data_dir = "./data"
//! profile_key = "player_profile"
//!
//! [logging]
//! level = "info"
//! file = "heroledger.log"
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

use crate::progression::{
    LevelTuning, ProfileCodec, DEFAULT_BASE_EXP_REQUIRED, DEFAULT_EXP_MULTIPLIER,
    DEFAULT_POINTS_PER_LEVEL,
};
use crate::session::DEFAULT_EXP_PER_TRAIN;
use crate::storage::DEFAULT_RECORD_KEY;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub progression: ProgressionConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub security: Option<SecurityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Written into every save; a different stored value is reported on load.
    #[serde(default = "default_game_version")]
    pub version: String,
    #[serde(default = "default_exp_per_train")]
    pub exp_per_train: u32,
}

fn default_game_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_exp_per_train() -> u32 {
    DEFAULT_EXP_PER_TRAIN
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            version: default_game_version(),
            exp_per_train: default_exp_per_train(),
        }
    }
}

/// Curve for new profiles, and the fallback when a stored curve is unusable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressionConfig {
    pub base_exp_required: u32,
    pub exp_multiplier: f64,
    pub points_per_level: u32,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            base_exp_required: DEFAULT_BASE_EXP_REQUIRED,
            exp_multiplier: DEFAULT_EXP_MULTIPLIER,
            points_per_level: DEFAULT_POINTS_PER_LEVEL,
        }
    }
}

impl ProgressionConfig {
    pub fn tuning(&self) -> Result<LevelTuning> {
        LevelTuning::new(
            self.base_exp_required,
            self.exp_multiplier,
            self.points_per_level,
        )
        .map_err(|e| anyhow!("Invalid [progression] section: {}", e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    #[serde(default = "default_profile_key")]
    pub profile_key: String,
}

fn default_profile_key() -> String {
    DEFAULT_RECORD_KEY.to_string()
}

impl StorageConfig {
    pub fn profiles_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("profiles")
    }

    pub fn accounts_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    /// Separate file for `security` target records (failed logins).
    #[serde(default)]
    pub security_file: Option<String>,
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Option<log::LevelFilter> {
        self.level.parse().ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Argon2Config {
    #[serde(default)]
    pub memory_kib: Option<u32>,
    #[serde(default)]
    pub time_cost: Option<u32>,
    #[serde(default)]
    pub parallelism: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    #[serde(default)]
    pub argon2: Option<Argon2Config>,
}

impl Config {
    /// Load configuration from file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;
        config.validate()?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.progression.tuning()?;
        if self.game.version.trim().is_empty() {
            return Err(anyhow!("[game] version must not be empty"));
        }
        if self.storage.data_dir.trim().is_empty() {
            return Err(anyhow!("[storage] data_dir must not be empty"));
        }
        if self.storage.profile_key.is_empty() || self.storage.profile_key.contains(':') {
            return Err(anyhow!(
                "[storage] profile_key '{}' must be non-empty and contain no ':'",
                self.storage.profile_key
            ));
        }
        if self.logging.level_filter().is_none() {
            return Err(anyhow!(
                "[logging] level '{}' is not one of off, error, warn, info, debug, trace",
                self.logging.level
            ));
        }
        Ok(())
    }

    pub fn codec(&self) -> Result<ProfileCodec> {
        Ok(ProfileCodec::new(
            self.game.version.clone(),
            self.progression.tuning()?,
        ))
    }

    /// Argon2 parameters from `[security.argon2]`, unset fields taking library defaults.
    pub fn argon2_params(&self) -> Option<argon2::Params> {
        let a = self.security.as_ref()?.argon2.as_ref()?;
        let defaults = argon2::Params::DEFAULT;
        let mem = a.memory_kib.unwrap_or(defaults.m_cost());
        let time = a.time_cost.unwrap_or(defaults.t_cost());
        let para = a.parallelism.unwrap_or(defaults.p_cost());
        argon2::Params::new(mem, time, para, None).ok()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            game: GameConfig::default(),
            progression: ProgressionConfig::default(),
            storage: StorageConfig {
                data_dir: "./data".to_string(),
                profile_key: default_profile_key(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("heroledger.log".to_string()),
                security_file: None,
            },
            security: Some(SecurityConfig::default()),
        }
    }
}
