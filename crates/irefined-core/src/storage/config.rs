//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Which automation features are enabled
//! - Queue activation window and stale-intent expiry
//! - Auto-join inclusion policy
//! - Auto-forfeit countdown
//!
//! Configuration is stored at `~/.config/irefined/config.toml`. It is read
//! once when the engine starts; edits take effect on the next start.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::queue::DEFAULT_ACTIVATION_WINDOW_SECS;

/// Feature toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_true")]
    pub auto_register: bool,
    #[serde(default)]
    pub auto_join: bool,
    #[serde(default)]
    pub auto_forfeit: bool,
}

/// Queue engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_activation_window_secs")]
    pub activation_window_secs: u64,
    /// `0` keeps unmatched intents until removed by hand.
    #[serde(default = "default_expire_unmatched_after_secs")]
    pub expire_unmatched_after_secs: u64,
}

/// Which joinable sessions auto-join clicks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    /// Scored race sessions only.
    Race,
    /// Anything joinable.
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoJoinConfig {
    #[serde(default = "default_join_type")]
    pub join_type: JoinType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoForfeitConfig {
    #[serde(default = "default_forfeit_minutes")]
    pub minutes: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/irefined/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub auto_join: AutoJoinConfig,
    #[serde(default)]
    pub auto_forfeit: AutoForfeitConfig,
}

// Default functions
fn default_true() -> bool {
    true
}
fn default_activation_window_secs() -> u64 {
    DEFAULT_ACTIVATION_WINDOW_SECS as u64
}
fn default_expire_unmatched_after_secs() -> u64 {
    600
}
fn default_join_type() -> JoinType {
    JoinType::Race
}
fn default_forfeit_minutes() -> u64 {
    13
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            auto_register: true,
            auto_join: false,
            auto_forfeit: false,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            activation_window_secs: default_activation_window_secs(),
            expire_unmatched_after_secs: default_expire_unmatched_after_secs(),
        }
    }
}

impl Default for AutoJoinConfig {
    fn default() -> Self {
        Self {
            join_type: default_join_type(),
        }
    }
}

impl Default for AutoForfeitConfig {
    fn default() -> Self {
        Self {
            minutes: default_forfeit_minutes(),
        }
    }
}

/// `secs` as a chrono duration, `None` when it does not fit.
fn try_seconds(secs: u64) -> Option<Duration> {
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}

fn checked_seconds(key: &str, secs: u64) -> Result<Duration, ConfigError> {
    try_seconds(secs).ok_or_else(|| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{secs} seconds is out of range"),
    })
}

impl QueueConfig {
    /// Saturates at [`Duration::MAX`] for values `validate` would reject.
    pub fn activation_window(&self) -> Duration {
        try_seconds(self.activation_window_secs).unwrap_or(Duration::MAX)
    }

    pub fn expire_unmatched_after(&self) -> Option<Duration> {
        match self.expire_unmatched_after_secs {
            0 => None,
            secs => Some(try_seconds(secs).unwrap_or(Duration::MAX)),
        }
    }
}

impl AutoForfeitConfig {
    pub fn countdown(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.minutes.saturating_mul(60))
    }
}

impl Config {
    /// Every dotted key `get` and `set` accept.
    pub const KEYS: &'static [&'static str] = &[
        "features.auto_register",
        "features.auto_join",
        "features.auto_forfeit",
        "queue.activation_window_secs",
        "queue.expire_unmatched_after_secs",
        "auto_join.join_type",
        "auto_forfeit.minutes",
    ];

    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/irefined"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from the default location, writing defaults if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing defaults there if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or the defaults cannot be
    /// written.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Persist to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to an explicit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Reject values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the offending key for a
    /// zero window or countdown, or any duration chrono cannot represent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.activation_window_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "queue.activation_window_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        checked_seconds("queue.activation_window_secs", self.queue.activation_window_secs)?;
        checked_seconds(
            "queue.expire_unmatched_after_secs",
            self.queue.expire_unmatched_after_secs,
        )?;

        if self.auto_forfeit.minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "auto_forfeit.minutes".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        let forfeit_secs =
            self.auto_forfeit
                .minutes
                .checked_mul(60)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "auto_forfeit.minutes".to_string(),
                    message: format!("{} minutes is out of range", self.auto_forfeit.minutes),
                })?;
        checked_seconds("auto_forfeit.minutes", forfeit_secs)?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key in memory, validating the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}
