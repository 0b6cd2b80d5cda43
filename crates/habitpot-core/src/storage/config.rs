//! TOML-based application configuration.
//!
//! Stores:
//! - Sweeper cadence and whether sweeps raise reminders
//! - Wilt thresholds per frequency
//! - Default completion-history window
//! - Log filter used when `RUST_LOG` is unset
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;
use crate::habit::WiltThresholds;

/// Background sweeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_true")]
    pub emit_reminders: bool,
}

/// Inactivity thresholds, in hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    #[serde(default = "default_daily_hours")]
    pub daily_hours: u32,
    #[serde(default = "default_weekly_hours")]
    pub weekly_hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_days")]
    pub default_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default functions
fn default_interval_minutes() -> u64 {
    60
}
fn default_true() -> bool {
    true
}
fn default_daily_hours() -> u32 {
    20
}
fn default_weekly_hours() -> u32 {
    140
}
fn default_history_days() -> u32 {
    30
}
fn default_log_filter() -> String {
    "info".into()
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            emit_reminders: true,
        }
    }
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            daily_hours: default_daily_hours(),
            weekly_hours: default_weekly_hours(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_days: default_history_days(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl Config {
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
        if key.is_empty() {
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
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(format!("cannot parse '{value}' as bool: {e}")))?,
                    ),
                    serde_json::Value::Number(_) => serde_json::Value::Number(
                        value
                            .parse::<u64>()
                            .map_err(|e| invalid(format!("cannot parse '{value}' as number: {e}")))?
                            .into(),
                    ),
                    serde_json::Value::Object(_) => return Err(unknown()),
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.clone(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| save_failed(e.to_string()))?;
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

    /// Set a config value by key without persisting.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// or fails validation.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a config value by key and save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Reject values the sweeper cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("sweeper.interval_minutes", self.sweeper.interval_minutes),
            ("thresholds.daily_hours", u64::from(self.thresholds.daily_hours)),
            ("thresholds.weekly_hours", u64::from(self.thresholds.weekly_hours)),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".into(),
                });
            }
        }
        Ok(())
    }

    pub fn thresholds(&self) -> WiltThresholds {
        WiltThresholds {
            daily: Duration::hours(i64::from(self.thresholds.daily_hours)),
            weekly: Duration::hours(i64::from(self.thresholds.weekly_hours)),
        }
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweeper.interval_minutes.saturating_mul(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.sweeper.interval_minutes, 60);
        assert_eq!(parsed.thresholds.daily_hours, 20);
        assert_eq!(parsed.thresholds.weekly_hours, 140);
    }

    #[test]
    fn missing_sections_take_defaults() {
        let parsed: Config = toml::from_str("[sweeper]\nemit_reminders = false\n").unwrap();
        assert!(!parsed.sweeper.emit_reminders);
        assert_eq!(parsed.sweeper.interval_minutes, 60);
        assert_eq!(parsed.history.default_days, 30);
        assert_eq!(parsed.logging.filter, "info");
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("sweeper.emit_reminders").as_deref(), Some("true"));
        assert_eq!(cfg.get("thresholds.daily_hours").as_deref(), Some("20"));
        assert_eq!(cfg.get("logging.filter").as_deref(), Some("info"));
        assert!(cfg.get("sweeper.missing_key").is_none());
    }

    #[test]
    fn apply_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.apply("thresholds.daily_hours", "18").unwrap();
        cfg.apply("sweeper.emit_reminders", "false").unwrap();
        cfg.apply("logging.filter", "habitpot_core=debug").unwrap();

        assert_eq!(cfg.thresholds().daily, Duration::hours(18));
        assert!(!cfg.sweeper.emit_reminders);
        assert_eq!(cfg.logging.filter, "habitpot_core=debug");
    }

    #[test]
    fn apply_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.apply("sweeper.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(cfg.apply("sweeper", "1"), Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn apply_rejects_invalid_type() {
        let mut cfg = Config::default();
        assert!(cfg.apply("sweeper.emit_reminders", "sometimes").is_err());
        assert!(cfg.apply("thresholds.weekly_hours", "-3").is_err());
    }

    #[test]
    fn apply_rejects_zero_interval_and_keeps_old_value() {
        let mut cfg = Config::default();
        assert!(cfg.apply("sweeper.interval_minutes", "0").is_err());
        assert_eq!(cfg.sweeper.interval_minutes, 60);
    }

    #[test]
    fn sweep_interval_is_in_minutes() {
        let cfg = Config::default();
        assert_eq!(cfg.sweep_interval(), std::time::Duration::from_secs(3600));
    }
}
