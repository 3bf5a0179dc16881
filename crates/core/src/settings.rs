// Runtime settings with JSON file persistence.

use crate::error::{QueueError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_MAX_RETRIES: i64 = 3;
const DEFAULT_BACKOFF_BASE: f64 = 2.0;
const DEFAULT_POLL_INTERVAL_SECS: f64 = 1.0;
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 300;

const DEFAULT_CONFIG_PATH: &str = "~/.taskbelt/config.json";
const DEFAULT_DB_PATH: &str = "~/.taskbelt/queue.db";

/// Queue-wide configuration.
///
/// Loaded once at startup; workers snapshot it and never observe later
/// changes. `config set` writes through to the JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_retries: i64,
    pub backoff_base: f64,
    pub db_path: String,
    pub worker_poll_interval: f64,
    pub job_timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            db_path: shellexpand::tilde(DEFAULT_DB_PATH).into_owned(),
            worker_poll_interval: DEFAULT_POLL_INTERVAL_SECS,
            job_timeout: DEFAULT_JOB_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// All keys accepted by `get`/`set`, in display order.
    pub const KEYS: [&'static str; 5] = [
        "max_retries",
        "backoff_base",
        "db_path",
        "worker_poll_interval",
        "job_timeout",
    ];

    pub fn config_path() -> PathBuf {
        shellexpand::tilde(DEFAULT_CONFIG_PATH).into_owned().into()
    }

    /// Load from the default config file, falling back to defaults when
    /// the file is missing or unreadable.
    pub fn load() -> Self {
        Self::load_from(Self::config_path())
    }

    pub fn load_from(path: impl AsRef<Path>) -> Self {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(Self::config_path())
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<String> {
        match key {
            "max_retries" => Ok(self.max_retries.to_string()),
            "backoff_base" => Ok(self.backoff_base.to_string()),
            "db_path" => Ok(self.db_path.clone()),
            "worker_poll_interval" => Ok(self.worker_poll_interval.to_string()),
            "job_timeout" => Ok(self.job_timeout.to_string()),
            other => Err(QueueError::Config(format!("unknown configuration key: {other}"))),
        }
    }

    /// Set a key from its string form, with per-key typed parsing.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "max_retries" => self.max_retries = parse_positive_int(key, value)?,
            "backoff_base" => self.backoff_base = parse_positive_float(key, value)?,
            "db_path" => self.db_path = shellexpand::tilde(value).into_owned(),
            "worker_poll_interval" => self.worker_poll_interval = parse_positive_float(key, value)?,
            "job_timeout" => {
                self.job_timeout = parse_positive_int(key, value)? as u64;
            }
            other => {
                return Err(QueueError::Config(format!("unknown configuration key: {other}")));
            }
        }
        Ok(())
    }
}

fn parse_positive_int(key: &str, value: &str) -> Result<i64> {
    let parsed: i64 = value
        .parse()
        .map_err(|_| QueueError::Config(format!("{key} must be an integer, got '{value}'")))?;
    if parsed < 1 {
        return Err(QueueError::Config(format!("{key} must be positive, got {parsed}")));
    }
    Ok(parsed)
}

fn parse_positive_float(key: &str, value: &str) -> Result<f64> {
    let parsed: f64 = value
        .parse()
        .map_err(|_| QueueError::Config(format!("{key} must be a number, got '{value}'")))?;
    if !parsed.is_finite() || parsed <= 0.0 {
        return Err(QueueError::Config(format!("{key} must be positive, got {parsed}")));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.backoff_base, 2.0);
        assert_eq!(settings.worker_poll_interval, 1.0);
        assert_eq!(settings.job_timeout, 300);
        assert!(settings.db_path.ends_with("queue.db"));
    }

    #[test]
    fn test_set_and_get() {
        let mut settings = Settings::default();
        settings.set("max_retries", "5").unwrap();
        assert_eq!(settings.get("max_retries").unwrap(), "5");

        settings.set("backoff_base", "1.5").unwrap();
        assert_eq!(settings.backoff_base, 1.5);

        assert!(settings.set("max_retries", "zero").is_err());
        assert!(settings.set("max_retries", "0").is_err());
        assert!(settings.set("warp_factor", "9").is_err());
        assert!(settings.get("warp_factor").is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!("taskbelt-settings-{}.json", std::process::id()));
        let mut settings = Settings::default();
        settings.set("job_timeout", "60").unwrap();
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path);
        assert_eq!(loaded, settings);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let loaded = Settings::load_from("/nonexistent/taskbelt/config.json");
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_missing_keys() {
        let path = std::env::temp_dir().join(format!("taskbelt-partial-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"max_retries": 7}"#).unwrap();

        let loaded = Settings::load_from(&path);
        assert_eq!(loaded.max_retries, 7);
        assert_eq!(loaded.backoff_base, 2.0);
        std::fs::remove_file(&path).ok();
    }
}
