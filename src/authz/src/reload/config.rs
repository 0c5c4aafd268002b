//! Hot reload configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Manager log threshold, ordered from most to least verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Whether a message at `level` passes this threshold
    pub fn allows(self, level: LogLevel) -> bool {
        level >= self
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        })
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(anyhow::anyhow!("unknown log level '{}'", other)),
        }
    }
}

/// Hot reload manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HotReloadConfig {
    /// Subscribe to store changes on `start`
    pub enabled: bool,

    /// Quiet period after the last change before reloading
    pub debounce_ms: u64,

    /// Upper bound between the first change of a burst and its reload
    pub max_debounce_ms: u64,

    /// Validate fetched policies before publishing them
    pub validate_before_load: bool,

    /// Re-publish the last good policy set after a failed reload
    pub rollback_on_failure: bool,

    pub log_level: LogLevel,
}

impl Default for HotReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 500,
            max_debounce_ms: 5_000,
            validate_before_load: true,
            rollback_on_failure: true,
            log_level: LogLevel::Info,
        }
    }
}

impl HotReloadConfig {
    /// Defaults overridden by `AUTHZ_RELOAD_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("AUTHZ_RELOAD_ENABLED") {
            config.enabled = parse_bool(&v).context("Invalid AUTHZ_RELOAD_ENABLED")?;
        }
        if let Some(v) = lookup("AUTHZ_RELOAD_DEBOUNCE_MS") {
            config.debounce_ms = v.trim().parse().context("Invalid AUTHZ_RELOAD_DEBOUNCE_MS")?;
        }
        if let Some(v) = lookup("AUTHZ_RELOAD_MAX_DEBOUNCE_MS") {
            config.max_debounce_ms = v
                .trim()
                .parse()
                .context("Invalid AUTHZ_RELOAD_MAX_DEBOUNCE_MS")?;
        }
        if let Some(v) = lookup("AUTHZ_RELOAD_VALIDATE") {
            config.validate_before_load = parse_bool(&v).context("Invalid AUTHZ_RELOAD_VALIDATE")?;
        }
        if let Some(v) = lookup("AUTHZ_RELOAD_ROLLBACK") {
            config.rollback_on_failure = parse_bool(&v).context("Invalid AUTHZ_RELOAD_ROLLBACK")?;
        }
        if let Some(v) = lookup("AUTHZ_RELOAD_LOG_LEVEL") {
            config.log_level = v.parse().context("Invalid AUTHZ_RELOAD_LOG_LEVEL")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject timer settings the debouncer cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.debounce_ms == 0 {
            anyhow::bail!("debounceMs must be greater than zero");
        }
        if self.max_debounce_ms < self.debounce_ms {
            anyhow::bail!(
                "maxDebounceMs ({}) must not be less than debounceMs ({})",
                self.max_debounce_ms,
                self.debounce_ms
            );
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn max_debounce(&self) -> Duration {
        Duration::from_millis(self.max_debounce_ms)
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow::anyhow!("expected a boolean, got '{}'", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HotReloadConfig::default();
        assert!(config.enabled);
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert_eq!(config.max_debounce(), Duration::from_millis(5_000));
        assert!(config.validate_before_load);
        assert!(config.rollback_on_failure);
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial_camel_case() {
        let config: HotReloadConfig =
            serde_json::from_value(json!({"debounceMs": 100, "logLevel": "debug"})).unwrap();
        assert_eq!(config.debounce_ms, 100);
        assert_eq!(config.max_debounce_ms, 5_000);
        assert_eq!(config.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = HotReloadConfig::from_lookup(lookup(&[
            ("AUTHZ_RELOAD_ENABLED", "false"),
            ("AUTHZ_RELOAD_DEBOUNCE_MS", "250"),
            ("AUTHZ_RELOAD_MAX_DEBOUNCE_MS", "1000"),
            ("AUTHZ_RELOAD_ROLLBACK", "0"),
            ("AUTHZ_RELOAD_LOG_LEVEL", "WARN"),
        ]))
        .unwrap();

        assert!(!config.enabled);
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.max_debounce_ms, 1_000);
        assert!(config.validate_before_load);
        assert!(!config.rollback_on_failure);
        assert_eq!(config.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_from_lookup_reports_bad_values() {
        let err = HotReloadConfig::from_lookup(lookup(&[("AUTHZ_RELOAD_DEBOUNCE_MS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("AUTHZ_RELOAD_DEBOUNCE_MS"));

        assert!(HotReloadConfig::from_lookup(lookup(&[("AUTHZ_RELOAD_VALIDATE", "maybe")])).is_err());
        assert!(HotReloadConfig::from_lookup(lookup(&[("AUTHZ_RELOAD_LOG_LEVEL", "loud")])).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_timers() {
        let zero = HotReloadConfig {
            debounce_ms: 0,
            ..HotReloadConfig::default()
        };
        assert!(zero.validate().is_err());

        let inverted = HotReloadConfig {
            debounce_ms: 1_000,
            max_debounce_ms: 500,
            ..HotReloadConfig::default()
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert!(LogLevel::Info.allows(LogLevel::Warn));
        assert!(!LogLevel::Warn.allows(LogLevel::Info));
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
    }
}
