//! Coordinator configuration.
//!
//! ## Environment Variables
//!
//! - `LABMESH_DATA_DIR`: directory of the persisted documents (default `./labmesh-data`)
//! - `LABMESH_RESCAN_ON_REGISTRATION`: re-scan approved requests when a resource
//!   registers or comes online (default `true`)
//! - `LABMESH_RESCAN_INTERVAL_SECS`: periodic re-scan interval (default: no timer)
//! - `LABMESH_NOTIFICATION_BUFFER`: capacity of the notification channel (default 256)
//! - `LABMESH_LOG`: log filter when `RUST_LOG` is unset (default `info`)
//! - `LABMESH_LOG_FORMAT`: `plain` or `json` (default `plain`)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Plain,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            other => Err(Error::Validation(format!(
                "invalid log format {other:?}: expected plain or json"
            ))),
        }
    }
}

/// Settings of a [`Coordinator`](crate::coordinator::Coordinator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Directory for [`FileKvStore`](crate::kv::FileKvStore) documents
    pub data_dir: PathBuf,
    /// Re-scan approved requests when a resource registers or comes online
    pub rescan_on_registration: bool,
    /// Periodic re-scan interval in seconds; `None` disables the timer
    pub rescan_interval_secs: Option<u64>,
    /// Capacity of the notification channel
    pub notification_buffer: usize,
    /// Log filter used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./labmesh-data"),
            rescan_on_registration: true,
            rescan_interval_secs: None,
            notification_buffer: 256,
            log_filter: "info".to_string(),
            log_format: LogFormat::Plain,
        }
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Validation(format!("invalid value for {key}: {raw:?}")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Validation(format!("invalid value for {key}: {raw:?}"))),
    }
}

impl CoordinatorConfig {
    /// Defaults overlaid with `LABMESH_*` environment variables.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a malformed value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup` (keyed like the environment).
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a malformed value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(dir) = lookup("LABMESH_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("LABMESH_RESCAN_ON_REGISTRATION") {
            config.rescan_on_registration = parse_bool("LABMESH_RESCAN_ON_REGISTRATION", &raw)?;
        }
        if let Some(raw) = lookup("LABMESH_RESCAN_INTERVAL_SECS") {
            let secs: u64 = parse("LABMESH_RESCAN_INTERVAL_SECS", &raw)?;
            config.rescan_interval_secs = (secs > 0).then_some(secs);
        }
        if let Some(raw) = lookup("LABMESH_NOTIFICATION_BUFFER") {
            config.notification_buffer = parse("LABMESH_NOTIFICATION_BUFFER", &raw)?;
        }
        if let Some(filter) = lookup("LABMESH_LOG") {
            config.log_filter = filter;
        }
        if let Some(raw) = lookup("LABMESH_LOG_FORMAT") {
            config.log_format = raw.parse()?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a zero notification buffer or zero interval.
    pub fn validate(&self) -> Result<()> {
        if self.notification_buffer == 0 {
            return Err(Error::Validation("notification_buffer must be at least 1".into()));
        }
        if self.rescan_interval_secs == Some(0) {
            return Err(Error::Validation("rescan_interval_secs must be positive".into()));
        }
        Ok(())
    }

    /// Re-scan interval, if the timer is enabled.
    #[must_use]
    pub fn rescan_interval(&self) -> Option<Duration> {
        self.rescan_interval_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CoordinatorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, CoordinatorConfig::default());
        assert!(config.rescan_on_registration);
        assert_eq!(config.rescan_interval(), None);
    }

    #[test]
    fn test_overrides() {
        let config = CoordinatorConfig::from_lookup(lookup(&[
            ("LABMESH_DATA_DIR", "/var/lib/labmesh"),
            ("LABMESH_RESCAN_ON_REGISTRATION", "off"),
            ("LABMESH_RESCAN_INTERVAL_SECS", "30"),
            ("LABMESH_LOG_FORMAT", "JSON"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/labmesh"));
        assert!(!config.rescan_on_registration);
        assert_eq!(config.rescan_interval(), Some(Duration::from_secs(30)));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_malformed_values_rejected() {
        let err = CoordinatorConfig::from_lookup(lookup(&[("LABMESH_NOTIFICATION_BUFFER", "lots")]))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(m) if m.contains("LABMESH_NOTIFICATION_BUFFER")));

        assert!(CoordinatorConfig::from_lookup(lookup(&[("LABMESH_NOTIFICATION_BUFFER", "0")])).is_err());
        assert!(CoordinatorConfig::from_lookup(lookup(&[("LABMESH_LOG_FORMAT", "xml")])).is_err());
    }

    #[test]
    fn test_deserialize_partial_document() {
        let config: CoordinatorConfig =
            serde_json::from_str(r#"{"rescan_interval_secs": 5}"#).unwrap();
        assert_eq!(config.rescan_interval_secs, Some(5));
        assert_eq!(config.notification_buffer, 256);
    }
}
