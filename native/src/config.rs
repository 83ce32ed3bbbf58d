// Bridge settings: built-in defaults overridden from the environment.
// `.env` files are loaded by the binary (dotenvy) before these are read.

use crate::bridge::{
    ProbeSettings, RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_PROBE_INTERVAL,
    DEFAULT_PROBE_TIMEOUT, DEFAULT_RETRY_DELAY,
};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_APPLICATION: &str = "RSLinx";
pub const DEFAULT_TOPIC: &str = "ExcelLink";
pub const DEFAULT_VALIDATION_ITEM: &str = "DDETest";
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(5);

pub const ENV_APPLICATION: &str = "RSLINX_APPLICATION";
pub const ENV_TOPIC: &str = "RSLINX_TOPIC";
pub const ENV_MAX_RETRIES: &str = "DDE_MAX_RETRIES";
pub const ENV_RETRY_DELAY_MS: &str = "DDE_RETRY_DELAY_MS";
pub const ENV_PROBE_TIMEOUT_MS: &str = "DDE_PROBE_TIMEOUT_MS";
pub const ENV_PROBE_INTERVAL_MS: &str = "DDE_PROBE_INTERVAL_MS";
pub const ENV_TRANSACTION_TIMEOUT_MS: &str = "DDE_TRANSACTION_TIMEOUT_MS";
pub const ENV_VALIDATION_ITEM: &str = "DDE_VALIDATION_ITEM";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' is not a whole number")]
    NotANumber { key: String, value: String },

    #[error("Invalid value for {key}: must be greater than zero")]
    Zero { key: String },

    #[error("Invalid value for {key}: must not be empty")]
    Empty { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Server name used when a request does not name one.
    pub application: String,
    /// Topic used when a request does not name one.
    pub topic: String,
    pub retry: RetryPolicy,
    pub probe: ProbeSettings,
    /// Per-transaction timeout handed to the platform host.
    pub transaction_timeout: Duration,
    /// Item read by the `validate` action when none is given.
    pub validation_item: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            application: DEFAULT_APPLICATION.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            retry: RetryPolicy {
                max_retries: DEFAULT_MAX_RETRIES,
                retry_delay: DEFAULT_RETRY_DELAY,
            },
            probe: ProbeSettings {
                timeout: DEFAULT_PROBE_TIMEOUT,
                interval: DEFAULT_PROBE_INTERVAL,
            },
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            validation_item: DEFAULT_VALIDATION_ITEM.to_string(),
        }
    }
}

impl BridgeSettings {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each known key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(value) = lookup(ENV_APPLICATION) {
            settings.application = non_empty(ENV_APPLICATION, value)?;
        }
        if let Some(value) = lookup(ENV_TOPIC) {
            settings.topic = non_empty(ENV_TOPIC, value)?;
        }
        if let Some(value) = lookup(ENV_VALIDATION_ITEM) {
            settings.validation_item = non_empty(ENV_VALIDATION_ITEM, value)?;
        }
        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            settings.retry.max_retries = parse_retries(ENV_MAX_RETRIES, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_DELAY_MS) {
            settings.retry.retry_delay = parse_millis(ENV_RETRY_DELAY_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_PROBE_TIMEOUT_MS) {
            settings.probe.timeout = parse_millis(ENV_PROBE_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_PROBE_INTERVAL_MS) {
            settings.probe.interval = parse_positive_millis(ENV_PROBE_INTERVAL_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_TRANSACTION_TIMEOUT_MS) {
            settings.transaction_timeout =
                parse_positive_millis(ENV_TRANSACTION_TIMEOUT_MS, &value)?;
        }

        Ok(settings)
    }
}

fn non_empty(key: &str, value: String) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Empty {
            key: key.to_string(),
        })
    } else {
        Ok(value)
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::NotANumber {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_retries(key: &str, value: &str) -> Result<NonZeroU32, ConfigError> {
    let n: u32 = value.trim().parse().map_err(|_| ConfigError::NotANumber {
        key: key.to_string(),
        value: value.to_string(),
    })?;
    NonZeroU32::new(n).ok_or_else(|| ConfigError::Zero {
        key: key.to_string(),
    })
}

fn parse_millis(key: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_u64(key, value).map(Duration::from_millis)
}

fn parse_positive_millis(key: &str, value: &str) -> Result<Duration, ConfigError> {
    match parse_u64(key, value)? {
        0 => Err(ConfigError::Zero {
            key: key.to_string(),
        }),
        ms => Ok(Duration::from_millis(ms)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_rslinx_setup() {
        let settings = BridgeSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.application, "RSLinx");
        assert_eq!(settings.topic, "ExcelLink");
        assert_eq!(settings.retry.max_retries.get(), 3);
        assert_eq!(settings.retry.retry_delay, Duration::from_secs(1));
        assert_eq!(settings.probe.timeout, Duration::from_secs(5));
        assert_eq!(settings.probe.interval, Duration::from_millis(500));
    }

    #[test]
    fn environment_overrides_defaults() {
        let settings = BridgeSettings::from_lookup(lookup(&[
            (ENV_TOPIC, "Line2"),
            (ENV_MAX_RETRIES, "5"),
            (ENV_RETRY_DELAY_MS, "250"),
            (ENV_PROBE_TIMEOUT_MS, "2000"),
        ]))
        .unwrap();

        assert_eq!(settings.topic, "Line2");
        assert_eq!(settings.retry.max_retries.get(), 5);
        assert_eq!(settings.retry.retry_delay, Duration::from_millis(250));
        assert_eq!(settings.probe.timeout, Duration::from_secs(2));
    }

    #[test]
    fn zero_retries_rejected() {
        let err = BridgeSettings::from_lookup(lookup(&[(ENV_MAX_RETRIES, "0")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Zero {
                key: ENV_MAX_RETRIES.to_string()
            }
        );
    }

    #[test]
    fn garbage_rejected() {
        let err =
            BridgeSettings::from_lookup(lookup(&[(ENV_RETRY_DELAY_MS, "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::NotANumber { .. }));

        let err = BridgeSettings::from_lookup(lookup(&[(ENV_TOPIC, "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Empty { .. }));
    }

    #[test]
    fn zero_probe_interval_rejected() {
        let err =
            BridgeSettings::from_lookup(lookup(&[(ENV_PROBE_INTERVAL_MS, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Zero { .. }));
    }
}
