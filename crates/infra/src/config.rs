//! Environment-driven configuration for the command side.

use thiserror::Error;

use moneyflow_accounts::ACCOUNT_AGGREGATE_TYPE;

pub const ENV_MAX_CONFLICT_RETRIES: &str = "MONEYFLOW_MAX_CONFLICT_RETRIES";
pub const ENV_ACCOUNT_AGGREGATE_TYPE: &str = "MONEYFLOW_ACCOUNT_AGGREGATE_TYPE";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Aggregate type that account streams are stored under.
    pub account_aggregate_type: String,
    /// Reload-and-retry rounds after an optimistic concurrency conflict.
    pub max_conflict_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            account_aggregate_type: ACCOUNT_AGGREGATE_TYPE.to_string(),
            max_conflict_retries: 3,
        }
    }
}

impl Config {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_MAX_CONFLICT_RETRIES) {
            config.max_conflict_retries =
                raw.trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
                        key: ENV_MAX_CONFLICT_RETRIES,
                        value: raw.clone(),
                        reason: e.to_string(),
                    })?;
        }

        if let Some(raw) = lookup(ENV_ACCOUNT_AGGREGATE_TYPE) {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: ENV_ACCOUNT_AGGREGATE_TYPE,
                    value: raw.clone(),
                    reason: "must not be empty".to_string(),
                });
            }
            config.account_aggregate_type = trimmed.to_string();
        }

        Ok(config)
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
    fn unset_keys_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.account_aggregate_type, "accounts.account");
        assert_eq!(config.max_conflict_retries, 3);
    }

    #[test]
    fn values_are_read_and_trimmed() {
        let config = Config::from_lookup(lookup(&[
            (ENV_MAX_CONFLICT_RETRIES, " 7 "),
            (ENV_ACCOUNT_AGGREGATE_TYPE, "bank.account"),
        ]))
        .unwrap();

        assert_eq!(config.max_conflict_retries, 7);
        assert_eq!(config.account_aggregate_type, "bank.account");
    }

    #[test]
    fn bad_retry_count_is_an_error() {
        let err = Config::from_lookup(lookup(&[(ENV_MAX_CONFLICT_RETRIES, "-1")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == ENV_MAX_CONFLICT_RETRIES));
    }

    #[test]
    fn empty_aggregate_type_is_an_error() {
        assert!(Config::from_lookup(lookup(&[(ENV_ACCOUNT_AGGREGATE_TYPE, "  ")])).is_err());
    }
}
