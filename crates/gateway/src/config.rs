use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// How far a mutation is driven before the tool call answers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WaitMode {
    /// Return right after the provider accepts the mutation.
    #[serde(rename = "submit")]
    Submit,
    /// Wait for the provider operation to reach DONE.
    #[serde(rename = "operation")]
    Operation,
    /// Wait for the operation, then for the instance to reach the target status.
    #[serde(rename = "converge")]
    Converge,
}

impl FromStr for WaitMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "submit" | "none" | "fire-and-forget" => Ok(WaitMode::Submit),
            "operation" => Ok(WaitMode::Operation),
            "converge" | "instance" => Ok(WaitMode::Converge),
            other => Err(Error::Config(format!("unknown wait mode '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub compute: ComputeConfig,
    pub lifecycle: LifecycleConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeConfig {
    pub api_base: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub list_page_size: u32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    pub operation_poll_interval: Duration,
    pub operation_poll_max_attempts: u32,
    pub instance_poll_interval: Duration,
    pub instance_poll_max_attempts: u32,
    pub start_wait: WaitMode,
    pub stop_wait: WaitMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub capacity: usize,
    pub default_recent_limit: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let config = Config {
            server: ServerConfig {
                addr: lookup("GATEWAY_ADDR").unwrap_or(defaults.server.addr),
            },
            compute: ComputeConfig {
                api_base: lookup("COMPUTE_API_BASE").unwrap_or(defaults.compute.api_base),
                access_token: lookup("COMPUTE_ACCESS_TOKEN").filter(|t| !t.is_empty()),
                list_page_size: parse_or(
                    &lookup,
                    "COMPUTE_LIST_PAGE_SIZE",
                    defaults.compute.list_page_size,
                )?,
                request_timeout_secs: parse_or(
                    &lookup,
                    "COMPUTE_REQUEST_TIMEOUT_SECS",
                    defaults.compute.request_timeout_secs,
                )?,
            },
            lifecycle: LifecycleConfig {
                operation_poll_interval: Duration::from_secs(parse_or(
                    &lookup,
                    "OPERATION_POLL_INTERVAL_SECS",
                    defaults.lifecycle.operation_poll_interval.as_secs(),
                )?),
                operation_poll_max_attempts: parse_or(
                    &lookup,
                    "OPERATION_POLL_MAX_ATTEMPTS",
                    defaults.lifecycle.operation_poll_max_attempts,
                )?,
                instance_poll_interval: Duration::from_secs(parse_or(
                    &lookup,
                    "INSTANCE_POLL_INTERVAL_SECS",
                    defaults.lifecycle.instance_poll_interval.as_secs(),
                )?),
                instance_poll_max_attempts: parse_or(
                    &lookup,
                    "INSTANCE_POLL_MAX_ATTEMPTS",
                    defaults.lifecycle.instance_poll_max_attempts,
                )?,
                start_wait: parse_or(&lookup, "START_WAIT_MODE", defaults.lifecycle.start_wait)?,
                stop_wait: parse_or(&lookup, "STOP_WAIT_MODE", defaults.lifecycle.stop_wait)?,
            },
            ledger: LedgerConfig {
                capacity: parse_or(&lookup, "LEDGER_CAPACITY", defaults.ledger.capacity)?,
                default_recent_limit: parse_or(
                    &lookup,
                    "RECENT_ACTIONS_DEFAULT_LIMIT",
                    defaults.ledger.default_recent_limit,
                )?,
            },
        };

        config.validate()?;

        if config.compute.access_token.is_none() {
            tracing::warn!(
                "COMPUTE_ACCESS_TOKEN is not set. Compute API calls will be unauthenticated."
            );
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ledger.capacity == 0 {
            return Err(Error::Config("LEDGER_CAPACITY must be greater than zero".to_string()));
        }
        if self.lifecycle.operation_poll_max_attempts == 0 {
            return Err(Error::Config(
                "OPERATION_POLL_MAX_ATTEMPTS must be greater than zero".to_string(),
            ));
        }
        if self.lifecycle.instance_poll_max_attempts == 0 {
            return Err(Error::Config(
                "INSTANCE_POLL_MAX_ATTEMPTS must be greater than zero".to_string(),
            ));
        }
        if self.compute.list_page_size == 0 {
            return Err(Error::Config(
                "COMPUTE_LIST_PAGE_SIZE must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{} has invalid value '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                addr: "127.0.0.1:3334".to_string(),
            },
            compute: ComputeConfig::default(),
            lifecycle: LifecycleConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            api_base: "https://compute.googleapis.com/compute/v1/".to_string(),
            access_token: None,
            list_page_size: 50,
            request_timeout_secs: 30,
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            operation_poll_interval: Duration::from_secs(2),
            operation_poll_max_attempts: 150,
            instance_poll_interval: Duration::from_secs(5),
            instance_poll_max_attempts: 30,
            start_wait: WaitMode::Converge,
            stop_wait: WaitMode::Submit,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            default_recent_limit: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.server.addr, "127.0.0.1:3334");
        assert_eq!(config.ledger.capacity, 500);
        assert_eq!(config.lifecycle.start_wait, WaitMode::Converge);
        assert_eq!(config.lifecycle.stop_wait, WaitMode::Submit);
        assert_eq!(config.lifecycle.instance_poll_max_attempts, 30);
        assert_eq!(config.lifecycle.instance_poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("LEDGER_CAPACITY", "10"),
            ("STOP_WAIT_MODE", "Converge"),
            ("OPERATION_POLL_INTERVAL_SECS", " 1 "),
            ("COMPUTE_ACCESS_TOKEN", "ya29.token"),
        ]))
        .unwrap();
        assert_eq!(config.ledger.capacity, 10);
        assert_eq!(config.lifecycle.stop_wait, WaitMode::Converge);
        assert_eq!(config.lifecycle.operation_poll_interval, Duration::from_secs(1));
        assert_eq!(config.compute.access_token.as_deref(), Some("ya29.token"));
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = Config::from_lookup(lookup_from(&[("LEDGER_CAPACITY", "0")])).unwrap_err();
        assert!(err.to_string().contains("LEDGER_CAPACITY"));
    }

    #[test]
    fn rejects_unknown_wait_mode_and_bad_numbers() {
        assert!(Config::from_lookup(lookup_from(&[("START_WAIT_MODE", "eventually")])).is_err());
        assert!(
            Config::from_lookup(lookup_from(&[("INSTANCE_POLL_MAX_ATTEMPTS", "many")])).is_err()
        );
    }
}
