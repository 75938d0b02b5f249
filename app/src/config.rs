//! Configuration management for the account balance service.
//!
//! Loads configuration from environment variables with sensible defaults.
//! A `.env` file in the working directory is honored by the binary.

use balance_runtime::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Stream holding the account's events (`ACCOUNT_STREAM`)
    pub stream: String,
    /// Checkpoint file (`CHECKPOINT_FILE`)
    pub checkpoint_file: PathBuf,
    /// Local event journal (`EVENT_LOG_PATH`)
    pub event_log_path: PathBuf,
    /// Page size for `list`/`rlist` (`LIST_PAGE_SIZE`)
    pub list_page_size: usize,
    /// Readiness probe at startup
    pub startup: StartupConfig,
    /// Resubscribe backoff after a dropped subscription
    pub resubscribe: ResubscribeConfig,
}

/// Startup readiness probe configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupConfig {
    /// Retries before startup fails (`STARTUP_MAX_RETRIES`, default: 8)
    pub max_retries: usize,
    /// Fixed delay between probes in milliseconds (`STARTUP_RETRY_DELAY_MS`, default: 250)
    pub retry_delay_ms: u64,
}

/// Resubscribe backoff configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResubscribeConfig {
    /// Retries before the projection gives up (`RESUBSCRIBE_MAX_RETRIES`, default: 10)
    pub max_retries: usize,
    /// First delay in milliseconds (`RESUBSCRIBE_INITIAL_DELAY_MS`, default: 100)
    pub initial_delay_ms: u64,
    /// Delay cap in milliseconds (`RESUBSCRIBE_MAX_DELAY_MS`, default: 5000)
    pub max_delay_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_source<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            stream: lookup("ACCOUNT_STREAM")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "account-balance".to_string()),
            checkpoint_file: lookup("CHECKPOINT_FILE")
                .map_or_else(|| PathBuf::from("balance.checkpoint"), PathBuf::from),
            event_log_path: lookup("EVENT_LOG_PATH")
                .map_or_else(|| PathBuf::from("data/events.jsonl"), PathBuf::from),
            list_page_size: parsed(&lookup, "LIST_PAGE_SIZE")
                .filter(|size| *size > 0)
                .unwrap_or(20),
            startup: StartupConfig {
                max_retries: parsed(&lookup, "STARTUP_MAX_RETRIES").unwrap_or(8),
                retry_delay_ms: parsed(&lookup, "STARTUP_RETRY_DELAY_MS").unwrap_or(250),
            },
            resubscribe: ResubscribeConfig {
                max_retries: parsed(&lookup, "RESUBSCRIBE_MAX_RETRIES").unwrap_or(10),
                initial_delay_ms: parsed(&lookup, "RESUBSCRIBE_INITIAL_DELAY_MS").unwrap_or(100),
                max_delay_ms: parsed(&lookup, "RESUBSCRIBE_MAX_DELAY_MS").unwrap_or(5000),
            },
        }
    }

    /// Fixed-delay policy for the startup readiness probe.
    #[must_use]
    pub const fn startup_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.startup.max_retries,
            Duration::from_millis(self.startup.retry_delay_ms),
        )
    }

    /// Exponential backoff policy for resubscribing.
    #[must_use]
    pub fn resubscribe_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.resubscribe.max_retries)
            .initial_delay(Duration::from_millis(self.resubscribe.initial_delay_ms))
            .max_delay(Duration::from_millis(self.resubscribe.max_delay_ms))
            .multiplier(2.0)
            .build()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_source(|_| None)
    }
}

fn parsed<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key).and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_source(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = Config::default();

        assert_eq!(config.stream, "account-balance");
        assert_eq!(config.checkpoint_file, PathBuf::from("balance.checkpoint"));
        assert_eq!(config.event_log_path, PathBuf::from("data/events.jsonl"));
        assert_eq!(config.list_page_size, 20);
        assert_eq!(
            config.startup_policy(),
            RetryPolicy::fixed(8, Duration::from_millis(250))
        );

        let resubscribe = config.resubscribe_policy();
        assert_eq!(resubscribe.max_retries, 10);
        assert_eq!(resubscribe.initial_delay, Duration::from_millis(100));
        assert_eq!(resubscribe.max_delay, Duration::from_secs(5));
    }

    #[test]
    fn overrides() {
        let config = from_map(&[
            ("ACCOUNT_STREAM", "savings"),
            ("CHECKPOINT_FILE", "/tmp/savings.checkpoint"),
            ("LIST_PAGE_SIZE", "5"),
            ("STARTUP_MAX_RETRIES", "2"),
        ]);

        assert_eq!(config.stream, "savings");
        assert_eq!(config.checkpoint_file, PathBuf::from("/tmp/savings.checkpoint"));
        assert_eq!(config.list_page_size, 5);
        assert_eq!(config.startup.max_retries, 2);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = from_map(&[
            ("ACCOUNT_STREAM", "  "),
            ("LIST_PAGE_SIZE", "0"),
            ("RESUBSCRIBE_MAX_RETRIES", "many"),
        ]);

        assert_eq!(config.stream, "account-balance");
        assert_eq!(config.list_page_size, 20);
        assert_eq!(config.resubscribe.max_retries, 10);
    }
}
