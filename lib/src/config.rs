// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Host configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Default relay base URL (local simulator)
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";

/// Default application name reported during pairing
pub const DEFAULT_APP_NAME: &str = "keylink";

/// Host configuration, loadable from any serde format
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relay base URL, requests are sent to `{base_url}/{device_id}`
    pub base_url: String,

    /// Application name registered with the device on pairing (max 24 bytes)
    pub app_name: String,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,

    /// Automatic retry budget (additional attempts after the first)
    pub retries: usize,

    /// Delay before retrying busy devices in milliseconds
    pub backoff_ms: u64,

    /// Refresh active wallets and retry on wallet mismatch
    pub refresh_wallets: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            app_name: DEFAULT_APP_NAME.to_string(),
            timeout_ms: 60_000,
            retries: 3,
            backoff_ms: 500,
            refresh_wallets: true,
        }
    }
}

impl Config {
    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Retry policy derived from this configuration
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries,
            backoff: Duration::from_millis(self.backoff_ms),
            refresh_wallets: self.refresh_wallets,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partial_config() {
        let c: Config = serde_json::from_str(r#"{"app_name": "wallet", "retries": 1}"#).unwrap();

        assert_eq!(c.app_name, "wallet");
        assert_eq!(c.retries, 1);
        assert_eq!(c.base_url, DEFAULT_BASE_URL);
        assert_eq!(c.timeout(), Duration::from_secs(60));

        let p = c.retry_policy();
        assert_eq!(p.retries, 1);
        assert!(p.refresh_wallets);
    }
}
