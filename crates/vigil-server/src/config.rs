// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use vigil_core::RecordRetention;
use vigil_core::registry::{DEFAULT_EVENT_BUFFER, DEFAULT_MAX_RECORDS, DEFAULT_RECORD_TTL};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Vigil server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address
    pub http_addr: SocketAddr,
    /// Capacity of each instance's event channel
    pub event_buffer: usize,
    /// How long finished instances stay queryable
    pub retention: RecordRetention,
    /// Log output format
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `VIGIL_HTTP_PORT`: HTTP server port (default: 8080)
    /// - `VIGIL_EVENT_BUFFER`: Per-instance event buffer (default: 1024)
    /// - `VIGIL_RECORD_TTL_SECS`: Seconds a finished instance stays
    ///   queryable after delivery settles, 0 to keep until the cap applies
    ///   (default: 3600)
    /// - `VIGIL_MAX_RECORDS`: Finished instances kept per variant (default: 10000)
    /// - `VIGIL_LOG_FORMAT`: `text` or `json` (default: text)
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_port: u16 = std::env::var("VIGIL_HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("VIGIL_HTTP_PORT", "must be a valid port number"))?;

        let event_buffer: usize = match std::env::var("VIGIL_EVENT_BUFFER") {
            Ok(raw) => raw
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::Invalid(
                    "VIGIL_EVENT_BUFFER",
                    "must be a positive integer",
                ))?,
            Err(_) => DEFAULT_EVENT_BUFFER,
        };

        let record_ttl = match std::env::var("VIGIL_RECORD_TTL_SECS") {
            Ok(raw) => match raw.parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    return Err(ConfigError::Invalid(
                        "VIGIL_RECORD_TTL_SECS",
                        "must be a non-negative integer",
                    ));
                }
            },
            Err(_) => Some(DEFAULT_RECORD_TTL),
        };

        let max_records: usize = match std::env::var("VIGIL_MAX_RECORDS") {
            Ok(raw) => raw.parse().map_err(|_| {
                ConfigError::Invalid("VIGIL_MAX_RECORDS", "must be a non-negative integer")
            })?,
            Err(_) => DEFAULT_MAX_RECORDS,
        };

        let log_format = match std::env::var("VIGIL_LOG_FORMAT")
            .unwrap_or_else(|_| "text".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            _ => {
                return Err(ConfigError::Invalid(
                    "VIGIL_LOG_FORMAT",
                    "must be 'text' or 'json'",
                ));
            }
        };

        Ok(Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], http_port)),
            event_buffer,
            retention: RecordRetention::default()
                .with_ttl(record_ttl)
                .with_max_records(max_records),
            log_format,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            event_buffer: DEFAULT_EVENT_BUFFER,
            retention: RecordRetention::default(),
            log_format: LogFormat::Text,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 5] = [
        "VIGIL_HTTP_PORT",
        "VIGIL_EVENT_BUFFER",
        "VIGIL_RECORD_TTL_SECS",
        "VIGIL_MAX_RECORDS",
        "VIGIL_LOG_FORMAT",
    ];

    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }

        fn clear_all(&mut self) {
            for key in VARS {
                self.remove(key);
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.clear_all();

        let config = Config::from_env().unwrap();

        assert_eq!(config.http_addr.port(), 8080);
        assert_eq!(config.event_buffer, 1024);
        assert_eq!(config.retention.ttl, Some(Duration::from_secs(3600)));
        assert_eq!(config.retention.max_records, 10_000);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_config_from_env_with_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.clear_all();
        guard.set("VIGIL_HTTP_PORT", "9090");
        guard.set("VIGIL_EVENT_BUFFER", "16");
        guard.set("VIGIL_LOG_FORMAT", "JSON");

        let config = Config::from_env().unwrap();

        assert_eq!(config.http_addr.port(), 9090);
        assert_eq!(config.event_buffer, 16);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_config_retention_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.clear_all();
        guard.set("VIGIL_RECORD_TTL_SECS", "0");
        guard.set("VIGIL_MAX_RECORDS", "50");

        let config = Config::from_env().unwrap();
        assert_eq!(config.retention.ttl, None);
        assert_eq!(config.retention.max_records, 50);

        guard.set("VIGIL_MAX_RECORDS", "-1");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("VIGIL_MAX_RECORDS", _))
        ));
    }

    #[test]
    fn test_config_invalid_port() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.clear_all();
        guard.set("VIGIL_HTTP_PORT", "not-a-port");

        let result = Config::from_env();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("VIGIL_HTTP_PORT"));
    }

    #[test]
    fn test_config_zero_event_buffer_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.clear_all();
        guard.set("VIGIL_EVENT_BUFFER", "0");

        let result = Config::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::Invalid("VIGIL_EVENT_BUFFER", _))
        ));
    }

    #[test]
    fn test_config_unknown_log_format_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.clear_all();
        guard.set("VIGIL_LOG_FORMAT", "xml");

        assert!(Config::from_env().is_err());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Invalid("VIGIL_HTTP_PORT", "must be a valid port number");
        assert_eq!(
            err.to_string(),
            "invalid value for VIGIL_HTTP_PORT: must be a valid port number"
        );
    }
}
