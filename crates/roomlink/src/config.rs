//! Session configuration.
//!
//! Configuration is loaded from environment variables. Defaults: 10s
//! liveness tick, 30s staleness timeout, 5 reconnection attempts on a 1s
//! exponential base.

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default root path under which rooms live in the store.
pub const DEFAULT_ROOMS_ROOT: &str = "rooms";

/// Default liveness tick interval in seconds.
pub const DEFAULT_LIVENESS_INTERVAL_SECONDS: u64 = 10;

/// Default staleness timeout in seconds.
pub const DEFAULT_STALE_TIMEOUT_SECONDS: u64 = 30;

/// Default reconnection backoff base in milliseconds.
pub const DEFAULT_RECONNECT_BASE_MS: u64 = 1000;

/// Default maximum backoff delay in seconds.
pub const DEFAULT_RECONNECT_MAX_DELAY_SECONDS: u64 = 30;

/// Default maximum number of reconnection attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default public STUN servers handed to the media engine.
pub const DEFAULT_ICE_SERVERS: [&str; 5] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
    "stun:stun2.l.google.com:19302",
    "stun:stun3.l.google.com:19302",
    "stun:stun4.l.google.com:19302",
];

/// roomlink session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root path for room records (default: "rooms").
    pub rooms_root: String,

    /// Liveness tick interval (default: 10s).
    pub liveness_interval: Duration,

    /// Inactivity after which the remote peer is probed (default: 30s).
    pub stale_timeout: Duration,

    /// Backoff base; attempt `n` waits `base * 2^n` (default: 1s).
    pub reconnect_base: Duration,

    /// Upper bound on a single backoff delay (default: 30s).
    pub reconnect_max_delay: Duration,

    /// Attempts before the session fails permanently (default: 5).
    pub max_reconnect_attempts: u32,

    /// ICE server URLs for the media engine.
    pub ice_servers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rooms_root: DEFAULT_ROOMS_ROOT.to_string(),
            liveness_interval: Duration::from_secs(DEFAULT_LIVENESS_INTERVAL_SECONDS),
            stale_timeout: Duration::from_secs(DEFAULT_STALE_TIMEOUT_SECONDS),
            reconnect_base: Duration::from_millis(DEFAULT_RECONNECT_BASE_MS),
            reconnect_max_delay: Duration::from_secs(DEFAULT_RECONNECT_MAX_DELAY_SECONDS),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            ice_servers: DEFAULT_ICE_SERVERS.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let rooms_root = vars
            .get("ROOMLINK_ROOMS_ROOT")
            .map(|s| s.trim_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_ROOMS_ROOT.to_string());

        if rooms_root.is_empty() {
            return Err(ConfigError::InvalidValue(
                "ROOMLINK_ROOMS_ROOT must not be empty".to_string(),
            ));
        }

        let liveness_interval = Duration::from_secs(parse_or(
            vars,
            "ROOMLINK_LIVENESS_INTERVAL_SECS",
            DEFAULT_LIVENESS_INTERVAL_SECONDS,
        )?);

        let stale_timeout = Duration::from_secs(parse_or(
            vars,
            "ROOMLINK_STALE_TIMEOUT_SECS",
            DEFAULT_STALE_TIMEOUT_SECONDS,
        )?);

        let reconnect_base = Duration::from_millis(parse_or(
            vars,
            "ROOMLINK_RECONNECT_BASE_MS",
            DEFAULT_RECONNECT_BASE_MS,
        )?);

        let reconnect_max_delay = Duration::from_secs(parse_or(
            vars,
            "ROOMLINK_RECONNECT_MAX_DELAY_SECS",
            DEFAULT_RECONNECT_MAX_DELAY_SECONDS,
        )?);

        let max_reconnect_attempts = parse_or(
            vars,
            "ROOMLINK_MAX_RECONNECT_ATTEMPTS",
            DEFAULT_MAX_RECONNECT_ATTEMPTS,
        )?;

        let ice_servers = match vars.get("ROOMLINK_ICE_SERVERS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect(),
            None => DEFAULT_ICE_SERVERS.iter().map(ToString::to_string).collect(),
        };

        let config = Self {
            rooms_root,
            liveness_interval,
            stale_timeout,
            reconnect_base,
            reconnect_max_delay,
            max_reconnect_attempts,
            ice_servers,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.liveness_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "ROOMLINK_LIVENESS_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }
        if self.stale_timeout < self.liveness_interval {
            return Err(ConfigError::InvalidValue(
                "ROOMLINK_STALE_TIMEOUT_SECS must not be shorter than the liveness interval"
                    .to_string(),
            ));
        }
        if self.reconnect_base.is_zero() {
            return Err(ConfigError::InvalidValue(
                "ROOMLINK_RECONNECT_BASE_MS must be greater than zero".to_string(),
            ));
        }
        if self.reconnect_max_delay < self.reconnect_base {
            return Err(ConfigError::InvalidValue(
                "ROOMLINK_RECONNECT_MAX_DELAY_SECS must not be below the backoff base".to_string(),
            ));
        }
        if self.max_reconnect_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "ROOMLINK_MAX_RECONNECT_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw:?} is not a valid number"))),
        None => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_from_empty_environment() {
        let config = Config::from_vars(&HashMap::new()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.liveness_interval, Duration::from_secs(10));
        assert_eq!(config.stale_timeout, Duration::from_secs(30));
        assert_eq!(config.reconnect_base, Duration::from_secs(1));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.ice_servers.len(), 5);
        assert_eq!(config.rooms_root, "rooms");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_vars(&vars(&[
            ("ROOMLINK_ROOMS_ROOT", "/staging/rooms/"),
            ("ROOMLINK_LIVENESS_INTERVAL_SECS", "5"),
            ("ROOMLINK_STALE_TIMEOUT_SECS", "15"),
            ("ROOMLINK_RECONNECT_BASE_MS", "250"),
            ("ROOMLINK_RECONNECT_MAX_DELAY_SECS", "8"),
            ("ROOMLINK_MAX_RECONNECT_ATTEMPTS", "3"),
            ("ROOMLINK_ICE_SERVERS", "stun:a.example:3478, turn:b.example:3478,"),
        ]))
        .unwrap();

        assert_eq!(config.rooms_root, "staging/rooms");
        assert_eq!(config.liveness_interval, Duration::from_secs(5));
        assert_eq!(config.stale_timeout, Duration::from_secs(15));
        assert_eq!(config.reconnect_base, Duration::from_millis(250));
        assert_eq!(config.reconnect_max_delay, Duration::from_secs(8));
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(
            config.ice_servers,
            vec!["stun:a.example:3478", "turn:b.example:3478"]
        );
    }

    #[test]
    fn test_rejects_unparseable_numbers() {
        let err = Config::from_vars(&vars(&[("ROOMLINK_MAX_RECONNECT_ATTEMPTS", "five")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let err =
            Config::from_vars(&vars(&[("ROOMLINK_MAX_RECONNECT_ATTEMPTS", "0")])).unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_rejects_stale_timeout_below_tick() {
        let err = Config::from_vars(&vars(&[
            ("ROOMLINK_LIVENESS_INTERVAL_SECS", "20"),
            ("ROOMLINK_STALE_TIMEOUT_SECS", "10"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_rejects_empty_rooms_root() {
        let err = Config::from_vars(&vars(&[("ROOMLINK_ROOMS_ROOT", "/")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }
}
