//! Configuration types.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 4000;

/// Header carrying the caller's identity.
pub const DEFAULT_IDENTITY_HEADER: &str = "x-user-email";

/// How far back the same-company fallback looks for an active application.
pub const DEFAULT_RECENCY_DAYS: i64 = 60;

/// Upper bound for the recency window (about a century).
pub const MAX_RECENCY_DAYS: i64 = 36_500;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind: IpAddr,
    /// HTTP port.
    pub port: u16,
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Request header used to identify the caller.
    pub identity_header: String,
    /// Recency window for company matching, in days.
    pub recency_days: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            db_path: PathBuf::from("./data/job-tracker.db"),
            identity_header: DEFAULT_IDENTITY_HEADER.to_string(),
            recency_days: DEFAULT_RECENCY_DAYS,
        }
    }
}

impl ServerConfig {
    /// Load from environment variables, falling back to defaults for any
    /// variable that is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` is this with
    /// `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(bind) = lookup("JOB_TRACKER_BIND") {
            config.bind = parse_value("JOB_TRACKER_BIND", &bind)?;
        }
        if let Some(port) = lookup("JOB_TRACKER_PORT") {
            config.port = parse_value("JOB_TRACKER_PORT", &port)?;
        }
        if let Some(path) = lookup("JOB_TRACKER_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(header) = lookup("JOB_TRACKER_IDENTITY_HEADER") {
            let header = header.trim().to_ascii_lowercase();
            if header.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "JOB_TRACKER_IDENTITY_HEADER".into(),
                    message: "must not be empty".into(),
                });
            }
            config.identity_header = header;
        }
        if let Some(days) = lookup("JOB_TRACKER_RECENCY_DAYS") {
            let days: i64 = parse_value("JOB_TRACKER_RECENCY_DAYS", &days)?;
            if days <= 0 {
                return Err(ConfigError::InvalidValue {
                    key: "JOB_TRACKER_RECENCY_DAYS".into(),
                    message: format!("must be positive, got {days}"),
                });
            }
            if days > MAX_RECENCY_DAYS {
                return Err(ConfigError::InvalidValue {
                    key: "JOB_TRACKER_RECENCY_DAYS".into(),
                    message: format!("must be at most {MAX_RECENCY_DAYS}, got {days}"),
                });
            }
            config.recency_days = days;
        }

        Ok(config)
    }

    /// Socket address for the HTTP listener.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Recency window as a duration.
    pub fn recency_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.recency_days)
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.identity_header, "x-user-email");
        assert_eq!(config.recency_days, 60);
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:4000");
    }

    #[test]
    fn overrides_from_env() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("JOB_TRACKER_PORT", "8081"),
            ("JOB_TRACKER_BIND", "127.0.0.1"),
            ("JOB_TRACKER_DB_PATH", "/tmp/jt.db"),
            ("JOB_TRACKER_IDENTITY_HEADER", " X-Tracker-User "),
            ("JOB_TRACKER_RECENCY_DAYS", "30"),
        ]))
        .unwrap();
        assert_eq!(config.listen_addr().to_string(), "127.0.0.1:8081");
        assert_eq!(config.db_path, PathBuf::from("/tmp/jt.db"));
        assert_eq!(config.identity_header, "x-tracker-user");
        assert_eq!(config.recency_window(), chrono::Duration::days(30));
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = ServerConfig::from_lookup(lookup(&[("JOB_TRACKER_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "JOB_TRACKER_PORT"));
    }

    #[test]
    fn non_positive_recency_is_rejected() {
        let err =
            ServerConfig::from_lookup(lookup(&[("JOB_TRACKER_RECENCY_DAYS", "0")])).unwrap_err();
        assert!(err.to_string().contains("must be positive"));
    }

    #[test]
    fn oversized_recency_is_rejected() {
        let err = ServerConfig::from_lookup(lookup(&[("JOB_TRACKER_RECENCY_DAYS", "100000000")]))
            .unwrap_err();
        assert!(err.to_string().contains("must be at most 36500"));

        let config =
            ServerConfig::from_lookup(lookup(&[("JOB_TRACKER_RECENCY_DAYS", "36500")])).unwrap();
        assert_eq!(config.recency_window(), chrono::Duration::days(36_500));
    }
}
