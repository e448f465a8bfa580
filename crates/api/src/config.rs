use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use delivery_core::{CoreError, RuleConfig};
use delivery_events::{BroadcastConfig, FollowerConfig};

/// Server configuration loaded from environment variables.
///
/// Optional settings have defaults suitable for local use; the token, the
/// source path and the allow-listed user must be provided.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Shared secret clients pass as `authToken` (or `auth`).
    pub accept_token: String,
    /// Newline-delimited JSON log to follow.
    pub source_log_path: PathBuf,
    /// Allow-lists and redaction for the predicate chain.
    pub rules: RuleConfig,
    /// Per-subscriber queue capacity (default: `64`).
    pub subscriber_buffer: usize,
    /// Per-subscriber send timeout in milliseconds (default: `5000`).
    pub send_timeout_ms: u64,
    /// Follower backoff while the log is idle, in milliseconds (default: `1000`).
    pub poll_interval_ms: u64,
    /// Interval between WebSocket pings, in seconds (default: `30`).
    pub ws_ping_interval_secs: u64,
    /// Grace period for draining on shutdown, in seconds (default: `10`).
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                      | Default    |
    /// |------------------------------|------------|
    /// | `HOST`                       | `0.0.0.0`  |
    /// | `PORT`                       | `3000`     |
    /// | `ACCEPT_TOKEN`               | required   |
    /// | `SOURCE_LOG_PATH`            | required   |
    /// | `ALLOW_USER_ID`              | required   |
    /// | `ALLOW_INSTANCE_OWNER_IDS`   | empty      |
    /// | `REDACT_CONTENT_FIELDS`      | empty      |
    /// | `SUBSCRIBER_BUFFER`          | `64`       |
    /// | `SUBSCRIBER_SEND_TIMEOUT_MS` | `5000`     |
    /// | `SOURCE_POLL_INTERVAL_MS`    | `1000`     |
    /// | `WS_PING_INTERVAL_SECS`      | `30`       |
    /// | `SHUTDOWN_TIMEOUT_SECS`      | `10`       |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let required = |name: &str| {
            get(name).ok_or_else(|| CoreError::Config(format!("{name} must be set")))
        };

        let rules = RuleConfig::new(
            required("ALLOW_USER_ID")?,
            split_list(get("ALLOW_INSTANCE_OWNER_IDS")),
        )
        .with_redact_fields(split_list(get("REDACT_CONTENT_FIELDS")));

        let config = Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(get("PORT"), "PORT", 3000)?,
            accept_token: required("ACCEPT_TOKEN")?,
            source_log_path: PathBuf::from(required("SOURCE_LOG_PATH")?),
            rules,
            subscriber_buffer: parse_or(get("SUBSCRIBER_BUFFER"), "SUBSCRIBER_BUFFER", 64)?,
            send_timeout_ms: parse_or(
                get("SUBSCRIBER_SEND_TIMEOUT_MS"),
                "SUBSCRIBER_SEND_TIMEOUT_MS",
                5000,
            )?,
            poll_interval_ms: parse_or(
                get("SOURCE_POLL_INTERVAL_MS"),
                "SOURCE_POLL_INTERVAL_MS",
                1000,
            )?,
            ws_ping_interval_secs: parse_or(
                get("WS_PING_INTERVAL_SECS"),
                "WS_PING_INTERVAL_SECS",
                30,
            )?,
            shutdown_timeout_secs: parse_or(
                get("SHUTDOWN_TIMEOUT_SECS"),
                "SHUTDOWN_TIMEOUT_SECS",
                10,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), CoreError> {
        for (name, value) in [
            ("SUBSCRIBER_BUFFER", self.subscriber_buffer as u64),
            ("SUBSCRIBER_SEND_TIMEOUT_MS", self.send_timeout_ms),
            ("SOURCE_POLL_INTERVAL_MS", self.poll_interval_ms),
            ("WS_PING_INTERVAL_SECS", self.ws_ping_interval_secs),
        ] {
            if value == 0 {
                return Err(CoreError::Config(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }

    pub fn broadcast_config(&self) -> BroadcastConfig {
        BroadcastConfig {
            subscriber_buffer: self.subscriber_buffer,
            send_timeout: self.send_timeout(),
        }
    }

    pub fn follower_config(&self) -> FollowerConfig {
        FollowerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            ..Default::default()
        }
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ws_ping_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn parse_or<T: FromStr>(value: Option<String>, name: &str, default: T) -> Result<T, CoreError> {
    match value {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| CoreError::Config(format!("{name} is not valid: {v:?}"))),
    }
}

/// Comma-separated list with blanks removed.
fn split_list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, CoreError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|name| map.get(name).cloned())
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("ACCEPT_TOKEN", "secret"),
        ("SOURCE_LOG_PATH", "/var/log/events.jsonl"),
        ("ALLOW_USER_ID", "usr_me"),
    ];

    #[test]
    fn defaults_apply() {
        let config = load(&REQUIRED).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.subscriber_buffer, 64);
        assert_eq!(config.send_timeout(), Duration::from_secs(5));
        assert_eq!(config.follower_config().poll_interval, Duration::from_secs(1));
        assert!(config.rules.allow_owner_ids.is_empty());
        assert!(config.rules.redact_fields.is_empty());
    }

    #[test]
    fn lists_are_split_and_trimmed() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("ALLOW_INSTANCE_OWNER_IDS", " usr_a, grp_b ,,"));
        vars.push(("REDACT_CONTENT_FIELDS", "user.bio"));
        let config = load(&vars).unwrap();
        assert_eq!(config.rules.allow_owner_ids, vec!["usr_a", "grp_b"]);
        assert_eq!(config.rules.redact_fields, vec!["user.bio"]);
        assert_eq!(config.rules.allow_user_id, "usr_me");
    }

    #[test]
    fn missing_required_is_an_error() {
        let err = load(&REQUIRED[..2]).unwrap_err();
        assert_matches!(err, CoreError::Config(msg) if msg.contains("ALLOW_USER_ID"));
    }

    #[test]
    fn bad_number_is_an_error() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("PORT", "eighty"));
        assert_matches!(load(&vars), Err(CoreError::Config(msg)) if msg.contains("PORT"));
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("WS_PING_INTERVAL_SECS", "0"));
        assert_matches!(load(&vars), Err(CoreError::Config(_)));
    }
}
