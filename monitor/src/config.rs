//! Monitor configuration with TOML file support.

use cmon_upstream::HttpSourceConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::MonitorError;

/// How the drive loop decides when to refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveMode {
    /// React to upstream vote / round-step / validator-set events.
    Events,
    /// Refresh on a fixed interval.
    Polled,
}

impl FromStr for DriveMode {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "events" | "event" => Ok(Self::Events),
            "polled" | "poll" => Ok(Self::Polled),
            other => Err(MonitorError::Config(format!("unknown drive mode {other:?}"))),
        }
    }
}

impl fmt::Display for DriveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Events => "events",
            Self::Polled => "polled",
        })
    }
}

/// Configuration for the consensus monitor.
///
/// Can be loaded from a TOML file via [`MonitorConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// REST API base URL (staking registry).
    #[serde(default)]
    pub api_url: String,

    /// Tendermint RPC base URL (validator set, node info, consensus state, events).
    #[serde(default)]
    pub rpc_url: String,

    /// Port subscribers connect to.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Drive strategy.
    #[serde(default = "default_mode")]
    pub mode: DriveMode,

    /// Polled mode: delay between refreshes while the node is online.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Polled mode: delay between refreshes while the node is offline.
    #[serde(default = "default_offline_poll_interval_ms")]
    pub offline_poll_interval_ms: u64,

    /// Upper bound on subscriber sends in flight per broadcast.
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,

    /// Per-request upstream timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Extra attempts for unreachable upstream endpoints.
    #[serde(default = "default_request_retries")]
    pub request_retries: u32,

    /// Events mode: delay before re-establishing a lost subscription.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_listen_port() -> u16 {
    9001
}

fn default_mode() -> DriveMode {
    DriveMode::Events
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_offline_poll_interval_ms() -> u64 {
    5_000
}

fn default_max_concurrent_sends() -> usize {
    cmon_websocket::DEFAULT_MAX_CONCURRENT_SENDS
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_request_retries() -> u32 {
    2
}

fn default_reconnect_delay_ms() -> u64 {
    2_000
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl MonitorConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, MonitorError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| MonitorError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, MonitorError> {
        toml::from_str(s).map_err(|e| MonitorError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, MonitorError> {
        toml::to_string_pretty(self).map_err(|e| MonitorError::Config(e.to_string()))
    }

    /// Reject configurations the monitor cannot run with.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.api_url.trim().is_empty() {
            return Err(MonitorError::Config("api_url is required".into()));
        }
        if self.rpc_url.trim().is_empty() {
            return Err(MonitorError::Config("rpc_url is required".into()));
        }
        if self.max_concurrent_sends == 0 {
            return Err(MonitorError::Config(
                "max_concurrent_sends must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn offline_poll_interval(&self) -> Duration {
        Duration::from_millis(self.offline_poll_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Settings for the HTTP chain source.
    pub fn http_source(&self) -> HttpSourceConfig {
        HttpSourceConfig {
            api_url: self.api_url.clone(),
            rpc_url: self.rpc_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
            retries: self.request_retries,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            rpc_url: String::new(),
            listen_port: default_listen_port(),
            mode: default_mode(),
            poll_interval_ms: default_poll_interval_ms(),
            offline_poll_interval_ms: default_offline_poll_interval_ms(),
            max_concurrent_sends: default_max_concurrent_sends(),
            request_timeout_secs: default_request_timeout_secs(),
            request_retries: default_request_retries(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = MonitorConfig {
            api_url: "https://api.example".into(),
            rpc_url: "https://rpc.example".into(),
            ..Default::default()
        };
        let toml_str = config.to_toml_string().expect("serializable");
        let parsed = MonitorConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.rpc_url, config.rpc_url);
        assert_eq!(parsed.mode, DriveMode::Events);
        assert_eq!(parsed.max_concurrent_sends, 100);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = MonitorConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.listen_port, 9001);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.offline_poll_interval(), Duration::from_secs(5));
        assert_eq!(config.log_format, "human");
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            api_url = "http://localhost:1317"
            rpc_url = "http://localhost:26657"
            mode = "polled"
            max_concurrent_sends = 8
        "#;
        let config = MonitorConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.mode, DriveMode::Polled);
        assert_eq!(config.max_concurrent_sends, 8);
        assert_eq!(config.listen_port, 9001); // default
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_endpoints_fail_validation() {
        let config = MonitorConfig::default();
        assert!(matches!(config.validate(), Err(MonitorError::Config(_))));
    }

    #[test]
    fn zero_send_cap_fails_validation() {
        let config = MonitorConfig {
            api_url: "a".into(),
            rpc_url: "r".into(),
            max_concurrent_sends: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = MonitorConfig::from_toml_file("/nonexistent/cmon.toml");
        assert!(matches!(result, Err(MonitorError::Config(_))));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "rpc_url = \"http://node:26657\"\nlisten_port = 9100").unwrap();
        let config =
            MonitorConfig::from_toml_file(file.path().to_str().unwrap()).expect("should load");
        assert_eq!(config.rpc_url, "http://node:26657");
        assert_eq!(config.listen_port, 9100);
    }

    #[test]
    fn drive_mode_parses() {
        assert_eq!("Polled".parse::<DriveMode>().unwrap(), DriveMode::Polled);
        assert_eq!("events".parse::<DriveMode>().unwrap(), DriveMode::Events);
        assert!("sometimes".parse::<DriveMode>().is_err());
    }
}
