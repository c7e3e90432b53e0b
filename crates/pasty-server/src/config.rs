//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use pasty_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the pastytext server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a client after this many seconds without any inbound frame.
    pub heartbeat_timeout_secs: u64,
    /// Per-frame write timeout in milliseconds.
    pub send_timeout_ms: u64,
    /// Outbound frames queued per connection before it is dropped.
    pub send_queue_capacity: usize,
    /// Max WebSocket message and `/publish` body size in bytes.
    pub max_message_size: usize,
    /// Static asset directory served for unmatched paths.
    pub web_dir: Option<PathBuf>,
    /// How long shutdown waits for the HTTP server to drain.
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    /// Heartbeat interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Heartbeat timeout.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// Per-frame write timeout.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Shutdown drain timeout.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            send_timeout_ms: 10_000,
            send_queue_capacity: 64,
            max_message_size: 1024 * 1024, // 1 MB
            web_dir: None,
            shutdown_timeout_secs: 10,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            max_connections: s.max_connections,
            heartbeat_interval_secs: s.heartbeat_interval_secs,
            heartbeat_timeout_secs: s.heartbeat_timeout_secs,
            send_timeout_ms: s.send_timeout_ms,
            send_queue_capacity: s.send_queue_capacity,
            max_message_size: s.max_message_size,
            web_dir: s.web_dir.as_ref().map(PathBuf::from),
            shutdown_timeout_secs: s.shutdown_timeout_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_on_any_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn default_send_timeout_is_ten_seconds() {
        assert_eq!(ServerConfig::default().send_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn duration_helpers() {
        let cfg = ServerConfig {
            heartbeat_interval_secs: 5,
            heartbeat_timeout_secs: 15,
            shutdown_timeout_secs: 2,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(5));
        assert_eq!(cfg.heartbeat_timeout(), Duration::from_secs(15));
        assert_eq!(cfg.shutdown_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn from_settings_copies_fields() {
        let settings = ServerSettings {
            port: 9000,
            web_dir: Some("./web".into()),
            send_queue_capacity: 8,
            ..ServerSettings::default()
        };
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.web_dir, Some(PathBuf::from("./web")));
        assert_eq!(cfg.send_queue_capacity, 8);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.host, cfg.host);
        assert_eq!(back.max_connections, cfg.max_connections);
        assert_eq!(back.send_timeout_ms, cfg.send_timeout_ms);
    }
}
