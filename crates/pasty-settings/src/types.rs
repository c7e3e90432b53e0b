//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file may name only the fields it changes.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9090, "webDir": "./web" },
///   "store": { "capacity": 250, "dbPath": "pastytext.db" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PastySettings {
    /// HTTP/WebSocket server settings.
    pub server: ServerSettings,
    /// Paste list retention and persistence.
    pub store: StoreSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl PastySettings {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.store.capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "store.capacity must be at least 1".into(),
            ));
        }
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be at least 1".into(),
            ));
        }
        if self.server.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalSecs must be at least 1".into(),
            ));
        }
        if self.server.heartbeat_timeout_secs < self.server.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "server.heartbeatTimeoutSecs ({}) is shorter than the interval ({})",
                self.server.heartbeat_timeout_secs, self.server.heartbeat_interval_secs
            )));
        }
        Ok(())
    }
}

/// Network and per-connection limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds of client silence before the connection is closed.
    pub heartbeat_timeout_secs: u64,
    /// Per-frame write timeout in milliseconds.
    pub send_timeout_ms: u64,
    /// Outbound frames buffered per connection before it is dropped.
    pub send_queue_capacity: usize,
    /// Largest accepted WebSocket message or `/publish` body, in bytes.
    pub max_message_size: usize,
    /// Directory of static client assets served at `/`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_dir: Option<String>,
    /// Seconds to wait for connections to drain on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            send_timeout_ms: 10_000,
            send_queue_capacity: 64,
            max_message_size: 1024 * 1024,
            web_dir: None,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Paste list retention.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Maximum pastes retained; the oldest is evicted beyond this.
    pub capacity: usize,
    /// SQLite file for persistence. In-memory only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            capacity: 100,
            db_path: None,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` overrides it.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
