//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Call once at startup, before any metric is recorded. Fails if another
/// recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Pastes added total (counter).
pub const PASTES_ADDED_TOTAL: &str = "pastes_added_total";
/// Pastes deleted total (counter).
pub const PASTES_DELETED_TOTAL: &str = "pastes_deleted_total";
/// Retained pastes (gauge).
pub const PASTES_STORED: &str = "pastes_stored";
/// Store write failures total (counter, labels: op).
pub const STORE_ERRORS_TOTAL: &str = "store_errors_total";
/// Friendly names issued total (counter).
pub const IDENTITIES_ISSUED_TOTAL: &str = "identities_issued_total";
/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused because of the connection limit (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Connections dropped by the broadcast hub (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Malformed client messages (counter).
pub const WS_MALFORMED_MESSAGES_TOTAL: &str = "ws_malformed_messages_total";
/// WebSocket session duration seconds (histogram).
pub const WS_SESSION_DURATION_SECONDS: &str = "ws_session_duration_seconds";
