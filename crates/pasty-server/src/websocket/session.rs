//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use pasty_core::ConnectionId;
use pasty_core::constants::{SUBPROTOCOL, close_codes};
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::{ClientConnection, CloseReason};
use super::handler::{binary_frame_text, handle_message};
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::config::ServerConfig;
use crate::feed::PasteFeed;
use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
    WS_MALFORMED_MESSAGES_TOTAL, WS_SESSION_DURATION_SECONDS,
};

const MIN_TICK: Duration = Duration::from_millis(1);

/// Per-session timing and queue limits.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    /// Outbound frames buffered before the client counts as slow.
    pub send_queue_capacity: usize,
    /// Timeout for each socket write.
    pub send_timeout: Duration,
    /// Ping and liveness check period.
    pub heartbeat_interval: Duration,
    /// Silence allowed before the client is closed.
    pub heartbeat_timeout: Duration,
}

impl From<&ServerConfig> for SessionLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            send_queue_capacity: config.send_queue_capacity.max(1),
            send_timeout: config.send_timeout(),
            heartbeat_interval: config.heartbeat_interval().max(MIN_TICK),
            heartbeat_timeout: config.heartbeat_timeout(),
        }
    }
}

/// Where a client connected from, recorded on each paste it adds.
#[derive(Debug, Clone, Default)]
pub struct ClientOrigin {
    /// Observed network address.
    pub network: String,
    /// `<OS>-<Browser>` label from the upgrade request.
    pub device: String,
}

/// Whether the upgrade negotiated `pastytextProtocol`.
pub fn negotiated_subprotocol(ws: &WebSocket) -> bool {
    ws.protocol()
        .is_some_and(|p| p.as_bytes() == SUBPROTOCOL.as_bytes())
}

/// Run a WebSocket session for a connected client.
///
/// 1. Rejects clients that did not negotiate the subprotocol (1008)
/// 2. Registers with the feed, which queues the current list
/// 3. Applies inbound `add` / `delete` messages
/// 4. Forwards queued lists and periodic pings through the writer task
/// 5. Closes with the recorded reason and unregisters
#[instrument(
    skip_all,
    fields(client_id = %client_id, network = %origin.network, device = %origin.device)
)]
pub async fn run_ws_session(
    mut ws: WebSocket,
    client_id: ConnectionId,
    origin: ClientOrigin,
    feed: Arc<PasteFeed>,
    limits: SessionLimits,
    shutdown: CancellationToken,
) {
    if !negotiated_subprotocol(&ws) {
        warn!("client did not negotiate {SUBPROTOCOL}, closing");
        counter!(WS_DISCONNECTIONS_TOTAL, "reason" => "policy_violation").increment(1);
        let frame = CloseFrame {
            code: close_codes::POLICY_VIOLATION,
            reason: Utf8Bytes::from_static("subprotocol pastytextProtocol required"),
        };
        let _ = time::timeout(limits.send_timeout, ws.send(Message::Close(Some(frame)))).await;
        return;
    }

    let (ws_tx, mut ws_rx) = ws.split();
    let (send_tx, send_rx) = mpsc::channel::<Arc<str>>(limits.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(client_id, origin.network, send_tx));

    let started = Instant::now();
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let writer = tokio::spawn(write_loop(ws_tx, send_rx, connection.clone(), limits));
    let heartbeat = {
        let conn = connection.clone();
        tokio::spawn(async move {
            let result = run_heartbeat(
                conn.clone(),
                limits.heartbeat_interval,
                limits.heartbeat_timeout,
                conn.close_token(),
            )
            .await;
            if result == HeartbeatResult::TimedOut {
                warn!(
                    silent_secs = conn.last_seen_elapsed().as_secs(),
                    "client unresponsive, disconnecting"
                );
                conn.close(CloseReason::Unresponsive);
            }
        })
    };

    if !feed.spawn_attach(connection.clone()).await {
        debug!("initial paste list not queued");
    }

    read_loop(&mut ws_rx, &connection, &origin.device, &feed, &shutdown).await;

    // No-op if a reason was already recorded; stops writer and heartbeat.
    connection.close(CloseReason::ClientClosed);
    let _ = writer.await;
    let _ = heartbeat.await;
    let _ = feed.detach(&connection.id);

    let reason = connection
        .close_reason()
        .unwrap_or(CloseReason::ClientClosed);
    info!(
        reason = reason.label(),
        code = reason.code(),
        dropped_messages = connection.drop_count(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.label()).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_SESSION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

async fn read_loop(
    ws_rx: &mut SplitStream<WebSocket>,
    connection: &ClientConnection,
    device: &str,
    feed: &Arc<PasteFeed>,
    shutdown: &CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            () = connection.closed() => return,
            () = shutdown.cancelled() => {
                connection.close(CloseReason::ServerShutdown);
                return;
            }
            frame = ws_rx.next() => frame,
        };

        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "websocket read failed");
                connection.close(CloseReason::ClientClosed);
                return;
            }
            None => {
                connection.close(CloseReason::ClientClosed);
                return;
            }
        };
        connection.mark_alive();

        let text = match &msg {
            Message::Text(text) => Ok(text.as_str()),
            Message::Binary(data) => binary_frame_text(data),
            Message::Close(frame) => {
                info!(code = ?frame.as_ref().map(|f| f.code), "client sent close frame");
                connection.close(CloseReason::ClientClosed);
                return;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };
        let result = match text {
            Ok(text) => handle_message(text, &connection.network, device, feed).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => debug!(?outcome, "client message handled"),
            Err(e) => {
                warn!(error = %e, "malformed client message, closing");
                counter!(WS_MALFORMED_MESSAGES_TOTAL).increment(1);
                connection.close(CloseReason::InvalidPayload(e.to_string()));
                return;
            }
        }
    }
}

async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<str>>,
    connection: Arc<ClientConnection>,
    limits: SessionLimits,
) {
    let mut ping_interval = time::interval(limits.heartbeat_interval);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    loop {
        let frame = tokio::select! {
            biased;
            () = connection.closed() => break,
            msg = send_rx.recv() => match msg {
                Some(text) => Message::Text(String::from(&*text).into()),
                None => {
                    connection.close(CloseReason::SendFailed);
                    break;
                }
            },
            _ = ping_interval.tick() => Message::Ping(Bytes::new()),
        };

        match time::timeout(limits.send_timeout, ws_tx.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "websocket write failed");
                connection.close(CloseReason::SendFailed);
                break;
            }
            Err(_) => {
                warn!(
                    timeout_ms = limits.send_timeout.as_millis(),
                    "websocket write timed out"
                );
                connection.close(CloseReason::SendFailed);
                break;
            }
        }
    }

    let reason = connection
        .close_reason()
        .unwrap_or(CloseReason::ClientClosed);
    let farewell = async {
        if reason != CloseReason::ClientClosed {
            let frame = CloseFrame {
                code: reason.code(),
                reason: reason.text().into(),
            };
            ws_tx.send(Message::Close(Some(frame))).await?;
        }
        ws_tx.close().await
    };
    match time::timeout(limits.send_timeout, farewell).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "close handshake failed"),
        Err(_) => debug!("close handshake timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_from_config() {
        let config = ServerConfig {
            send_queue_capacity: 8,
            send_timeout_ms: 250,
            heartbeat_interval_secs: 5,
            heartbeat_timeout_secs: 15,
            ..ServerConfig::default()
        };
        let limits = SessionLimits::from(&config);
        assert_eq!(limits.send_queue_capacity, 8);
        assert_eq!(limits.send_timeout, Duration::from_millis(250));
        assert_eq!(limits.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(limits.heartbeat_timeout, Duration::from_secs(15));
    }

    #[test]
    fn limits_clamp_zero_values() {
        let config = ServerConfig {
            send_queue_capacity: 0,
            heartbeat_interval_secs: 0,
            ..ServerConfig::default()
        };
        let limits = SessionLimits::from(&config);
        assert_eq!(limits.send_queue_capacity, 1);
        assert!(limits.heartbeat_interval > Duration::ZERO);
    }
}
