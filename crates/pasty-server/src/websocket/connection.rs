//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pasty_core::ConnectionId;
use pasty_core::constants::close_codes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Close frame reasons are limited to 123 bytes by RFC 6455.
pub const MAX_CLOSE_REASON: usize = 123;

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Why a connection was (or is being) closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent a close frame or went away.
    ClientClosed,
    /// Server is shutting down.
    ServerShutdown,
    /// Client sent a message that could not be decoded.
    InvalidPayload(String),
    /// Outbound queue overflowed.
    SlowConsumer,
    /// No inbound frames within the heartbeat timeout.
    Unresponsive,
    /// A write to the socket failed or timed out.
    SendFailed,
}

impl CloseReason {
    /// WebSocket close code sent to the client.
    pub fn code(&self) -> u16 {
        match self {
            Self::ClientClosed | Self::ServerShutdown => close_codes::GOING_AWAY,
            Self::InvalidPayload(_) => close_codes::INVALID_PAYLOAD,
            Self::SlowConsumer => close_codes::TRY_AGAIN_LATER,
            Self::Unresponsive | Self::SendFailed => close_codes::INTERNAL_ERROR,
        }
    }

    /// Short human-readable close reason, at most [`MAX_CLOSE_REASON`] bytes.
    pub fn text(&self) -> String {
        match self {
            Self::ClientClosed => "client closed".into(),
            Self::ServerShutdown => "server shutting down".into(),
            Self::InvalidPayload(detail) => truncate(detail, MAX_CLOSE_REASON).to_owned(),
            Self::SlowConsumer => "client too slow".into(),
            Self::Unresponsive => "heartbeat timeout".into(),
            Self::SendFailed => "write failed".into(),
        }
    }

    /// Label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::ServerShutdown => "shutdown",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::SlowConsumer => "slow_consumer",
            Self::Unresponsive => "heartbeat_timeout",
            Self::SendFailed => "send_failed",
        }
    }
}

/// Represents a connected WebSocket client.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Network address the client connected from.
    pub network: String,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<str>>,
    /// When the last inbound frame was received.
    last_seen: Mutex<Instant>,
    /// Count of messages dropped due to full channel.
    pub dropped_messages: AtomicU64,
    /// First close reason recorded wins.
    close_reason: Mutex<Option<CloseReason>>,
    closed: CancellationToken,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: ConnectionId, network: impl Into<String>, tx: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id,
            network: network.into(),
            tx,
            last_seen: Mutex::new(Instant::now()),
            dropped_messages: AtomicU64::new(0),
            close_reason: Mutex::new(None),
            closed: CancellationToken::new(),
        }
    }

    /// Queue a text frame for the client.
    ///
    /// Never blocks. A full queue closes the connection as a slow consumer;
    /// a closed queue means the writer is gone. Both return `false`.
    pub fn send(&self, message: Arc<str>) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                self.close(CloseReason::SlowConsumer);
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.close(CloseReason::SendFailed);
                false
            }
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection closed. Only the first reason is kept.
    pub fn close(&self, reason: CloseReason) {
        {
            let mut slot = self.close_reason.lock();
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        self.closed.cancel();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection is closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    /// Token cancelled when the connection closes.
    pub fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Reason recorded by the first [`close`](Self::close) call.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.lock().clone()
    }

    /// Record inbound activity (any frame, including pong).
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Duration since the last inbound frame (or connection establishment).
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }
}
