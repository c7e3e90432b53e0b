//! Fan-out of serialized paste lists to connected clients.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use parking_lot::RwLock;
use pasty_core::ConnectionId;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use crate::metrics::WS_BROADCAST_DROPS_TOTAL;

/// Result of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections that accepted the frame.
    pub delivered: usize,
    /// Connections dropped because their queue was full or closed.
    pub dropped: usize,
}

/// Registry of open connections.
///
/// Every method is synchronous and non-blocking so the paste feed can call
/// it while holding the store lock.
pub struct BroadcastManager {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
}

impl BroadcastManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection.
    pub fn add(&self, connection: Arc<ClientConnection>) {
        let _ = self
            .connections
            .write()
            .insert(connection.id.clone(), connection);
    }

    /// Unregister a connection. Returns whether it was registered.
    pub fn remove(&self, connection_id: &ConnectionId) -> bool {
        self.connections.write().remove(connection_id).is_some()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Queue a frame for one connection. A failed send unregisters it.
    pub fn send_to(&self, connection_id: &ConnectionId, payload: Arc<str>) -> bool {
        let Some(conn) = self.connections.read().get(connection_id).cloned() else {
            return false;
        };
        if conn.send(payload) {
            true
        } else {
            self.drop_connection(&conn);
            false
        }
    }

    /// Queue a frame for every registered connection.
    ///
    /// Never waits on a client. Connections whose queue is full or closed are
    /// closed (by [`ClientConnection::send`]) and unregistered here.
    pub fn broadcast_all(&self, payload: &Arc<str>) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();
        {
            let conns = self.connections.read();
            for conn in conns.values() {
                if conn.send(Arc::clone(payload)) {
                    report.delivered += 1;
                } else {
                    failed.push(Arc::clone(conn));
                }
            }
        }
        report.dropped = failed.len();
        for conn in &failed {
            self.drop_connection(conn);
        }
        debug!(
            recipients = report.delivered,
            dropped = report.dropped,
            bytes = payload.len(),
            "broadcast paste list"
        );
        report
    }

    fn drop_connection(&self, conn: &ClientConnection) {
        if self.remove(&conn.id) {
            counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
            warn!(
                client_id = %conn.id,
                reason = conn.close_reason().map_or("unknown", |r| r.label()),
                dropped_messages = conn.drop_count(),
                "dropped client from broadcast"
            );
        }
    }
}

impl Default for BroadcastManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::CloseReason;
    use tokio::sync::mpsc;

    fn make_conn(id: &str, capacity: usize) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = Arc::new(ClientConnection::new(ConnectionId::from(id), "127.0.0.1", tx));
        (conn, rx)
    }

    #[test]
    fn add_and_remove() {
        let bm = BroadcastManager::new();
        let (conn, _rx) = make_conn("c1", 4);
        bm.add(conn);
        assert_eq!(bm.connection_count(), 1);
        assert!(bm.remove(&ConnectionId::from("c1")));
        assert!(!bm.remove(&ConnectionId::from("c1")));
        assert_eq!(bm.connection_count(), 0);
    }

    #[test]
    fn broadcast_reaches_every_connection() {
        let bm = BroadcastManager::new();
        let (c1, mut rx1) = make_conn("c1", 4);
        let (c2, mut rx2) = make_conn("c2", 4);
        bm.add(c1);
        bm.add(c2);

        let report = bm.broadcast_all(&Arc::from("[]"));
        assert_eq!(report, BroadcastReport { delivered: 2, dropped: 0 });
        assert_eq!(rx1.try_recv().unwrap().as_ref(), "[]");
        assert_eq!(rx2.try_recv().unwrap().as_ref(), "[]");
    }

    #[test]
    fn broadcast_with_no_connections() {
        let bm = BroadcastManager::new();
        let report = bm.broadcast_all(&Arc::from("[]"));
        assert_eq!(report, BroadcastReport::default());
    }

    #[test]
    fn full_queue_drops_only_that_connection() {
        let bm = BroadcastManager::new();
        let (slow, _slow_rx) = make_conn("slow", 1);
        let (fast, mut fast_rx) = make_conn("fast", 8);
        bm.add(slow.clone());
        bm.add(fast);

        let first = bm.broadcast_all(&Arc::from("1"));
        assert_eq!(first.delivered, 2);
        let second = bm.broadcast_all(&Arc::from("2"));
        assert_eq!(second, BroadcastReport { delivered: 1, dropped: 1 });

        assert_eq!(bm.connection_count(), 1);
        assert!(!bm.remove(&ConnectionId::from("slow")));
        assert_eq!(slow.close_reason(), Some(CloseReason::SlowConsumer));
        assert_eq!(fast_rx.try_recv().unwrap().as_ref(), "1");
        assert_eq!(fast_rx.try_recv().unwrap().as_ref(), "2");
    }

    #[test]
    fn closed_queue_is_unregistered() {
        let bm = BroadcastManager::new();
        let (conn, rx) = make_conn("gone", 4);
        bm.add(conn);
        drop(rx);
        let report = bm.broadcast_all(&Arc::from("[]"));
        assert_eq!(report.dropped, 1);
        assert_eq!(bm.connection_count(), 0);
    }

    #[test]
    fn send_to_targets_one_connection() {
        let bm = BroadcastManager::new();
        let (c1, mut rx1) = make_conn("c1", 4);
        let (c2, mut rx2) = make_conn("c2", 4);
        bm.add(c1);
        bm.add(c2);

        assert!(bm.send_to(&ConnectionId::from("c1"), Arc::from("hi")));
        assert_eq!(rx1.try_recv().unwrap().as_ref(), "hi");
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn send_to_unknown_connection() {
        let bm = BroadcastManager::new();
        assert!(!bm.send_to(&ConnectionId::from("nope"), Arc::from("hi")));
    }
}
