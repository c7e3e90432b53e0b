//! Heartbeat liveness monitoring.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client sent nothing within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Watch a connection for inbound activity.
///
/// Every `interval` the time since the last inbound frame is compared with
/// `timeout`. Pings themselves are sent by the session writer; any frame the
/// client sends back (pong or data) counts as activity.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut check_interval = time::interval(interval);
    check_interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                if connection.last_seen_elapsed() >= timeout {
                    return HeartbeatResult::TimedOut;
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pasty_core::ConnectionId;
    use tokio::sync::mpsc;

    fn make_connection() -> Arc<ClientConnection> {
        let (tx, _rx) = mpsc::channel(4);
        Arc::new(ClientConnection::new(
            ConnectionId::from("hb_conn"),
            "127.0.0.1",
            tx,
        ))
    }

    #[tokio::test]
    async fn heartbeat_cancelled() {
        let conn = make_connection();
        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();

        let handle = tokio::spawn(async move {
            run_heartbeat(
                conn,
                Duration::from_secs(100),
                Duration::from_secs(300),
                cancel2,
            )
            .await
        });

        cancel.cancel();
        let result = handle.await.unwrap();
        assert_eq!(result, HeartbeatResult::Cancelled);
    }

    #[tokio::test]
    async fn silent_client_times_out() {
        let conn = make_connection();
        let result = run_heartbeat(
            conn,
            Duration::from_millis(10),
            Duration::from_millis(30),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result, HeartbeatResult::TimedOut);
    }

    #[tokio::test]
    async fn active_client_stays_connected() {
        let conn = make_connection();
        let conn2 = conn.clone();
        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();

        let handle = tokio::spawn(async move {
            run_heartbeat(
                conn2,
                Duration::from_millis(20),
                Duration::from_millis(200),
                cancel2,
            )
            .await
        });

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(30)).await;
            conn.mark_alive();
        }

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test]
    async fn connection_close_token_cancels_heartbeat() {
        let conn = make_connection();
        let token = conn.close_token();
        let handle = tokio::spawn(run_heartbeat(
            conn.clone(),
            Duration::from_secs(60),
            Duration::from_secs(180),
            token,
        ));

        tokio::time::sleep(Duration::from_millis(10)).await;
        conn.close(super::super::connection::CloseReason::ClientClosed);
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }
}
