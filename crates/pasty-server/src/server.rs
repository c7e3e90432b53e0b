//! `PastyServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{DefaultBodyLimit, State, WebSocketUpgrade};
use axum::http::{Extensions, HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use pasty_core::ConnectionId;
use pasty_core::constants::SUBPROTOCOL;
use pasty_store::PasteStore;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::device::device_label;
use crate::errors::ServerError;
use crate::feed::PasteFeed;
use crate::health::{self, HealthResponse};
use crate::identity::{self, client_address, peer_address};
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::publish;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::BroadcastManager;
use crate::websocket::session::{ClientOrigin, SessionLimits, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Paste list and connection registry.
    pub feed: Arc<PasteFeed>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// One permit per allowed WebSocket session, held from upgrade to close.
    pub session_slots: Arc<Semaphore>,
}

/// The pastytext server.
pub struct PastyServer {
    config: Arc<ServerConfig>,
    feed: Arc<PasteFeed>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
    session_slots: Arc<Semaphore>,
}

impl PastyServer {
    /// Create a server around `store`.
    pub fn new(config: ServerConfig, store: PasteStore) -> Self {
        let hub = Arc::new(BroadcastManager::new());
        let session_slots = Arc::new(Semaphore::new(
            config.max_connections.min(Semaphore::MAX_PERMITS),
        ));
        Self {
            session_slots,
            config: Arc::new(config),
            feed: Arc::new(PasteFeed::new(store, hub)),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            feed: self.feed.clone(),
            shutdown: self.shutdown.clone(),
            config: self.config.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            session_slots: self.session_slots.clone(),
        };

        let mut router = Router::new()
            .route("/id", get(identity::id_handler))
            .route("/publish", post(publish::publish_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler));
        if let Some(dir) = &self.config.web_dir {
            router = router.fallback_service(ServeDir::new(dir));
        }

        router
            .with_state(state)
            .layer(DefaultBodyLimit::max(self.config.max_message_size))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve in a background task.
    ///
    /// Returns the bound address and the server task. The task ends once
    /// [`ShutdownCoordinator::shutdown`] fires and in-flight HTTP requests
    /// drain.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local = listener.local_addr().map_err(ServerError::LocalAddr)?;

        let app = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(token.cancelled_owned());
            if let Err(e) = serve.await {
                error!(error = %e, "server error");
            }
        });

        info!(
            addr = %local,
            static_assets = self.config.web_dir.is_some(),
            "pastytext listening"
        );
        Ok((local, handle))
    }

    /// Shut down: close every session with 1001, then wait for the server
    /// task and the sessions to finish within the configured timeout.
    pub async fn stop(&self, server: JoinHandle<()>) -> bool {
        let hub = self.feed.hub().clone();
        let sessions = tokio::spawn(async move {
            while hub.connection_count() > 0 {
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        });
        let drained = self
            .shutdown
            .graceful_shutdown(vec![server, sessions], self.config.shutdown_timeout())
            .await;
        info!(drained, "server stopped");
        drained
    }

    /// Get the paste feed.
    pub fn feed(&self) -> &Arc<PasteFeed> {
        &self.feed
    }

    /// Get the connection registry.
    pub fn broadcast(&self) -> &Arc<BroadcastManager> {
        self.feed.hub()
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.feed.hub().connection_count();
    Json(health::health_check(
        state.start_time,
        connections,
        state.feed.len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            crate::metrics::render(handle),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// GET /ws
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
) -> Response {
    let Ok(slot) = state.session_slots.clone().try_acquire_owned() else {
        warn!(
            connections = state.feed.hub().connection_count(),
            max = state.config.max_connections,
            "connection limit reached, refusing upgrade"
        );
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    };

    let origin = ClientOrigin {
        network: client_address(&headers, peer_address(&extensions)),
        device: device_label(&headers),
    };
    let client_id = ConnectionId::new();
    let limits = SessionLimits::from(state.config.as_ref());
    let shutdown = state.shutdown.token();
    let feed = state.feed;

    ws.protocols([SUBPROTOCOL])
        .max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            run_ws_session(socket, client_id, origin, feed, limits, shutdown).await;
            drop(slot);
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Method, Request};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    fn make_server() -> PastyServer {
        PastyServer::new(ServerConfig::default(), PasteStore::new(10))
    }

    async fn body_string(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn request(method: Method, uri: &str, body: impl Into<Body>) -> Request<Body> {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .body(body.into())
            .unwrap();
        let peer: SocketAddr = "192.168.0.9:40000".parse().unwrap();
        let _ = req.extensions_mut().insert(ConnectInfo(peer));
        req
    }

    #[tokio::test]
    async fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert_eq!(server.broadcast().connection_count(), 0);
        assert!(!server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn health_endpoint_reports_counters() {
        let server = make_server();
        let _ = server
            .feed()
            .add(pasty_store::NewPaste::new("a", "b", "c"))
            .unwrap();

        let resp = server
            .router()
            .oneshot(request(Method::GET, "/health", Body::empty()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["pastes"], 1);
        assert_eq!(json["connections"], 0);
    }

    #[tokio::test]
    async fn id_returns_name_and_peer_address() {
        let resp = make_server()
            .router()
            .oneshot(request(Method::GET, "/id", Body::empty()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(json["ipaddress"], "192.168.0.9");
        let name = json["friendly_name"].as_str().unwrap();
        assert!(name.contains('-'));
    }

    #[tokio::test]
    async fn id_honors_forwarded_for() {
        let mut req = request(Method::GET, "/id", Body::empty());
        let _ = req
            .headers_mut()
            .insert("x-forwarded-for", "203.0.113.5".parse().unwrap());
        let resp = make_server().router().oneshot(req).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(json["ipaddress"], "203.0.113.5");
    }

    #[tokio::test]
    async fn id_rejects_other_methods() {
        let resp = make_server()
            .router()
            .oneshot(request(Method::POST, "/id", Body::empty()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn publish_adds_paste() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(request(Method::POST, "/publish?user=curl", "from http"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let list = server.feed().snapshot();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].text, "from http");
        assert_eq!(list[0].user, "curl");
        assert_eq!(list[0].network, "192.168.0.9");
    }

    #[tokio::test]
    async fn publish_without_user_records_empty_user() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(request(Method::POST, "/publish", "anon"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(server.feed().snapshot()[0].user, "");
    }

    #[tokio::test]
    async fn publish_empty_body_is_bad_request() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(request(Method::POST, "/publish", Body::empty()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(server.feed().is_empty());
    }

    #[tokio::test]
    async fn publish_oversized_body_is_rejected() {
        let config = ServerConfig {
            max_message_size: 16,
            ..ServerConfig::default()
        };
        let server = PastyServer::new(config, PasteStore::new(10));
        let resp = server
            .router()
            .oneshot(request(Method::POST, "/publish", "x".repeat(64)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(server.feed().is_empty());
    }

    #[tokio::test]
    async fn ws_without_upgrade_is_client_error() {
        let resp = make_server()
            .router()
            .oneshot(request(Method::GET, "/ws", Body::empty()))
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_not_found() {
        let resp = make_server()
            .router()
            .oneshot(request(Method::GET, "/metrics", Body::empty()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_with_recorder_renders_text() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let server = make_server().with_metrics(handle);
        let resp = server
            .router()
            .oneshot(request(Method::GET, "/metrics", Body::empty()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn unknown_route_returns_404_without_web_dir() {
        let resp = make_server()
            .router()
            .oneshot(request(Method::GET, "/nonexistent", Body::empty()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serves_static_files_from_web_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>pastytext</h1>").unwrap();
        let config = ServerConfig {
            web_dir: Some(dir.path().to_path_buf()),
            ..ServerConfig::default()
        };
        let router = PastyServer::new(config, PasteStore::new(10)).router();

        let resp = router
            .clone()
            .oneshot(request(Method::GET, "/", Body::empty()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_string(resp).await.contains("pastytext"));

        let health = router
            .oneshot(request(Method::GET, "/health", Body::empty()))
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }

    #[test]
    fn session_slots_match_max_connections() {
        let config = ServerConfig {
            max_connections: 3,
            ..ServerConfig::default()
        };
        let server = PastyServer::new(config, PasteStore::new(10));
        assert_eq!(server.session_slots.available_permits(), 3);
    }

    #[tokio::test]
    async fn publish_records_user_agent_device() {
        let server = make_server();
        let mut req = request(Method::POST, "/publish", "from phone");
        let _ = req.headers_mut().insert(
            header::USER_AGENT,
            "Mozilla/5.0 (Linux; Android 14) Chrome/126.0.0.0 Mobile Safari/537.36"
                .parse()
                .unwrap(),
        );
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(server.feed().snapshot()[0].device, "Android-Chrome");
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port_and_stops() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert!(server.stop(handle).await);
        assert!(server.shutdown().is_shutting_down());
    }
}
