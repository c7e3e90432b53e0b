//! `/publish`: add a paste from a plain HTTP POST body.

use axum::extract::{Query, State};
use axum::http::{Extensions, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use pasty_store::NewPaste;
use serde::Deserialize;
use tracing::debug;

use crate::device::device_label;
use crate::identity::{client_address, peer_address};
use crate::server::AppState;

/// Query parameters for `/publish`.
#[derive(Debug, Default, Deserialize)]
pub struct PublishParams {
    /// Author name recorded on the paste.
    #[serde(default)]
    pub user: Option<String>,
}

/// POST /publish
///
/// Body is the raw paste text. Oversized bodies are rejected with 413 by the
/// router's body limit before this runs.
pub async fn publish_handler(
    State(state): State<AppState>,
    Query(params): Query<PublishParams>,
    headers: HeaderMap,
    extensions: Extensions,
    body: String,
) -> Response {
    if body.is_empty() {
        return (StatusCode::BAD_REQUEST, "empty paste").into_response();
    }
    let network = client_address(&headers, peer_address(&extensions));
    let user = params.user.unwrap_or_default();
    let new = NewPaste::new(user, body, network).with_device(device_label(&headers));

    match state.feed.spawn_add(new).await {
        Ok(paste) => {
            debug!(paste_id = paste.id, "paste published over HTTP");
            StatusCode::ACCEPTED.into_response()
        }
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "failed to store paste").into_response(),
    }
}
