//! `/id`: issue a friendly device name and echo the caller's address.

use std::net::{IpAddr, SocketAddr};

use axum::Json;
use axum::extract::ConnectInfo;
use axum::http::{Extensions, HeaderMap};
use metrics::counter;
use pasty_store::names;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::metrics::IDENTITIES_ISSUED_TOTAL;

/// Header consulted before the socket peer address.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Address reported when neither a forwarded header nor a peer is known.
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// `/id` response body. Identity is stateless; every call draws a new name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// `ADJECTIVE-NOUN`, uppercase.
    pub friendly_name: String,
    /// Address the request was observed from.
    #[serde(rename = "ipaddress")]
    pub ip_address: String,
}

/// Build an identity for a caller at `address`.
pub fn issue_identity(address: String) -> Identity {
    Identity {
        friendly_name: names::generate_name(),
        ip_address: address,
    }
}

/// Peer socket address recorded by `into_make_service_with_connect_info`.
pub fn peer_address(extensions: &Extensions) -> Option<SocketAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Resolve the caller's address: first `X-Forwarded-For` entry, else the
/// peer IP, else [`UNKNOWN_ADDRESS`]. Ports are stripped.
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(value), _) => strip_port(value),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => UNKNOWN_ADDRESS.to_owned(),
    }
}

fn strip_port(value: &str) -> String {
    if let Ok(addr) = value.parse::<SocketAddr>() {
        return addr.ip().to_string();
    }
    if let Ok(ip) = value.parse::<IpAddr>() {
        return ip.to_string();
    }
    value.to_owned()
}

/// GET /id
pub async fn id_handler(headers: HeaderMap, extensions: Extensions) -> Json<Identity> {
    let identity = issue_identity(client_address(&headers, peer_address(&extensions)));
    counter!(IDENTITIES_ISSUED_TOTAL).increment(1);
    debug!(
        friendly_name = %identity.friendly_name,
        network = %identity.ip_address,
        "identity issued"
    );
    Json(identity)
}
