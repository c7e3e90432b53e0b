//! # pasty-server
//!
//! Axum HTTP + `WebSocket` server for the shared paste list.
//!
//! - `GET /id`: friendly name + observed address
//! - `POST /publish`: add a paste over plain HTTP
//! - `GET /ws`: live paste list (subprotocol `pastytextProtocol`)
//! - `GET /health`, `GET /metrics`, static client assets
//! - Graceful shutdown via `CancellationToken`; sessions close with 1001

#![deny(unsafe_code)]

pub mod config;
pub mod device;
pub mod errors;
pub mod feed;
pub mod health;
pub mod identity;
pub mod metrics;
pub mod publish;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use feed::PasteFeed;
pub use server::PastyServer;
