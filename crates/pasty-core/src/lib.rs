//! # pasty-core
//!
//! Shared vocabulary for the pastytext crates:
//!
//! - **Constants**: package version, the WebSocket subprotocol token, close codes
//! - **IDs**: [`ids::ConnectionId`] for WebSocket connections
//! - **Logging**: `tracing` subscriber setup used by the server binary

#![deny(unsafe_code)]

pub mod constants;
pub mod ids;
pub mod logging;

pub use ids::ConnectionId;
