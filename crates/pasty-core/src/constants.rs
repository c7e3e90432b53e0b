//! Package-level and wire-level constants.

/// Current version of pastytext (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WebSocket subprotocol clients must negotiate on `/ws`.
pub const SUBPROTOCOL: &str = "pastytextProtocol";

/// Close codes the server sends. Only [`close_codes::GOING_AWAY`] tells the
/// browser client not to reconnect.
pub mod close_codes {
    /// Intentional shutdown. Clients do not retry.
    pub const GOING_AWAY: u16 = 1001;
    /// Subprotocol was not negotiated.
    pub const POLICY_VIOLATION: u16 = 1008;
    /// Inbound frame was not a valid client message.
    pub const INVALID_PAYLOAD: u16 = 1007;
    /// Heartbeat timeout or write failure.
    pub const INTERNAL_ERROR: u16 = 1011;
    /// Outbound queue overflowed.
    pub const TRY_AGAIN_LATER: u16 = 1013;
}
