//! Server error types.

use pasty_store::StoreError;
use thiserror::Error;

/// Errors from starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The bound listener could not report its address.
    #[error("listener address unavailable: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// A paste feed operation run off the async runtime failed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The store rejected the mutation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The blocking task panicked or was cancelled.
    #[error("paste feed task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A client frame that cannot be interpreted. Closes the connection with 1007.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not JSON, or a field has the wrong type.
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),

    /// Valid JSON that is not an object.
    #[error("message must be a JSON object")]
    NotAnObject,

    /// Binary frame whose bytes are not UTF-8.
    #[error("binary frame is not valid UTF-8")]
    NotUtf8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_names_address() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:80".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("127.0.0.1:80"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn feed_error_wraps_store_error() {
        let err = FeedError::from(StoreError::IdRegression {
            assigned: 1,
            expected: 2,
        });
        assert_eq!(
            err.to_string(),
            "database assigned paste id 1, expected at least 2"
        );
    }

    #[test]
    fn protocol_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ProtocolError::from(json_err);
        assert!(err.to_string().starts_with("invalid message"));
    }
}
