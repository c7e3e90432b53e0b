//! Client message parsing and dispatch to the paste feed.

use std::sync::Arc;

use pasty_store::{NewPaste, PasteId};
use serde::Deserialize;
use tracing::debug;

use crate::errors::ProtocolError;
use crate::feed::PasteFeed;

/// Wire shape of a client message. Every field is optional so that missing
/// fields are ignorable while wrongly typed fields fail to decode.
#[derive(Debug, Deserialize)]
struct RawMessage {
    action: Option<String>,
    user: Option<String>,
    text: Option<String>,
    id: Option<PasteId>,
}

/// A decoded client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `{"action":"add","user":..,"text":..}` with non-empty text.
    Add {
        /// Author name; empty when omitted.
        user: String,
        /// Clipboard content.
        text: String,
    },
    /// `{"action":"delete","id":..}`.
    Delete {
        /// Paste to remove.
        id: PasteId,
    },
    /// Well-formed but not actionable.
    Ignored(IgnoreReason),
}

/// Why a well-formed message was ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// `add` without text.
    EmptyText,
    /// `delete` without an id.
    MissingId,
    /// `action` absent.
    MissingAction,
    /// `action` not recognized.
    UnknownAction(String),
}

/// What handling a message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// A paste was added and broadcast.
    Added(PasteId),
    /// A paste was removed and the list broadcast.
    Deleted(PasteId),
    /// Delete for an id that is not in the list; nothing broadcast.
    NotFound(PasteId),
    /// Message ignored.
    Ignored(IgnoreReason),
    /// The store rejected the mutation (already logged).
    StoreFailed,
}

/// Decode a text frame into a [`ClientMessage`].
pub fn parse_client_message(message: &str) -> Result<ClientMessage, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(message)?;
    if !value.is_object() {
        return Err(ProtocolError::NotAnObject);
    }
    let raw: RawMessage = serde_json::from_value(value)?;

    let parsed = match raw.action.as_deref() {
        Some("add") => match raw.text {
            Some(text) if !text.is_empty() => ClientMessage::Add {
                user: raw.user.unwrap_or_default(),
                text,
            },
            _ => ClientMessage::Ignored(IgnoreReason::EmptyText),
        },
        Some("delete") => match raw.id {
            Some(id) => ClientMessage::Delete { id },
            None => ClientMessage::Ignored(IgnoreReason::MissingId),
        },
        Some(other) => ClientMessage::Ignored(IgnoreReason::UnknownAction(other.to_owned())),
        None => ClientMessage::Ignored(IgnoreReason::MissingAction),
    };
    Ok(parsed)
}

/// Decode a binary frame as UTF-8 text.
pub fn binary_frame_text(bytes: &[u8]) -> Result<&str, ProtocolError> {
    std::str::from_utf8(bytes).map_err(|_| ProtocolError::NotUtf8)
}

/// Parse `message` and apply it to the feed on behalf of a client at
/// `network` using `device`.
///
/// Parsing happens inline; the mutation runs on the blocking pool.
pub async fn handle_message(
    message: &str,
    network: &str,
    device: &str,
    feed: &Arc<PasteFeed>,
) -> Result<MessageOutcome, ProtocolError> {
    let outcome = match parse_client_message(message)? {
        ClientMessage::Add { user, text } => {
            let new = NewPaste::new(user, text, network).with_device(device);
            match feed.spawn_add(new).await {
                Ok(paste) => MessageOutcome::Added(paste.id),
                Err(_) => MessageOutcome::StoreFailed,
            }
        }
        ClientMessage::Delete { id } => match feed.spawn_delete(id).await {
            Ok(true) => MessageOutcome::Deleted(id),
            Ok(false) => MessageOutcome::NotFound(id),
            Err(_) => MessageOutcome::StoreFailed,
        },
        ClientMessage::Ignored(reason) => {
            debug!(?reason, "ignored client message");
            MessageOutcome::Ignored(reason)
        }
    };
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::broadcast::BroadcastManager;
    use pasty_store::PasteStore;

    fn feed() -> Arc<PasteFeed> {
        Arc::new(PasteFeed::new(
            PasteStore::new(10),
            Arc::new(BroadcastManager::new()),
        ))
    }

    #[test]
    fn parse_add() {
        let msg = parse_client_message(r#"{"user":"alice","action":"add","text":"hello"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Add {
                user: "alice".into(),
                text: "hello".into()
            }
        );
    }

    #[test]
    fn parse_add_without_user() {
        let msg = parse_client_message(r#"{"action":"add","text":"hello"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Add {
                user: String::new(),
                text: "hello".into()
            }
        );
    }

    #[test]
    fn parse_add_empty_text_is_ignored() {
        for raw in [
            r#"{"action":"add","text":""}"#,
            r#"{"action":"add","user":"alice"}"#,
            r#"{"action":"add","text":null}"#,
        ] {
            assert_eq!(
                parse_client_message(raw).unwrap(),
                ClientMessage::Ignored(IgnoreReason::EmptyText),
                "{raw}"
            );
        }
    }

    #[test]
    fn parse_delete() {
        let msg = parse_client_message(r#"{"action":"delete","id":7}"#).unwrap();
        assert_eq!(msg, ClientMessage::Delete { id: 7 });
    }

    #[test]
    fn parse_delete_without_id_is_ignored() {
        let msg = parse_client_message(r#"{"action":"delete"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ignored(IgnoreReason::MissingId));
    }

    #[test]
    fn parse_unknown_and_missing_action() {
        assert_eq!(
            parse_client_message(r#"{"action":"rename","id":1}"#).unwrap(),
            ClientMessage::Ignored(IgnoreReason::UnknownAction("rename".into()))
        );
        assert_eq!(
            parse_client_message(r#"{"text":"hi"}"#).unwrap(),
            ClientMessage::Ignored(IgnoreReason::MissingAction)
        );
    }

    #[test]
    fn extra_fields_are_tolerated() {
        let msg = parse_client_message(r#"{"action":"delete","id":1,"extra":true}"#).unwrap();
        assert_eq!(msg, ClientMessage::Delete { id: 1 });
    }

    #[test]
    fn malformed_messages_are_errors() {
        assert!(matches!(
            parse_client_message("not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            parse_client_message(r#"["add","hello"]"#),
            Err(ProtocolError::NotAnObject)
        ));
        assert!(matches!(
            parse_client_message("42"),
            Err(ProtocolError::NotAnObject)
        ));
        assert!(matches!(
            parse_client_message(r#"{"action":"delete","id":"7"}"#),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            parse_client_message(r#"{"action":"add","text":5}"#),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            parse_client_message(r#"{"action":1}"#),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn binary_frames_must_be_utf8() {
        assert_eq!(binary_frame_text(b"{}").unwrap(), "{}");
        assert!(matches!(
            binary_frame_text(&[0xff, 0xfe]),
            Err(ProtocolError::NotUtf8)
        ));
    }

    #[tokio::test]
    async fn handle_add_then_delete() {
        let feed = feed();
        let added = handle_message(
            r#"{"user":"alice","action":"add","text":"hi"}"#,
            "10.0.0.2",
            "Linux-Firefox",
            &feed,
        )
        .await
        .unwrap();
        assert_eq!(added, MessageOutcome::Added(1));
        let snapshot = feed.snapshot();
        assert_eq!(snapshot[0].network, "10.0.0.2");
        assert_eq!(snapshot[0].user, "alice");
        assert_eq!(snapshot[0].device, "Linux-Firefox");

        let deleted = handle_message(r#"{"action":"delete","id":1}"#, "10.0.0.2", "", &feed)
            .await
            .unwrap();
        assert_eq!(deleted, MessageOutcome::Deleted(1));
        assert!(feed.is_empty());
    }

    #[tokio::test]
    async fn handle_delete_missing_id() {
        let feed = feed();
        let outcome = handle_message(r#"{"action":"delete","id":99}"#, "n", "", &feed)
            .await
            .unwrap();
        assert_eq!(outcome, MessageOutcome::NotFound(99));
    }

    #[tokio::test]
    async fn handle_malformed_leaves_store_untouched() {
        let feed = feed();
        assert!(handle_message("{nope", "n", "", &feed).await.is_err());
        assert!(feed.is_empty());
    }
}
