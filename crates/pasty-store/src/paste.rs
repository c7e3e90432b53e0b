//! Paste records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Paste identifier. Strictly increasing in insertion order, never reused.
pub type PasteId = i64;

/// One shared clipboard entry.
///
/// Serialized with `PascalCase` keys (`Id`, `User`, `Text`, `CreatedAt`,
/// `Network`, `Device`), which is what the browser client reads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Paste {
    /// Assigned by the store.
    pub id: PasteId,
    /// Friendly name of the author; may be empty.
    pub user: String,
    /// Clipboard content.
    pub text: String,
    /// When the store accepted the paste.
    pub created_at: DateTime<Utc>,
    /// Network address the paste was submitted from.
    pub network: String,
    /// `<OS>-<Browser>` of the submitting client; empty when unknown.
    #[serde(default)]
    pub device: String,
}

/// Input for [`crate::PasteStore::add`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewPaste {
    /// Author's friendly name.
    pub user: String,
    /// Clipboard content.
    pub text: String,
    /// Submitter's network address.
    pub network: String,
    /// Submitter's `<OS>-<Browser>` label.
    pub device: String,
}

impl NewPaste {
    /// Build a paste submission.
    pub fn new(user: impl Into<String>, text: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            text: text.into(),
            network: network.into(),
            device: String::new(),
        }
    }

    /// Attach the submitting client's device label.
    #[must_use]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }
}
