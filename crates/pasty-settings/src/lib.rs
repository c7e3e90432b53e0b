//! # pasty-settings
//!
//! Configuration with layered sources for the pastytext server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`PastySettings::default()`]
//! 2. **User file**: `~/.pastytext/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `PASTY_*` and `DB_FILE` overrides
//!
//! Command-line flags in the server binary are applied on top of the result.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings_from_path, settings_path,
};
pub use types::*;
