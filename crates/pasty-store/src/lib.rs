//! # pasty-store
//!
//! The shared paste list and the identity name generator.
//!
//! - [`PasteStore`]: newest-first, capacity-bounded list with monotonically
//!   increasing IDs. Not synchronized; the server wraps it in a mutex.
//! - [`PasteRepository`]: optional SQLite write-through so the list survives
//!   restarts.
//! - [`names`]: `ADJECTIVE-NOUN` friendly names for `/id`.

#![deny(unsafe_code)]

pub mod errors;
pub mod names;
pub mod paste;
pub mod repository;
pub mod store;

pub use errors::StoreError;
pub use paste::{NewPaste, Paste, PasteId};
pub use repository::PasteRepository;
pub use store::PasteStore;
