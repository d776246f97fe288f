//! Reverie core domain layer.
//!
//! This crate holds the "pure" models and contracts the journaling core
//! operates on, independent of any specific storage, crypto, or network
//! implementation:
//!
//! - `error`: the shared [`ReverieError`] taxonomy
//! - `entry`: journal entries and the plaintext/ciphertext body union
//! - `session`: entry groupings stored as references, plus the legacy
//!   embedded-entries migration
//! - `store`: the persistence provider contract ([`store::JournalStore`])
//! - `analysis`: analysis result types, fingerprints, and the remote
//!   sentiment backend contract

pub mod analysis;
pub mod entry;
pub mod error;
pub mod session;
pub mod store;

pub use entry::{Entry, EntryBody, EntryUpdate, extract_emojis};
pub use error::{ReverieError, Result};
pub use session::{JournalSession, StoredSession, legacy_to_current};
pub use store::{Collection, JournalStore};

/// Settings key recording whether at-rest encryption is active.
///
/// This is the only settings key the core manages itself; callers may
/// store arbitrary additional keys in the settings collection.
pub const SETTING_ENCRYPTION_ENABLED: &str = "encryptionEnabled";
