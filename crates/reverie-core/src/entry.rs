//! Journal entry domain model.
//!
//! An [`Entry`] is one journaling record. Its body is an explicit
//! tagged union: exactly one of plaintext text or ciphertext bytes is
//! ever populated, and the `encrypted` flag must agree with the active
//! variant. Call sites pattern-match on [`EntryBody`] instead of
//! inspecting loosely-typed fields.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The body of an entry: either user-readable text or an authenticated
/// ciphertext with the nonce needed to decrypt it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryBody {
    /// Unencrypted entry content.
    Plaintext { text: String },
    /// AEAD ciphertext plus the per-encryption nonce, both encoded as
    /// base64 in the serialized form so the record stays binary-safe
    /// inside JSON.
    Ciphertext {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        #[serde(with = "base64_bytes")]
        nonce: Vec<u8>,
    },
}

impl EntryBody {
    /// Returns the plaintext text, or `None` for ciphertext bodies.
    pub fn as_plaintext(&self) -> Option<&str> {
        match self {
            EntryBody::Plaintext { text } => Some(text),
            EntryBody::Ciphertext { .. } => None,
        }
    }

    /// True for the `Ciphertext` variant.
    pub fn is_ciphertext(&self) -> bool {
        matches!(self, EntryBody::Ciphertext { .. })
    }
}

/// One journaling record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Opaque unique identifier, generated at creation, immutable.
    pub id: String,
    /// Plaintext or ciphertext content.
    pub body: EntryBody,
    /// Must match the active `body` variant. Kept explicit so callers
    /// (and the export format) can detect the locked state without
    /// pattern-matching the body.
    pub encrypted: bool,
    /// Ordered sequence of extracted symbol tokens (may be empty).
    #[serde(default)]
    pub emojis: Vec<String>,
    /// Optional user/derived metadata, never encrypted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    /// Logical event time (user-facing "when written").
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entry {
    /// Creates a new plaintext entry with a fresh id and current
    /// timestamps.
    pub fn new_plaintext(
        content: impl Into<String>,
        emojis: Vec<String>,
        tags: Option<Vec<String>>,
        mood: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            body: EntryBody::Plaintext {
                text: content.into(),
            },
            encrypted: false,
            emojis,
            tags,
            mood,
            timestamp: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the body with a ciphertext variant, keeping id,
    /// timestamps, and metadata intact.
    pub fn with_ciphertext(mut self, data: Vec<u8>, nonce: Vec<u8>) -> Self {
        self.body = EntryBody::Ciphertext { data, nonce };
        self.encrypted = true;
        self
    }

    /// True when the `encrypted` flag agrees with the body variant.
    pub fn is_consistent(&self) -> bool {
        self.encrypted == self.body.is_ciphertext()
    }
}

/// Partial update applied by `update_entry`; `None` fields are left
/// unchanged.
#[derive(Debug, Clone, Default)]
pub struct EntryUpdate {
    pub content: Option<String>,
    pub emojis: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub mood: Option<String>,
}

/// Extracts emoji symbol tokens from text, in order of appearance.
///
/// Covers the common emoji blocks (Misc Symbols, Dingbats, Emoticons,
/// Symbols & Pictographs, regional indicators). Variation selectors and
/// zero-width joiners are dropped, so joined sequences decompose into
/// their component symbols.
pub fn extract_emojis(text: &str) -> Vec<String> {
    text.chars()
        .filter(|c| {
            let cp = *c as u32;
            matches!(cp,
                0x2600..=0x26FF      // miscellaneous symbols
                | 0x2700..=0x27BF    // dingbats
                | 0x1F1E6..=0x1F1FF  // regional indicators
                | 0x1F300..=0x1F5FF  // symbols & pictographs
                | 0x1F600..=0x1F64F  // emoticons
                | 0x1F680..=0x1F6FF  // transport & map
                | 0x1F900..=0x1F9FF  // supplemental symbols
                | 0x1FA70..=0x1FAFF) // symbols & pictographs extended
        })
        .map(|c| c.to_string())
        .collect()
}

mod base64_bytes {
    //! Serde adapter encoding `Vec<u8>` as standard base64.

    use super::*;
    use serde::{Deserializer, Serializer, de::Error as DeError};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map_err(DeError::custom)
    }
}
