//! Journal session domain model.
//!
//! A session groups the entries produced in one interaction window. It
//! stores entry *references* only — a session never owns entry
//! lifetime, and a referenced entry may later be deleted, in which case
//! resolution skips it.
//!
//! An older on-disk shape embedded full entry records inside the
//! session. That shape is recognized on read via [`StoredSession`] and
//! upgraded by the pure function [`legacy_to_current`]; the current
//! schema is the only one ever written back.

use crate::entry::Entry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A grouping of entries produced in one interaction window, stored as
/// references only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalSession {
    pub id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Ordered entry ids; no duplicates within one session.
    pub entry_refs: Vec<String>,
}

/// Legacy session shape that duplicated full entry bodies into the
/// session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySession {
    pub id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: Option<String>,
    pub entries: Vec<Entry>,
}

/// Either session shape, as decoded from the sessions collection.
///
/// `Current` is tried first; a legacy record cannot satisfy it because
/// `entryRefs` carries no default.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StoredSession {
    Current(JournalSession),
    Legacy(LegacySession),
}

impl StoredSession {
    /// Normalizes either shape to the current reference-only form.
    pub fn into_current(self) -> JournalSession {
        match self {
            StoredSession::Current(session) => session,
            StoredSession::Legacy(legacy) => legacy_to_current(legacy),
        }
    }

    /// True for the legacy embedded-entries shape.
    pub fn is_legacy(&self) -> bool {
        matches!(self, StoredSession::Legacy(_))
    }
}

/// One-shot data-shape upgrade from the legacy embedded-entries session
/// to the reference-only form. Duplicate embedded ids collapse to a
/// single reference, preserving first-seen order.
pub fn legacy_to_current(legacy: LegacySession) -> JournalSession {
    let mut entry_refs = Vec::with_capacity(legacy.entries.len());
    for entry in &legacy.entries {
        if !entry_refs.contains(&entry.id) {
            entry_refs.push(entry.id.clone());
        }
    }
    JournalSession {
        id: legacy.id,
        start_time: legacy.start_time,
        end_time: legacy.end_time,
        summary: legacy.summary,
        entry_refs,
    }
}

impl JournalSession {
    /// Creates a new open session referencing the given entry ids,
    /// de-duplicated preserving order.
    pub fn new(id: String, entry_ids: impl IntoIterator<Item = String>) -> Self {
        let mut entry_refs: Vec<String> = Vec::new();
        for id in entry_ids {
            if !entry_refs.contains(&id) {
                entry_refs.push(id);
            }
        }
        Self {
            id,
            start_time: Utc::now(),
            end_time: None,
            summary: None,
            entry_refs,
        }
    }
}
