//! Journal use case implementation.
//!
//! `JournalUseCase` is the system of record and the single entry point
//! the UI layer calls. It composes the persistent store and the cipher
//! manager into entry/session/settings CRUD with transparent
//! encryption, resolves session references, toggles bulk encryption,
//! runs deduplication/migration maintenance, and produces
//! export/import snapshots.
//!
//! # Encryption invariant
//!
//! Persisted records always satisfy `encrypted == body.is_ciphertext()`.
//! Values *returned* to callers keep `encrypted` describing the at-rest
//! state: a transparently decrypted entry carries a plaintext body with
//! `encrypted == true`, and an entry returned while the cipher is
//! locked carries its ciphertext body intact so the caller can detect
//! the locked state via the flag.

use crate::analysis::AnalysisEngine;
use chrono::Utc;
use reverie_core::entry::{Entry, EntryBody, EntryUpdate};
use reverie_core::error::{Result, ReverieError};
use reverie_core::session::{JournalSession, StoredSession};
use reverie_core::store::{Collection, JournalStore};
use reverie_core::SETTING_ENCRYPTION_ENABLED;
use reverie_infrastructure::CipherManager;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Self-contained snapshot of the full dataset.
///
/// Entries keep whichever encryption state they had when exported;
/// import performs no re-encryption.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub entries: Vec<Value>,
    pub sessions: Vec<Value>,
    pub settings: HashMap<String, Value>,
}

/// Outcome of a `cleanup_duplicates` pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub removed_entries: usize,
    pub migrated_sessions: usize,
}

/// Advisory dataset statistics; not used for any correctness decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub entry_count: usize,
    pub session_count: usize,
    pub approximate_bytes: usize,
}

/// The storage orchestrator: owns the encrypted/plaintext invariant
/// end-to-end.
pub struct JournalUseCase {
    store: Arc<dyn JournalStore>,
    cipher: Arc<CipherManager>,
    analysis: Arc<AnalysisEngine>,
}

impl JournalUseCase {
    pub fn new(
        store: Arc<dyn JournalStore>,
        cipher: Arc<CipherManager>,
        analysis: Arc<AnalysisEngine>,
    ) -> Self {
        Self {
            store,
            cipher,
            analysis,
        }
    }

    /// Initializes the persistent store and, when a password is
    /// supplied, the cipher manager, recording the resulting encryption
    /// state in settings.
    ///
    /// Calling this more than once is an idempotent no-op: store init
    /// is repeatable and re-deriving the key from the persisted salt
    /// yields the same key.
    pub async fn initialize(&self, password: Option<&str>) -> Result<()> {
        self.store.init().await?;
        match password {
            Some(password) => {
                self.cipher.initialize_with_password(password).await?;
                self.set_setting(SETTING_ENCRYPTION_ENABLED, Value::Bool(true))
                    .await?;
            }
            None => {
                self.set_setting(SETTING_ENCRYPTION_ENABLED, Value::Bool(false))
                    .await?;
            }
        }
        Ok(())
    }

    /// Persists a new entry, encrypting its content when the cipher is
    /// initialized, and invalidates the analysis cache.
    pub async fn save_entry(
        &self,
        content: &str,
        emojis: Vec<String>,
        tags: Option<Vec<String>>,
        mood: Option<String>,
    ) -> Result<Entry> {
        let entry = Entry::new_plaintext(content, emojis, tags, mood);
        let stored = self.seal(entry.clone())?;
        self.store
            .add(Collection::Entries, &stored.id, serde_json::to_value(&stored)?)
            .await?;
        self.analysis.invalidate_all().await;
        tracing::debug!(entry_id = %stored.id, encrypted = stored.encrypted, "entry saved");

        // Return the readable view with the at-rest flag.
        let mut readable = entry;
        readable.encrypted = stored.encrypted;
        Ok(readable)
    }

    /// Looks up one entry, transparently decrypting it when possible.
    ///
    /// A ciphertext entry read while the cipher is *not* initialized is
    /// returned with its ciphertext body intact — the deliberate
    /// "locked" state, not an error.
    pub async fn get_entry(&self, id: &str) -> Result<Option<Entry>> {
        let Some(value) = self.store.get(Collection::Entries, id).await? else {
            return Ok(None);
        };
        let entry: Entry = serde_json::from_value(value)?;
        Ok(Some(self.unseal(entry)?))
    }

    /// Returns every entry, newest timestamp first, with the same
    /// transparent-decrypt rule as `get_entry`.
    pub async fn get_all_entries(&self) -> Result<Vec<Entry>> {
        let values = self.store.get_all(Collection::Entries).await?;
        let mut entries = Vec::with_capacity(values.len());
        for value in values {
            let entry: Entry = serde_json::from_value(value)?;
            entries.push(self.unseal(entry)?);
        }
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(entries)
    }

    /// Applies a partial update. Changed content is re-encrypted with a
    /// fresh nonce when encryption is active; `updated_at` always
    /// advances and the analysis cache is invalidated.
    pub async fn update_entry(&self, id: &str, update: EntryUpdate) -> Result<Option<Entry>> {
        let Some(value) = self.store.get(Collection::Entries, id).await? else {
            return Ok(None);
        };
        let mut entry: Entry = serde_json::from_value(value)?;

        if let Some(content) = update.content {
            entry.body = EntryBody::Plaintext { text: content };
            entry.encrypted = false;
            entry = self.seal(entry)?;
        }
        if let Some(emojis) = update.emojis {
            entry.emojis = emojis;
        }
        if let Some(tags) = update.tags {
            entry.tags = Some(tags);
        }
        if let Some(mood) = update.mood {
            entry.mood = Some(mood);
        }
        entry.updated_at = Utc::now().max(entry.created_at);

        self.store
            .update(Collection::Entries, id, serde_json::to_value(&entry)?)
            .await?;
        self.analysis.invalidate_all().await;
        Ok(Some(self.unseal(entry)?))
    }

    /// Deletes an entry; returns whether it existed.
    pub async fn delete_entry(&self, id: &str) -> Result<bool> {
        let existed = self.store.get(Collection::Entries, id).await?.is_some();
        if existed {
            self.store.delete(Collection::Entries, id).await?;
        }
        Ok(existed)
    }

    /// Stores a session referencing the given entries by id only —
    /// entry bodies are never duplicated into the session record.
    pub async fn save_session(
        &self,
        entries: &[Entry],
        session_id: Option<String>,
    ) -> Result<JournalSession> {
        let id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let session = JournalSession::new(id, entries.iter().map(|e| e.id.clone()));
        self.store
            .update(
                Collection::Sessions,
                &session.id,
                serde_json::to_value(&session)?,
            )
            .await?;
        Ok(session)
    }

    /// Resolves a session's entry references, silently dropping refs
    /// whose entries have since been deleted. Legacy embedded-entry
    /// records are recognized and read as reference-only sessions.
    pub async fn resolve_session(&self, id: &str) -> Result<Option<(JournalSession, Vec<Entry>)>> {
        let Some(value) = self.store.get(Collection::Sessions, id).await? else {
            return Ok(None);
        };
        let session = serde_json::from_value::<StoredSession>(value)?.into_current();

        let mut entries = Vec::with_capacity(session.entry_refs.len());
        for entry_id in &session.entry_refs {
            if let Some(entry) = self.get_entry(entry_id).await? {
                entries.push(entry);
            }
        }
        Ok(Some((session, entries)))
    }

    /// Initializes the cipher with `password` and re-encrypts every
    /// currently-plaintext entry in place.
    ///
    /// Idempotent under retry: already-encrypted entries are skipped.
    /// Per-entry updates are independently atomic; on the first failure
    /// the pass stops, completed updates stay, and the progress made is
    /// logged before the error propagates.
    pub async fn enable_encryption(&self, password: &str) -> Result<()> {
        self.cipher.initialize_with_password(password).await?;

        let values = self.store.get_all(Collection::Entries).await?;
        let mut processed = 0usize;
        for value in values {
            let entry: Entry = serde_json::from_value(value)?;
            if entry.encrypted {
                continue;
            }
            let sealed = self.seal(entry)?;
            if let Err(err) = self
                .store
                .update(
                    Collection::Entries,
                    &sealed.id,
                    serde_json::to_value(&sealed)?,
                )
                .await
            {
                tracing::error!(
                    processed,
                    entry_id = %sealed.id,
                    "enable_encryption aborted mid-pass"
                );
                return Err(err);
            }
            processed += 1;
        }

        self.set_setting(SETTING_ENCRYPTION_ENABLED, Value::Bool(true))
            .await?;
        tracing::debug!(processed, "encryption enabled");
        Ok(())
    }

    /// Decrypts every ciphertext entry in place, clears the cipher, and
    /// records the setting.
    ///
    /// Fails fast when the cipher is not initialized, and verifies both
    /// the password and every ciphertext *before* mutating anything —
    /// partial decryption of a dataset under the wrong key is
    /// unacceptable.
    pub async fn disable_encryption(&self, password: &str) -> Result<()> {
        if !self.cipher.is_initialized() {
            return Err(ReverieError::not_initialized("cipher"));
        }
        if !self.cipher.matches_password(password).await? {
            return Err(ReverieError::decryption("wrong password"));
        }

        // Phase 1: decrypt-verify the whole dataset without mutating.
        let values = self.store.get_all(Collection::Entries).await?;
        let mut decrypted = Vec::new();
        for value in values {
            let entry: Entry = serde_json::from_value(value)?;
            match &entry.body {
                EntryBody::Ciphertext { data, nonce } => {
                    let plaintext = self.cipher.decrypt(data, nonce)?;
                    let text = String::from_utf8(plaintext)
                        .map_err(|e| ReverieError::decryption(format!("invalid UTF-8: {e}")))?;
                    decrypted.push((entry, text));
                }
                EntryBody::Plaintext { .. } => {}
            }
        }

        // Phase 2: commit the rewrites. Completed updates stay if a
        // later write fails.
        let mut processed = 0usize;
        for (mut entry, text) in decrypted {
            entry.body = EntryBody::Plaintext { text };
            entry.encrypted = false;
            if let Err(err) = self
                .store
                .update(Collection::Entries, &entry.id, serde_json::to_value(&entry)?)
                .await
            {
                tracing::error!(
                    processed,
                    entry_id = %entry.id,
                    "disable_encryption aborted mid-commit"
                );
                return Err(err);
            }
            processed += 1;
        }

        self.cipher.clear();
        self.set_setting(SETTING_ENCRYPTION_ENABLED, Value::Bool(false))
            .await?;
        tracing::debug!(processed, "encryption disabled");
        Ok(())
    }

    /// Produces a self-contained snapshot of entries, sessions, and
    /// settings, preserving each record's encryption state.
    pub async fn export_all(&self) -> Result<ExportBundle> {
        let entries = self.store.get_all(Collection::Entries).await?;
        let sessions = self.store.get_all(Collection::Sessions).await?;

        let mut settings = HashMap::new();
        for record in self.store.get_all(Collection::Settings).await? {
            if let (Some(key), Some(value)) = (
                record.get("key").and_then(Value::as_str),
                record.get("value"),
            ) {
                settings.insert(key.to_string(), value.clone());
            }
        }
        Ok(ExportBundle {
            entries,
            sessions,
            settings,
        })
    }

    /// Consumes a snapshot, upserting every record by id. The bundle's
    /// encryption state is preserved as-is; no re-encryption happens.
    pub async fn import_all(&self, bundle: ExportBundle) -> Result<()> {
        for value in bundle.entries {
            let id = record_id(&value, "entry")?;
            self.store.update(Collection::Entries, &id, value).await?;
        }
        for value in bundle.sessions {
            let id = record_id(&value, "session")?;
            self.store.update(Collection::Sessions, &id, value).await?;
        }
        for (key, value) in bundle.settings {
            self.set_setting(&key, value).await?;
        }
        self.analysis.invalidate_all().await;
        Ok(())
    }

    /// Removes duplicate plaintext entries and migrates legacy
    /// embedded-entry sessions to reference-only form.
    ///
    /// Duplicates group by (content, timestamp-millis); ciphertext
    /// entries are opaque and never merged. Within a group the entry
    /// with the earliest `created_at` survives.
    pub async fn cleanup_duplicates(&self) -> Result<CleanupReport> {
        let values = self.store.get_all(Collection::Entries).await?;
        let mut groups: HashMap<(String, i64), Vec<Entry>> = HashMap::new();
        for value in values {
            let entry: Entry = serde_json::from_value(value)?;
            if let EntryBody::Plaintext { text } = &entry.body {
                groups
                    .entry((text.clone(), entry.timestamp.timestamp_millis()))
                    .or_default()
                    .push(entry);
            }
        }

        let mut removed_ids = Vec::new();
        for (_, mut group) in groups {
            if group.len() < 2 {
                continue;
            }
            group.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            for duplicate in &group[1..] {
                self.store
                    .delete(Collection::Entries, &duplicate.id)
                    .await?;
                removed_ids.push(duplicate.id.clone());
            }
        }

        // Legacy sessions get rewritten to reference-only form, minus
        // any refs removed above.
        let mut migrated_sessions = 0usize;
        for value in self.store.get_all(Collection::Sessions).await? {
            let stored: StoredSession = serde_json::from_value(value)?;
            if !stored.is_legacy() {
                continue;
            }
            let mut session = stored.into_current();
            session
                .entry_refs
                .retain(|entry_ref| !removed_ids.contains(entry_ref));
            self.store
                .update(
                    Collection::Sessions,
                    &session.id,
                    serde_json::to_value(&session)?,
                )
                .await?;
            migrated_sessions += 1;
        }

        if !removed_ids.is_empty() {
            self.analysis.invalidate_all().await;
        }
        tracing::debug!(
            removed = removed_ids.len(),
            migrated = migrated_sessions,
            "duplicate cleanup finished"
        );
        Ok(CleanupReport {
            removed_entries: removed_ids.len(),
            migrated_sessions,
        })
    }

    /// Advisory dataset statistics; the size is a serialization
    /// estimate over the full export bundle.
    pub async fn stats(&self) -> Result<StorageStats> {
        let bundle = self.export_all().await?;
        let approximate_bytes = serde_json::to_string(&bundle)?.len();
        Ok(StorageStats {
            entry_count: bundle.entries.len(),
            session_count: bundle.sessions.len(),
            approximate_bytes,
        })
    }

    /// Reads a setting; absent keys are `Ok(None)`.
    pub async fn get_setting(&self, key: &str) -> Result<Option<Value>> {
        let record = self.store.get(Collection::Settings, key).await?;
        Ok(record.and_then(|r| r.get("value").cloned()))
    }

    /// Reads a setting, falling back to a caller-defined default.
    pub async fn get_setting_or(&self, key: &str, default: Value) -> Result<Value> {
        Ok(self.get_setting(key).await?.unwrap_or(default))
    }

    /// Writes a setting (upsert).
    pub async fn set_setting(&self, key: &str, value: Value) -> Result<()> {
        let record = serde_json::json!({ "key": key, "value": value });
        self.store.update(Collection::Settings, key, record).await
    }

    /// Access to the analysis engine this orchestrator signals.
    pub fn analysis(&self) -> &Arc<AnalysisEngine> {
        &self.analysis
    }

    /// Converts a plaintext entry to its persisted form: ciphertext
    /// when the cipher is initialized, plaintext otherwise.
    fn seal(&self, entry: Entry) -> Result<Entry> {
        if !self.cipher.is_initialized() {
            return Ok(entry);
        }
        match &entry.body {
            EntryBody::Plaintext { text } => {
                let (data, nonce) = self.cipher.encrypt(text.as_bytes())?;
                Ok(entry.with_ciphertext(data, nonce))
            }
            EntryBody::Ciphertext { .. } => Ok(entry),
        }
    }

    /// Converts a stored entry to the readable view: ciphertext bodies
    /// are decrypted when the cipher is initialized, and the
    /// `encrypted` flag keeps describing the at-rest state.
    fn unseal(&self, mut entry: Entry) -> Result<Entry> {
        if let EntryBody::Ciphertext { data, nonce } = &entry.body {
            if self.cipher.is_initialized() {
                let plaintext = self.cipher.decrypt(data, nonce)?;
                let text = String::from_utf8(plaintext)
                    .map_err(|e| ReverieError::decryption(format!("invalid UTF-8: {e}")))?;
                entry.body = EntryBody::Plaintext { text };
            }
        }
        Ok(entry)
    }
}

fn record_id(value: &Value, entity_type: &'static str) -> Result<String> {
    value
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ReverieError::Serialization(format!("{entity_type} record is missing an 'id' field"))
        })
}
