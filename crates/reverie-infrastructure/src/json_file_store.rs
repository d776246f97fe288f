//! File-backed JSON implementation of the persistence contract.
//!
//! Each record lives in its own `<key>.json` file under a per-collection
//! subdirectory:
//!
//! ```text
//! base_dir/
//! ├── entries/
//! │   ├── <entry-id>.json
//! │   └── ...
//! ├── sessions/
//! │   └── <session-id>.json
//! └── settings/
//!     └── <key>.json
//! ```
//!
//! All records are mirrored in memory; mutations write the file first
//! (tmp file + atomic rename) and update the mirror only on success, so
//! a record is either fully persisted or not created at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reverie_core::error::{Result, ReverieError};
use reverie_core::store::{Collection, JournalStore};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;

/// In-memory mirror of the on-disk collections.
#[derive(Default)]
struct StoreState {
    collections: HashMap<Collection, HashMap<String, Value>>,
    /// Secondary index: entry timestamp (millis) -> entry ids.
    time_index: BTreeMap<i64, BTreeSet<String>>,
}

/// Durable key-value store persisting each record as one JSON file.
pub struct JsonFileStore {
    base_dir: PathBuf,
    /// `None` until `init` completes; the uninitialized gate.
    state: RwLock<Option<StoreState>>,
}

impl JsonFileStore {
    /// Creates a store rooted at `base_dir`. No I/O happens until
    /// `init` is called.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            state: RwLock::new(None),
        }
    }

    fn collection_dir(&self, collection: Collection) -> PathBuf {
        self.base_dir.join(collection.as_str())
    }

    fn record_path(&self, collection: Collection, key: &str) -> PathBuf {
        self.collection_dir(collection).join(format!("{key}.json"))
    }

    /// Writes a record file atomically: tmp file first, then rename
    /// over the final path.
    async fn write_record(&self, collection: Collection, key: &str, value: &Value) -> Result<()> {
        let final_path = self.record_path(collection, key);
        let tmp_path = final_path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&tmp_path, json).await?;
        fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    async fn load_collection(&self, collection: Collection) -> Result<HashMap<String, Value>> {
        let dir = self.collection_dir(collection);
        let mut records = HashMap::new();
        let mut read_dir = fs::read_dir(&dir).await?;
        while let Some(dir_entry) = read_dir.next_entry().await? {
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let raw = fs::read_to_string(&path).await?;
            let value: Value = serde_json::from_str(&raw)?;
            records.insert(key.to_string(), value);
        }
        Ok(records)
    }
}

/// Extracts the `timestamp` field of an entry record as epoch millis.
fn entry_timestamp_millis(value: &Value) -> Option<i64> {
    let raw = value.get("timestamp")?.as_str()?;
    let parsed = DateTime::parse_from_rfc3339(raw).ok()?;
    Some(parsed.timestamp_millis())
}

impl StoreState {
    fn index_insert(&mut self, key: &str, value: &Value) {
        if let Some(millis) = entry_timestamp_millis(value) {
            self.time_index
                .entry(millis)
                .or_default()
                .insert(key.to_string());
        }
    }

    fn index_remove(&mut self, key: &str, value: &Value) {
        if let Some(millis) = entry_timestamp_millis(value) {
            if let Some(ids) = self.time_index.get_mut(&millis) {
                ids.remove(key);
                if ids.is_empty() {
                    self.time_index.remove(&millis);
                }
            }
        }
    }
}

/// Maps an `Option<&mut StoreState>` guard to the initialized state or
/// the uninitialized error.
macro_rules! initialized {
    ($guard:expr) => {
        $guard
            .as_mut()
            .ok_or(ReverieError::not_initialized("store"))?
    };
}

#[async_trait]
impl JournalStore for JsonFileStore {
    async fn init(&self) -> Result<()> {
        let mut guard = self.state.write().await;
        if guard.is_some() {
            return Ok(());
        }

        for collection in Collection::ALL {
            fs::create_dir_all(self.collection_dir(collection)).await?;
        }

        let mut state = StoreState::default();
        for collection in Collection::ALL {
            let records = self.load_collection(collection).await?;
            if collection == Collection::Entries {
                for (key, value) in &records {
                    state.index_insert(key, value);
                }
            }
            state.collections.insert(collection, records);
        }

        tracing::debug!(
            base_dir = %self.base_dir.display(),
            entries = state.collections[&Collection::Entries].len(),
            sessions = state.collections[&Collection::Sessions].len(),
            "journal store initialized"
        );
        *guard = Some(state);
        Ok(())
    }

    async fn add(&self, collection: Collection, key: &str, value: Value) -> Result<()> {
        let mut guard = self.state.write().await;
        let state = initialized!(guard);
        let records = state.collections.entry(collection).or_default();
        if records.contains_key(key) {
            return Err(ReverieError::already_exists(collection.as_str(), key));
        }
        self.write_record(collection, key, &value).await?;

        if collection == Collection::Entries {
            state.index_insert(key, &value);
        }
        state
            .collections
            .entry(collection)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(ReverieError::not_initialized("store"))?;
        Ok(state
            .collections
            .get(&collection)
            .and_then(|records| records.get(key))
            .cloned())
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<Value>> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(ReverieError::not_initialized("store"))?;
        Ok(state
            .collections
            .get(&collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn update(&self, collection: Collection, key: &str, value: Value) -> Result<()> {
        let mut guard = self.state.write().await;
        let state = initialized!(guard);
        self.write_record(collection, key, &value).await?;

        if collection == Collection::Entries {
            if let Some(previous) = state
                .collections
                .get(&collection)
                .and_then(|records| records.get(key))
                .cloned()
            {
                state.index_remove(key, &previous);
            }
            state.index_insert(key, &value);
        }
        state
            .collections
            .entry(collection)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<()> {
        let mut guard = self.state.write().await;
        let state = initialized!(guard);

        let known = state
            .collections
            .get(&collection)
            .is_some_and(|records| records.contains_key(key));
        if !known {
            // Idempotent: absent key is not an error.
            return Ok(());
        }

        // File first, mirror second: a failed unlink leaves the record
        // visible and rediscoverable on the next init.
        match fs::remove_file(self.record_path(collection, key)).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        if let Some(previous) = state.collections.entry(collection).or_default().remove(key) {
            if collection == Collection::Entries {
                state.index_remove(key, &previous);
            }
        }
        Ok(())
    }

    async fn query_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Value>> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(ReverieError::not_initialized("store"))?;
        let empty = HashMap::new();
        let entries = state
            .collections
            .get(&Collection::Entries)
            .unwrap_or(&empty);

        let mut results = Vec::new();
        for ids in state
            .time_index
            .range(start.timestamp_millis()..=end.timestamp_millis())
            .map(|(_, ids)| ids)
        {
            for id in ids {
                if let Some(value) = entries.get(id) {
                    results.push(value.clone());
                }
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry_value(id: &str, timestamp: DateTime<Utc>) -> Value {
        serde_json::json!({
            "id": id,
            "timestamp": timestamp.to_rfc3339(),
            "content": format!("entry {id}"),
        })
    }

    async fn initialized_store() -> (tempfile::TempDir, JsonFileStore) {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let store = JsonFileStore::new(dir.path());
        store.init().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_operations_before_init_fail() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let err = store
            .get(Collection::Entries, "missing")
            .await
            .expect_err("uninitialized store must refuse operations");
        assert!(err.is_not_initialized());
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let (_dir, store) = initialized_store().await;
        store.init().await.unwrap();
        store.init().await.unwrap();
    }

    #[tokio::test]
    async fn test_add_rejects_duplicate_keys() {
        let (_dir, store) = initialized_store().await;
        let value = entry_value("e1", Utc::now());
        store
            .add(Collection::Entries, "e1", value.clone())
            .await
            .unwrap();
        let err = store.add(Collection::Entries, "e1", value).await;
        assert!(matches!(err, Err(ReverieError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_get_miss_is_none_not_error() {
        let (_dir, store) = initialized_store().await;
        assert!(
            store
                .get(Collection::Sessions, "missing")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_update_upserts_and_delete_is_idempotent() {
        let (_dir, store) = initialized_store().await;
        store
            .update(Collection::Settings, "theme", serde_json::json!("dark"))
            .await
            .unwrap();
        store
            .update(Collection::Settings, "theme", serde_json::json!("light"))
            .await
            .unwrap();
        assert_eq!(
            store.get(Collection::Settings, "theme").await.unwrap(),
            Some(serde_json::json!("light"))
        );

        store.delete(Collection::Settings, "theme").await.unwrap();
        store.delete(Collection::Settings, "theme").await.unwrap();
        assert!(
            store
                .get(Collection::Settings, "theme")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_records_survive_reinitialization() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        {
            let store = JsonFileStore::new(dir.path());
            store.init().await.unwrap();
            store
                .add(Collection::Entries, "e1", entry_value("e1", now))
                .await
                .unwrap();
        }

        let store = JsonFileStore::new(dir.path());
        store.init().await.unwrap();
        let loaded = store.get(Collection::Entries, "e1").await.unwrap();
        assert_eq!(loaded.unwrap()["id"], "e1");

        // The time index is rebuilt from disk too.
        let hits = store
            .query_by_time_range(now - Duration::seconds(1), now + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_file_removal_keeps_record_visible() {
        let (dir, store) = initialized_store().await;
        let now = Utc::now();
        store
            .add(Collection::Entries, "e1", entry_value("e1", now))
            .await
            .unwrap();

        // Force the unlink to fail by putting a directory where the
        // record file lives.
        let path = dir.path().join("entries").join("e1.json");
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        store
            .delete(Collection::Entries, "e1")
            .await
            .expect_err("unlink failure must propagate");

        // Mirror and time index still serve the record.
        assert!(store.get(Collection::Entries, "e1").await.unwrap().is_some());
        let hits = store
            .query_by_time_range(now - Duration::seconds(1), now + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_query_by_time_range_bounds_inclusive() {
        let (_dir, store) = initialized_store().await;
        let base = Utc::now();
        for (id, offset) in [("a", 0), ("b", 60), ("c", 120)] {
            let ts = base + Duration::seconds(offset);
            store
                .add(Collection::Entries, id, entry_value(id, ts))
                .await
                .unwrap();
        }

        let hits = store
            .query_by_time_range(base, base + Duration::seconds(60))
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|v| v["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
