//! Persistence provider contract.
//!
//! Defines the interface the storage orchestrator uses for durable
//! state: a generic, schema-less key-value abstraction over three named
//! collections, plus one secondary index (entries by time). This
//! decouples the core logic from the concrete storage mechanism.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// The three logical collections the core persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Entries,
    Sessions,
    Settings,
}

impl Collection {
    /// Directory/collection name used by file-backed implementations.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Entries => "entries",
            Collection::Sessions => "sessions",
            Collection::Settings => "settings",
        }
    }

    /// All collections, in initialization order.
    pub const ALL: [Collection; 3] = [
        Collection::Entries,
        Collection::Sessions,
        Collection::Settings,
    ];
}

/// An abstract durable key-value store over the three collections.
///
/// # Contract
///
/// - Each operation is atomic with respect to itself; no cross-record
///   transactions are exposed.
/// - `init` must be safely repeatable and must complete before any
///   other operation; early calls fail with `NotInitialized`.
/// - Query misses are `Ok(None)`, never errors.
#[async_trait]
pub trait JournalStore: Send + Sync {
    /// Creates the three collections and the entries time index exactly
    /// once. Idempotent against a store that already has the correct
    /// shape.
    async fn init(&self) -> Result<()>;

    /// Inserts a record. Fails with `AlreadyExists` if the key is
    /// already present.
    async fn add(&self, collection: Collection, key: &str, value: Value) -> Result<()>;

    /// Looks up a record by key.
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>>;

    /// Returns every record in the collection, in unspecified order.
    async fn get_all(&self, collection: Collection) -> Result<Vec<Value>>;

    /// Upserts a record: creates it if absent, replaces it otherwise.
    async fn update(&self, collection: Collection, key: &str, value: Value) -> Result<()>;

    /// Deletes a record. Idempotent: deleting an absent key is `Ok`.
    async fn delete(&self, collection: Collection, key: &str) -> Result<()>;

    /// Range query over the entries collection's `timestamp` field,
    /// bounds inclusive.
    async fn query_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Value>>;
}
