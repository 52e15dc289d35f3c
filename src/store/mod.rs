//! Document store abstraction.
//!
//! Documents are JSON objects addressed by a slash-joined collection path
//! (`dashboards`, `dashboards/{uid}/pages`) plus a document id. Collections
//! are implicit: writing into one never requires its parent document to
//! exist.

pub mod firestore;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

pub use firestore::FirestoreStore;
pub use sqlite::SqliteStore;

/// A document database client.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Ids of every document directly inside `collection`.
    async fn list_ids(&self, collection: &str) -> Result<Vec<String>>;
    /// Fetch one document, `None` if it does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;
    /// Write `document`, replacing any existing document wholesale.
    async fn set(&self, collection: &str, id: &str, document: &Value) -> Result<()>;
    /// Every `(id, document)` pair directly inside `collection`.
    async fn stream(&self, collection: &str) -> Result<Vec<(String, Value)>>;
}
