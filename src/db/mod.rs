//! Database boundary: document store abstraction and record adapters.
//!
//! - `repo`: the SQLite-backed `DocumentStore`.
//! - `model`: decoding of stored documents (tolerating the snake_case and
//!   camelCase variants found in the collections) into domain types, and
//!   encoding of domain types back into canonical documents.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

pub mod model;
pub mod repo;

pub use repo::{init_pool, run_migrations, Pool, SqliteDocumentStore};

pub const ORDERS: &str = "orders";
pub const CONTRACTS: &str = "contracts";
pub const PRODUCTS: &str = "products";
pub const WORKFLOW_TEMPLATES: &str = "workflowTemplates";
pub const SETTINGS: &str = "settings";
pub const SETTINGS_DOC: &str = "studio";

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub body: Value,
}

/// Query/mutation surface of the hosted document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All documents of a collection, in no particular order.
    async fn list(&self, collection: &str) -> Result<Vec<Document>>;

    /// All documents ordered by `field`, newest (largest) first.
    async fn list_ordered(&self, collection: &str, field: &str) -> Result<Vec<Document>>;

    /// Documents whose top-level `field` equals `value`.
    async fn find_eq(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Document>>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Create a document with a generated id and return that id.
    async fn insert(&self, collection: &str, body: Value) -> Result<String>;

    /// Create or replace a document under a caller-chosen id.
    async fn set(&self, collection: &str, id: &str, body: Value) -> Result<()>;

    /// Shallow merge of `patch` into an existing document. `null` values
    /// remove the field.
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<()>;

    async fn delete(&self, collection: &str, id: &str) -> Result<()>;
}
