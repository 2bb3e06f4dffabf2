use super::{Document, DocumentStore};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

static FIELD_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid field regex"));

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let url = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&url)
        .await
        .with_context(|| format!("failed to open {}", url))?;
    sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
    Ok(pool)
}

/// Make sure a file-backed SQLite URL can be created: expands `~/`, creates
/// the parent directory and asks SQLite to create the file if missing.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };
    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{}?{}", path, q),
        None => format!("sqlite://{}?mode=rwc", path),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn json_path(field: &str) -> Result<String> {
    if !FIELD_NAME.is_match(field) {
        return Err(anyhow!("invalid document field name: {:?}", field));
    }
    Ok(format!("$.{}", field))
}

fn decode_row(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    let id: String = row.get("id");
    let body: String = row.get("body");
    let body = serde_json::from_str(&body)
        .with_context(|| format!("document {} holds invalid JSON", id))?;
    Ok(Document { id, body })
}

/// Shallow merge; `null` in the patch removes the key.
pub(crate) fn merge_patch(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        if value.is_null() {
            target.remove(&key);
        } else {
            target.insert(key, value);
        }
    }
}

/// Document collections kept as JSON bodies in a single SQLite table.
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    pool: Pool,
}

impl SqliteDocumentStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Private in-memory database with migrations applied.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    #[instrument(skip_all, fields(collection = %collection))]
    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT id, body FROM documents WHERE collection = ?")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_row).collect()
    }

    #[instrument(skip_all, fields(collection = %collection, field = %field))]
    async fn list_ordered(&self, collection: &str, field: &str) -> Result<Vec<Document>> {
        let path = json_path(field)?;
        let rows = sqlx::query(
            "SELECT id, body FROM documents WHERE collection = ? \
             ORDER BY json_extract(body, ?) DESC, id ASC",
        )
        .bind(collection)
        .bind(path)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_row).collect()
    }

    #[instrument(skip_all, fields(collection = %collection, field = %field))]
    async fn find_eq(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Document>> {
        let path = json_path(field)?;
        let rows = sqlx::query(
            "SELECT id, body FROM documents WHERE collection = ? \
             AND json_extract(body, ?) = json_extract(?, '$')",
        )
        .bind(collection)
        .bind(path)
        .bind(value.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_row).collect()
    }

    #[instrument(skip_all, fields(collection = %collection, id = %id))]
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT id, body FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_row).transpose()
    }

    #[instrument(skip_all, fields(collection = %collection))]
    async fn insert(&self, collection: &str, body: Value) -> Result<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        sqlx::query("INSERT INTO documents (collection, id, body) VALUES (?, ?, ?)")
            .bind(collection)
            .bind(&id)
            .bind(body.to_string())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to insert into {}", collection))?;
        Ok(id)
    }

    #[instrument(skip_all, fields(collection = %collection, id = %id))]
    async fn set(&self, collection: &str, id: &str, body: Value) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents (collection, id, body) VALUES (?, ?, ?) \
             ON CONFLICT (collection, id) DO UPDATE SET body = excluded.body, \
             updated_at = CURRENT_TIMESTAMP",
        )
        .bind(collection)
        .bind(id)
        .bind(body.to_string())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write {}/{}", collection, id))?;
        Ok(())
    }

    #[instrument(skip_all, fields(collection = %collection, id = %id))]
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<()> {
        let Value::Object(patch) = patch else {
            return Err(anyhow!("update patch for {}/{} must be an object", collection, id));
        };
        let mut tx = self.pool.begin().await?;
        let current: Option<String> =
            sqlx::query_scalar("SELECT body FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(current) = current else {
            return Err(anyhow!("document {}/{} not found", collection, id));
        };
        let mut body = match serde_json::from_str::<Value>(&current)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        merge_patch(&mut body, patch);
        sqlx::query(
            "UPDATE documents SET body = ?, updated_at = CURRENT_TIMESTAMP \
             WHERE collection = ? AND id = ?",
        )
        .bind(Value::Object(body).to_string())
        .bind(collection)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip_all, fields(collection = %collection, id = %id))]
    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sqlite_url_gets_create_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/studio.db");
        let url = prepare_sqlite_url(&format!("sqlite://{}", path.display()));
        assert_eq!(url, format!("sqlite://{}?mode=rwc", path.display()));
        assert!(path.parent().unwrap().exists());
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(prepare_sqlite_url("postgres://x"), "postgres://x");
    }

    #[test]
    fn merge_patch_sets_and_clears() {
        let mut doc = json!({"a": 1, "b": 2}).as_object().cloned().unwrap();
        let patch = json!({"b": null, "c": 3}).as_object().cloned().unwrap();
        merge_patch(&mut doc, patch);
        assert_eq!(Value::Object(doc), json!({"a": 1, "c": 3}));
    }

    #[tokio::test]
    async fn crud_and_queries() {
        let store = SqliteDocumentStore::in_memory().await.unwrap();
        let a = store
            .insert("orders", json!({"createdAt": "2024-01-01T00:00:00.000Z", "contractId": "c1"}))
            .await
            .unwrap();
        let b = store
            .insert("orders", json!({"createdAt": "2024-02-01T00:00:00.000Z", "contractId": "c2"}))
            .await
            .unwrap();
        store.insert("contracts", json!({"clientName": "x"})).await.unwrap();

        let ordered = store.list_ordered("orders", "createdAt").await.unwrap();
        assert_eq!(
            ordered.iter().map(|d| d.id.clone()).collect::<Vec<_>>(),
            vec![b.clone(), a.clone()]
        );
        assert_eq!(store.list("orders").await.unwrap().len(), 2);

        let hits = store.find_eq("orders", "contractId", &json!("c1")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, a);

        store
            .update("orders", &a, json!({"status": "completed", "contractId": null}))
            .await
            .unwrap();
        let doc = store.get("orders", &a).await.unwrap().unwrap();
        assert_eq!(doc.body["status"], "completed");
        assert!(doc.body.get("contractId").is_none());

        store.set("settings", "studio", json!({"x": 1})).await.unwrap();
        store.set("settings", "studio", json!({"x": 2})).await.unwrap();
        assert_eq!(store.get("settings", "studio").await.unwrap().unwrap().body["x"], 2);

        store.delete("orders", &b).await.unwrap();
        assert!(store.get("orders", &b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_unsafe_field_names_and_missing_documents() {
        let store = SqliteDocumentStore::in_memory().await.unwrap();
        assert!(store.list_ordered("orders", "a') --").await.is_err());
        assert!(store.update("orders", "missing", json!({"a": 1})).await.is_err());
    }
}
