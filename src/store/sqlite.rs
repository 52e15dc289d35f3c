use super::DocumentStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Embedded document store: one row per document, body kept as JSON text.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `database_url` and apply
    /// the embedded migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(
                database_url
                    .parse::<SqliteConnectOptions>()
                    .context("DATABASE_URL is not a valid SQLite connection string")?
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal),
            )
            .await?;

        Self::migrated(pool).await
    }

    /// A private in-memory database. Pinned to a single connection because
    /// every SQLite connection to `:memory:` opens a fresh database.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Document store migrations applied");
        Ok(Self { pool })
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn list_ids(&self, collection: &str) -> Result<Vec<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM documents WHERE collection = ?1 ORDER BY id")
                .bind(collection)
                .fetch_all(&self.pool)
                .await?;

        Ok(ids)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let body: Option<String> =
            sqlx::query_scalar("SELECT body FROM documents WHERE collection = ?1 AND id = ?2")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        body.map(|b| serde_json::from_str(&b))
            .transpose()
            .with_context(|| format!("corrupt document {collection}/{id}"))
    }

    async fn set(&self, collection: &str, id: &str, document: &Value) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO documents (collection, id, body, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(collection)
        .bind(id)
        .bind(serde_json::to_string(document)?)
        .bind(chrono::Utc::now().naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn stream(&self, collection: &str) -> Result<Vec<(String, Value)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT id, body FROM documents WHERE collection = ?1 ORDER BY id",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, body)| -> Result<(String, Value)> {
                let doc: Value = serde_json::from_str(&body)
                    .with_context(|| format!("corrupt document {collection}/{id}"))?;
                Ok((id, doc))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_replaces_whole_document() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .set("dashboards", "d1", &json!({ "a": 1, "b": 2 }))
            .await
            .unwrap();
        store
            .set("dashboards", "d1", &json!({ "a": 3 }))
            .await
            .unwrap();

        assert_eq!(
            store.get("dashboards", "d1").await.unwrap(),
            Some(json!({ "a": 3 }))
        );
        assert_eq!(store.list_ids("dashboards").await.unwrap(), vec!["d1"]);
    }

    #[tokio::test]
    async fn collections_are_independent_and_implicit() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .set("dashboards/d1/pages", "p1", &json!({ "x": true }))
            .await
            .unwrap();

        assert!(store.list_ids("dashboards").await.unwrap().is_empty());
        assert_eq!(store.get("dashboards", "d1").await.unwrap(), None);

        let pages = store.stream("dashboards/d1/pages").await.unwrap();
        assert_eq!(pages, vec![("p1".to_owned(), json!({ "x": true }))]);
        assert!(store.stream("dashboards/d2/pages").await.unwrap().is_empty());
    }
}
