//! SQLite-backed layout storage
//!
//! Name uniqueness is checked before insert and enforced again by the
//! `UNIQUE` constraint, which is what settles concurrent creates.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;

use super::models::{GridCell, Layout, LayoutInput};
use crate::error::{DashError, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS layouts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    layout_config TEXT NOT NULL,
    widgets_config TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_layouts_name ON layouts(name);
"#;

const COLUMNS: &str = "id, name, layout_config, widgets_config, created_at, updated_at";

#[derive(FromRow)]
struct LayoutRow {
    id: i64,
    name: String,
    layout_config: Json<Vec<GridCell>>,
    widgets_config: Option<Json<JsonValue>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<LayoutRow> for Layout {
    fn from(row: LayoutRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            layout_config: row.layout_config.0,
            widgets_config: row.widgets_config.map(|w| w.0),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct LayoutStore {
    pool: SqlitePool,
}

impl LayoutStore {
    /// Open (creating if missing) the layout database at `db_path`.
    pub async fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(DashError::Storage)?;

        tracing::info!(path = %db_path.display(), "Layout store opened");
        Self::with_pool(pool).await
    }

    /// Private in-memory database (single connection so every query sees it).
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(DashError::Storage)?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(DashError::Storage)?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Insert a new layout. Names already in use are `DuplicateName`.
    pub async fn create(&self, input: &LayoutInput) -> Result<Layout> {
        let name = input.validated_name()?;

        if self.find_by_name(name).await?.is_some() {
            return Err(DashError::DuplicateName(name.to_owned()));
        }

        let now = Utc::now();
        let row: LayoutRow = sqlx::query_as(&format!(
            "INSERT INTO layouts (name, layout_config, widgets_config, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING {COLUMNS}"
        ))
        .bind(name)
        .bind(Json(input.layout_config.clone()))
        .bind(input.widgets_config.clone().map(Json))
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, name))?;

        tracing::info!(id = row.id, name, "Layout created");
        Ok(row.into())
    }

    /// All layouts in insertion order.
    pub async fn list(&self) -> Result<Vec<Layout>> {
        let rows: Vec<LayoutRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM layouts ORDER BY id"))
                .fetch_all(&self.pool)
                .await
                .map_err(DashError::Storage)?;

        Ok(rows.into_iter().map(Layout::from).collect())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Layout> {
        let row: Option<LayoutRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM layouts WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(DashError::Storage)?;

        row.map(Layout::from).ok_or_else(|| not_found(id.to_string()))
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Layout> {
        let name = name.trim();
        self.find_by_name(name)
            .await?
            .ok_or_else(|| not_found(name.to_owned()))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Layout>> {
        let row: Option<LayoutRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM layouts WHERE name = ?"))
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(DashError::Storage)?;

        Ok(row.map(Layout::from))
    }

    /// Replace name and grid of an existing layout.
    ///
    /// `widgets_config` is replaced only when the input carries one. A name
    /// held by another layout fails on the storage constraint.
    pub async fn update(&self, id: i64, input: &LayoutInput) -> Result<Layout> {
        let name = input.validated_name()?;

        let row: Option<LayoutRow> = sqlx::query_as(&format!(
            "UPDATE layouts \
             SET name = ?, layout_config = ?, widgets_config = COALESCE(?, widgets_config), updated_at = ? \
             WHERE id = ? RETURNING {COLUMNS}"
        ))
        .bind(name)
        .bind(Json(input.layout_config.clone()))
        .bind(input.widgets_config.clone().map(Json))
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| write_error(e, name))?;

        let layout = row.map(Layout::from).ok_or_else(|| not_found(id.to_string()))?;
        tracing::info!(id, name, "Layout updated");
        Ok(layout)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM layouts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DashError::Storage)?;

        if result.rows_affected() == 0 {
            return Err(not_found(id.to_string()));
        }

        tracing::info!(id, "Layout deleted");
        Ok(())
    }
}

fn not_found(id: String) -> DashError {
    DashError::NotFound {
        resource: "layout",
        id,
    }
}

fn write_error(err: sqlx::Error, name: &str) -> DashError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            DashError::DuplicateName(name.to_owned())
        }
        _ => {
            tracing::error!(error = %err, name, "Layout write failed");
            DashError::Storage(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn grid() -> Vec<GridCell> {
        vec![GridCell::new("chart-1", 0, 0, 6, 4), GridCell::new("table-1", 6, 0, 6, 8)]
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let store = LayoutStore::in_memory().await.unwrap();

        store.create(&LayoutInput::new("dash1", grid())).await.unwrap();
        let err = store
            .create(&LayoutInput::new("dash1", vec![]))
            .await
            .unwrap_err();

        assert!(matches!(err, DashError::DuplicateName(ref n) if n == "dash1"));
        let named: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .filter(|l| l.name == "dash1")
            .collect();
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].layout_config, grid());
    }

    #[tokio::test]
    async fn lookups_by_id_and_name_agree() {
        let store = LayoutStore::in_memory().await.unwrap();
        let created = store
            .create(&LayoutInput::new("ops", grid()).with_widgets(json!({"chart-1": {"type": "bar"}})))
            .await
            .unwrap();

        let by_id = store.get_by_id(created.id).await.unwrap();
        let by_name = store.get_by_name("ops").await.unwrap();

        assert_eq!(by_id, by_name);
        assert_eq!(by_id, created);
        assert_eq!(by_id.widgets_config.unwrap()["chart-1"]["type"], "bar");
        assert_eq!(created.created_at, created.updated_at);
    }

    #[tokio::test]
    async fn name_lookup_ignores_surrounding_whitespace() {
        let store = LayoutStore::in_memory().await.unwrap();
        let created = store.create(&LayoutInput::new(" ops ", grid())).await.unwrap();
        assert_eq!(created.name, "ops");

        let found = store.get_by_name("  ops\t").await.unwrap();
        assert_eq!(found.id, created.id);
        assert!(matches!(
            store.get_by_name("   ").await,
            Err(DashError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn list_is_insertion_ordered() {
        let store = LayoutStore::in_memory().await.unwrap();
        for name in ["zeta", "alpha", "mid"] {
            store.create(&LayoutInput::new(name, vec![])).await.unwrap();
        }

        let names: Vec<_> = store.list().await.unwrap().into_iter().map(|l| l.name).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn update_replaces_config_and_refreshes_timestamp() {
        let store = LayoutStore::in_memory().await.unwrap();
        let created = store
            .create(&LayoutInput::new("ops", grid()).with_widgets(json!({"k": 1})))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        let cfg2 = vec![GridCell::new("metric-1", 0, 0, 3, 2)];
        store
            .update(created.id, &LayoutInput::new("ops-renamed", cfg2.clone()))
            .await
            .unwrap();

        let fetched = store.get_by_id(created.id).await.unwrap();
        assert_eq!(fetched.layout_config, cfg2);
        assert_eq!(fetched.name, "ops-renamed");
        assert_eq!(fetched.created_at, created.created_at);
        assert!(fetched.updated_at > fetched.created_at);
        // Omitted widgets_config keeps the stored one
        assert_eq!(fetched.widgets_config, Some(json!({"k": 1})));
    }

    #[tokio::test]
    async fn update_missing_id_leaves_store_unchanged() {
        let store = LayoutStore::in_memory().await.unwrap();
        let existing = store.create(&LayoutInput::new("keep", grid())).await.unwrap();

        let err = store
            .update(existing.id + 100, &LayoutInput::new("ghost", vec![]))
            .await
            .unwrap_err();

        assert!(matches!(err, DashError::NotFound { .. }));
        assert_eq!(store.list().await.unwrap(), vec![existing]);
    }

    #[tokio::test]
    async fn update_onto_taken_name_is_duplicate() {
        let store = LayoutStore::in_memory().await.unwrap();
        store.create(&LayoutInput::new("first", vec![])).await.unwrap();
        let second = store.create(&LayoutInput::new("second", vec![])).await.unwrap();

        let err = store
            .update(second.id, &LayoutInput::new("first", vec![]))
            .await
            .unwrap_err();

        assert!(matches!(err, DashError::DuplicateName(_)));
        assert_eq!(store.get_by_id(second.id).await.unwrap().name, "second");
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let store = LayoutStore::in_memory().await.unwrap();
        let created = store.create(&LayoutInput::new("gone", vec![])).await.unwrap();

        store.delete(created.id).await.unwrap();

        assert!(matches!(
            store.get_by_id(created.id).await.unwrap_err(),
            DashError::NotFound { .. }
        ));
        assert!(matches!(
            store.delete(created.id).await.unwrap_err(),
            DashError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn concurrent_creates_admit_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = LayoutStore::open(dir.path().join("layouts.db")).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.create(&LayoutInput::new("race", vec![])).await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(DashError::DuplicateName(_)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(created, 1);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("layouts.db");

        let store = LayoutStore::open(&path).await.unwrap();
        store.create(&LayoutInput::new("persisted", vec![])).await.unwrap();
        store.close().await;

        let reopened = LayoutStore::open(&path).await.unwrap();
        assert_eq!(reopened.get_by_name("persisted").await.unwrap().name, "persisted");
    }
}
