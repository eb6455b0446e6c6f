use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use tracing::debug;

use crate::models::StyleDocument;

/// Prefix for on-disk payload files, so the data dir reads as ours.
pub const STORAGE_PREFIX: &str = "rstyle";

const LATEST_STYLE_KEY: &str = "latest_style";

/// One serialized style document per payload file, metadata and settings in
/// SQLite next to them.
pub struct StyleStore {
    pool: SqlitePool,
    styles_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct StyleSummary {
    pub id: String,
    pub name: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl StyleStore {
    pub async fn open(data_dir: PathBuf) -> Result<Self> {
        let styles_dir = data_dir.join("styles");
        if !styles_dir.exists() {
            fs::create_dir_all(&styles_dir)?;
        }

        let db_path = data_dir.join("styles.db");
        let opts = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(opts).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS styles (
                key TEXT PRIMARY KEY,
                id TEXT NOT NULL,
                file_path TEXT NOT NULL,
                name TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool, styles_dir })
    }

    fn style_key(style_id: &str) -> String {
        format!("{STORAGE_PREFIX}:{style_id}")
    }

    fn file_name(style_id: &str) -> String {
        format!("{STORAGE_PREFIX}_{style_id}.json")
    }

    /// Save a document under its id, stamping `created` on first save and
    /// recording it as the most recently edited style.
    pub async fn save(&self, mut style: StyleDocument) -> Result<StyleDocument> {
        let id = match style.id.clone() {
            Some(id) if !id.is_empty() => id,
            _ => anyhow::bail!("cannot save a style without an id"),
        };
        if style.created.is_none() {
            style.created = Some(Utc::now().to_rfc3339());
        }

        let file_name = Self::file_name(&id);
        let payload = serde_json::to_string_pretty(&style)?;
        fs::write(self.styles_dir.join(&file_name), payload)?;

        let now = Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO styles (key, id, file_path, name, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                file_path = excluded.file_path,
                name = excluded.name,
                updated_at = excluded.updated_at",
        )
        .bind(Self::style_key(&id))
        .bind(&id)
        .bind(&file_name)
        .bind(style.name.as_deref())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.put_setting(LATEST_STYLE_KEY, &id).await?;
        debug!("saved style: {}", id);
        Ok(style)
    }

    pub async fn load(&self, style_id: &str) -> Result<Option<StyleDocument>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT file_path FROM styles WHERE key = ?")
                .bind(Self::style_key(style_id))
                .fetch_optional(&self.pool)
                .await?;

        let Some((file_name,)) = row else {
            debug!("store miss: {}", style_id);
            return Ok(None);
        };

        let full_path = self.styles_dir.join(&file_name);
        if !full_path.exists() {
            // File missing but in DB, cleanup
            sqlx::query("DELETE FROM styles WHERE key = ?")
                .bind(Self::style_key(style_id))
                .execute(&self.pool)
                .await?;
            return Ok(None);
        }

        let raw = fs::read_to_string(full_path)?;
        debug!("store hit: {}", style_id);
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// The most recently edited style, if its record is still intact.
    pub async fn latest(&self) -> Result<Option<StyleDocument>> {
        let Some(style_id) = self.get_setting(LATEST_STYLE_KEY).await? else {
            return Ok(None);
        };
        self.load(&style_id).await
    }

    pub async fn list(&self) -> Result<Vec<StyleSummary>> {
        let rows: Vec<(String, Option<String>, i64, i64)> = sqlx::query_as(
            "SELECT id, name, created_at, updated_at FROM styles ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, created_at, updated_at)| StyleSummary {
                id,
                name,
                created_at,
                updated_at,
            })
            .collect())
    }

    pub async fn delete(&self, style_id: &str) -> Result<bool> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT file_path FROM styles WHERE key = ?")
                .bind(Self::style_key(style_id))
                .fetch_optional(&self.pool)
                .await?;

        let Some((file_name,)) = row else {
            return Ok(false);
        };

        let full_path = self.styles_dir.join(&file_name);
        if full_path.exists() {
            let _ = fs::remove_file(full_path);
        }
        sqlx::query("DELETE FROM styles WHERE key = ?")
            .bind(Self::style_key(style_id))
            .execute(&self.pool)
            .await?;

        if self.get_setting(LATEST_STYLE_KEY).await?.as_deref() == Some(style_id) {
            sqlx::query("DELETE FROM settings WHERE key = ?")
                .bind(LATEST_STYLE_KEY)
                .execute(&self.pool)
                .await?;
        }

        debug!("deleted style: {}", style_id);
        Ok(true)
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    pub async fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
