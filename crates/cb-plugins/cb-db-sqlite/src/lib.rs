//! # cb-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite `content_items`
//! table and the `cb-core` domain models.
//!
//! # Developer Note
//! The pool is capped at a single connection: the store has exactly one
//! writer, and `sqlite::memory:` databases only exist per connection.

use std::str::FromStr;

use async_trait::async_trait;
use cb_core::error::{AppError, Result};
use cb_core::models::{ContentItem, ContentStatus, Transition};
use cb_core::traits::ContentRepo;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_ITEMS: u64 = 10_000;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS content_items (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        content    TEXT NOT NULL CHECK (length(trim(content)) > 0),
        status     TEXT NOT NULL CHECK (status IN ('pending', 'authorized', 'posted')),
        created_at TEXT NOT NULL,
        posted_at  TEXT,
        CHECK ((status = 'posted') = (posted_at IS NOT NULL))
    )",
    "CREATE INDEX IF NOT EXISTS idx_content_items_status ON content_items (status)",
];

const COLUMNS: &str = "id, content, status, created_at, posted_at";

// Fixed-width UTC text so that SQL string comparison matches time order.
const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub struct SqliteContentRepo {
    pool: SqlitePool,
    max_items: u64,
}

// Helpers for timestamp conversion
fn ts_to_text(ts: DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn text_to_ts(text: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, TS_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| AppError::StorageError(format!("bad timestamp '{text}': {e}")))
}

fn storage(err: sqlx::Error) -> AppError {
    AppError::StorageError(err.to_string())
}

/// `status IN (...)` restricted to the legal sources of `transition`.
fn source_filter(transition: Transition) -> String {
    let statuses = transition
        .sources()
        .iter()
        .map(|status| format!("'{}'", status.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("status IN ({statuses})")
}

fn row_to_item(row: &SqliteRow) -> Result<ContentItem> {
    let status: String = row.try_get("status").map_err(storage)?;
    let created_at: String = row.try_get("created_at").map_err(storage)?;
    let posted_at: Option<String> = row.try_get("posted_at").map_err(storage)?;

    Ok(ContentItem {
        id: row.try_get("id").map_err(storage)?,
        content: row.try_get("content").map_err(storage)?,
        status: status.parse::<ContentStatus>()?,
        created_at: text_to_ts(&created_at)?,
        posted_at: posted_at.as_deref().map(text_to_ts).transpose()?,
    })
}

/// Rejects blank text. Accepted text is stored exactly as given.
fn validate_content(content: &str) -> Result<&str> {
    if content.trim().is_empty() {
        return Err(AppError::ValidationError("content must not be empty".into()));
    }
    Ok(content)
}

impl SqliteContentRepo {
    /// Opens (creating if needed) the database at `database_url` and makes
    /// sure the schema exists.
    pub async fn new(database_url: &str, max_items: u64) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(storage)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(storage)?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(storage)?;
        }

        Ok(Self { pool, max_items })
    }

    /// Inline eviction after inserts. Failures are logged, never raised, so a
    /// committed insert is always reported as such.
    async fn check_capacity(&self) {
        if let Err(e) = self.enforce_capacity(self.max_items).await {
            warn!(error = %e, "capacity check after insert failed");
        }
    }

    async fn fetch_items(&self, sql: &str, bind: Option<i64>) -> Result<Vec<ContentItem>> {
        let mut query = sqlx::query(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        query
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?
            .iter()
            .map(row_to_item)
            .collect()
    }
}

#[async_trait]
impl ContentRepo for SqliteContentRepo {
    async fn insert(&self, content: &str) -> Result<i64> {
        let content = validate_content(content)?;

        let id = sqlx::query("INSERT INTO content_items (content, status, created_at) VALUES (?, ?, ?)")
            .bind(content)
            .bind(ContentStatus::Pending.as_str())
            .bind(ts_to_text(Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(storage)?
            .last_insert_rowid();

        self.check_capacity().await;
        Ok(id)
    }

    /// Blank entries are skipped; the rest commit together or not at all.
    async fn insert_many(&self, contents: &[String]) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let mut inserted = 0;

        for content in contents {
            let Ok(content) = validate_content(content) else {
                debug!("skipping blank entry in batch insert");
                continue;
            };
            sqlx::query("INSERT INTO content_items (content, status, created_at) VALUES (?, ?, ?)")
                .bind(content)
                .bind(ContentStatus::Pending.as_str())
                .bind(ts_to_text(Utc::now()))
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
            inserted += 1;
        }

        tx.commit().await.map_err(storage)?;
        self.check_capacity().await;
        Ok(inserted)
    }

    async fn update_content(&self, id: i64, content: &str) -> Result<bool> {
        let content = validate_content(content)?;
        // editable exactly while the item can still be removed
        let sql = format!(
            "UPDATE content_items SET content = ? WHERE id = ? AND {}",
            source_filter(Transition::Remove)
        );
        let result = sqlx::query(&sql)
            .bind(content)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, id: i64) -> Result<Option<ContentItem>> {
        let sql = format!("SELECT {COLUMNS} FROM content_items WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.as_ref().map(row_to_item).transpose()
    }

    async fn list_pending(&self) -> Result<Vec<ContentItem>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM content_items WHERE status = 'pending' ORDER BY id ASC"
        );
        self.fetch_items(&sql, None).await
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<ContentItem>> {
        let sql = format!("SELECT {COLUMNS} FROM content_items ORDER BY id DESC LIMIT ?");
        self.fetch_items(&sql, Some(limit)).await
    }

    async fn next_authorized(&self) -> Result<Option<ContentItem>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM content_items WHERE status = 'authorized' \
             ORDER BY created_at ASC, id ASC LIMIT 1"
        );
        Ok(self.fetch_items(&sql, None).await?.into_iter().next())
    }

    async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM content_items")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)
    }

    async fn authorize(&self, id: i64) -> Result<bool> {
        let sql = format!(
            "UPDATE content_items SET status = ? WHERE id = ? AND {}",
            source_filter(Transition::Authorize)
        );
        let result = sqlx::query(&sql)
            .bind(ContentStatus::Authorized.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        let applied = result.rows_affected() > 0;
        if !applied {
            debug!(id, "authorize skipped: no pending item with this id");
        }
        Ok(applied)
    }

    async fn remove(&self, id: i64) -> Result<bool> {
        let sql = format!(
            "DELETE FROM content_items WHERE id = ? AND {}",
            source_filter(Transition::Remove)
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        let applied = result.rows_affected() > 0;
        if !applied {
            debug!(id, "remove skipped: no queued item with this id");
        }
        Ok(applied)
    }

    async fn mark_posted(&self, id: i64) -> Result<bool> {
        let sql = format!(
            "UPDATE content_items SET status = ?, posted_at = ? WHERE id = ? AND {}",
            source_filter(Transition::PublishSucceeded)
        );
        let result = sqlx::query(&sql)
            .bind(ContentStatus::Posted.as_str())
            .bind(ts_to_text(Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        let applied = result.rows_affected() > 0;
        if !applied {
            debug!(id, "mark_posted skipped: no authorized item with this id");
        }
        Ok(applied)
    }

    async fn cleanup_older_than(&self, days: u32) -> Result<u64> {
        let Some(cutoff) = Utc::now().checked_sub_signed(Duration::days(i64::from(days))) else {
            debug!(days, "retention window reaches past the earliest representable time");
            return Ok(0);
        };
        let removed = sqlx::query(
            "DELETE FROM content_items WHERE status = 'posted' AND posted_at < ?",
        )
        .bind(ts_to_text(cutoff))
        .execute(&self.pool)
        .await
        .map_err(storage)?
        .rows_affected();

        info!(days, removed, "cleaned up posted items past retention");
        Ok(removed)
    }

    /// Evicts the oldest posted rows until the table holds at most
    /// `max_items`, or no posted rows remain.
    async fn enforce_capacity(&self, max_items: u64) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_items")
            .fetch_one(&mut *tx)
            .await
            .map_err(storage)?;
        let count = u64::try_from(count).unwrap_or_default();
        if count <= max_items {
            return Ok(0);
        }

        let excess = count - max_items;
        let removed = sqlx::query(
            "DELETE FROM content_items WHERE id IN (
                SELECT id FROM content_items
                WHERE status = 'posted'
                ORDER BY posted_at ASC, id ASC
                LIMIT ?
            )",
        )
        .bind(i64::try_from(excess).unwrap_or(i64::MAX))
        .execute(&mut *tx)
        .await
        .map_err(storage)?
        .rows_affected();

        tx.commit().await.map_err(storage)?;

        if removed < excess {
            warn!(
                count,
                max_items, removed, "over capacity but not enough posted items to evict"
            );
        } else {
            info!(removed, max_items, "evicted oldest posted items to stay within capacity");
        }
        Ok(removed)
    }

    async fn compact(&self) -> Result<()> {
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        info!("database compacted");
        Ok(())
    }
}
