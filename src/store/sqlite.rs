// src/store/sqlite.rs
//! SQLite-backed store. Every operation opens its own short-lived connection
//! on the blocking pool, so the scheduler and request handlers never share a
//! connection or hold a write lock across calls.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::error::StoreError;
use crate::model::{
    CrawlerRegistration, CrawlerUpdate, Item, ItemDraft, ItemFilter, NewSource, Source,
    SourceUpdate, DEFAULT_INTERVAL_MINUTES,
};
use crate::store::Store;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sources (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    keyword          TEXT    NOT NULL,
    interval_minutes INTEGER NOT NULL DEFAULT 60,
    enabled          INTEGER NOT NULL DEFAULT 1,
    crawler_name     TEXT    NOT NULL DEFAULT '',
    last_run         TEXT,
    user_id          INTEGER,
    created_at       TEXT    NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_sources_enabled ON sources(enabled);

CREATE TABLE IF NOT EXISTS crawlers (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT    NOT NULL UNIQUE,
    kind       TEXT    NOT NULL,
    config     TEXT    NOT NULL DEFAULT '{}',
    enabled    INTEGER NOT NULL DEFAULT 1,
    created_at TEXT    NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS items (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    keyword       TEXT    NOT NULL,
    title         TEXT    NOT NULL DEFAULT '',
    summary       TEXT    NOT NULL DEFAULT '',
    cover_url     TEXT    NOT NULL DEFAULT '',
    canonical_url TEXT    NOT NULL DEFAULT '',
    source_label  TEXT    NOT NULL DEFAULT '',
    user_id       INTEGER,
    created_at    TEXT    NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_items_keyword ON items(keyword);
"#;

const SOURCE_COLUMNS: &str =
    "id, keyword, interval_minutes, enabled, crawler_name, last_run, user_id, created_at";
const CRAWLER_COLUMNS: &str = "id, name, kind, config, enabled, created_at";
const ITEM_COLUMNS: &str =
    "id, keyword, title, summary, cover_url, canonical_url, source_label, user_id, created_at";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Task(format!("creating {}: {e}", parent.display())))?;
        }
        let conn = connect(&path)?;
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = connect(&path)?;
            f(&conn).map_err(StoreError::from)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn connect(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// `last_run` is read loosely so that malformed values reach the due-check.
fn loose_text(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get::<_, SqlValue>(idx)? {
        SqlValue::Null => None,
        SqlValue::Text(s) => Some(s),
        SqlValue::Integer(i) => Some(i.to_string()),
        SqlValue::Real(f) => Some(f.to_string()),
        SqlValue::Blob(_) => Some(String::new()),
    })
}

fn source_from_row(row: &Row<'_>) -> rusqlite::Result<Source> {
    Ok(Source {
        id: row.get(0)?,
        keyword: row.get(1)?,
        interval_minutes: row.get(2)?,
        enabled: row.get(3)?,
        crawler_name: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        last_run: loose_text(row, 5)?,
        owner: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// An unparsable `config` reads as `null` so one bad row cannot hide the rest;
/// dispatch then treats the registration as unusable and falls back.
fn crawler_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlerRegistration> {
    let id: i64 = row.get(0)?;
    let raw = loose_text(row, 3)?.unwrap_or_default();
    let config = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(target: "store", crawler_id = id, error = %e, "unparsable crawler config");
            serde_json::Value::Null
        }
    };
    Ok(CrawlerRegistration {
        id,
        name: row.get(1)?,
        kind: row.get(2)?,
        config,
        enabled: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        keyword: row.get(1)?,
        title: row.get(2)?,
        summary: row.get(3)?,
        cover_url: row.get(4)?,
        canonical_url: row.get(5)?,
        source_label: row.get(6)?,
        owner: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn list_sources(&self, owner: Option<i64>) -> Result<Vec<Source>, StoreError> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {SOURCE_COLUMNS} FROM sources WHERE (?1 IS NULL OR user_id = ?1) ORDER BY id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![owner], source_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn list_enabled_sources(&self) -> Result<Vec<Source>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE enabled = 1 ORDER BY id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], source_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn get_source(&self, id: i64) -> Result<Option<Source>, StoreError> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?1");
            conn.query_row(&sql, params![id], source_from_row).optional()
        })
        .await
    }

    async fn insert_source(&self, new: &NewSource) -> Result<i64, StoreError> {
        let new = new.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sources (keyword, interval_minutes, enabled, crawler_name, user_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    new.keyword,
                    new.interval_minutes.unwrap_or(DEFAULT_INTERVAL_MINUTES),
                    new.enabled.unwrap_or(true),
                    new.crawler_name.unwrap_or_default(),
                    new.owner,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn update_source(&self, id: i64, update: &SourceUpdate) -> Result<bool, StoreError> {
        let update = update.clone();
        self.with_conn(move |conn| {
            let n = conn.execute(
                "UPDATE sources
                 SET crawler_name = COALESCE(?1, crawler_name),
                     interval_minutes = COALESCE(?2, interval_minutes)
                 WHERE id = ?3",
                params![update.crawler_name, update.interval_minutes, id],
            )?;
            Ok(n > 0)
        })
        .await
    }

    async fn set_source_enabled(&self, id: i64, enabled: bool) -> Result<bool, StoreError> {
        self.with_conn(move |conn| {
            let n = conn.execute(
                "UPDATE sources SET enabled = ?1 WHERE id = ?2",
                params![enabled, id],
            )?;
            Ok(n > 0)
        })
        .await
    }

    async fn delete_source(&self, id: i64) -> Result<bool, StoreError> {
        self.with_conn(move |conn| {
            let n = conn.execute("DELETE FROM sources WHERE id = ?1", params![id])?;
            Ok(n > 0)
        })
        .await
    }

    async fn touch_last_run(&self, id: i64, at: &str) -> Result<(), StoreError> {
        let at = at.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE sources SET last_run = ?1 WHERE id = ?2",
                params![at, id],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_crawlers(&self) -> Result<Vec<CrawlerRegistration>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {CRAWLER_COLUMNS} FROM crawlers ORDER BY id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], crawler_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn list_enabled_crawlers(&self) -> Result<Vec<CrawlerRegistration>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {CRAWLER_COLUMNS} FROM crawlers WHERE enabled = 1 ORDER BY id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], crawler_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn find_enabled_crawler(
        &self,
        name: &str,
    ) -> Result<Option<CrawlerRegistration>, StoreError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let sql =
                format!("SELECT {CRAWLER_COLUMNS} FROM crawlers WHERE name = ?1 AND enabled = 1");
            conn.query_row(&sql, params![name], crawler_from_row).optional()
        })
        .await
    }

    async fn find_crawler_by_name(
        &self,
        name: &str,
    ) -> Result<Option<CrawlerRegistration>, StoreError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {CRAWLER_COLUMNS} FROM crawlers WHERE name = ?1");
            conn.query_row(&sql, params![name], crawler_from_row).optional()
        })
        .await
    }

    async fn get_crawler(&self, id: i64) -> Result<Option<CrawlerRegistration>, StoreError> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {CRAWLER_COLUMNS} FROM crawlers WHERE id = ?1");
            conn.query_row(&sql, params![id], crawler_from_row).optional()
        })
        .await
    }

    async fn insert_crawler(
        &self,
        name: &str,
        kind: &str,
        config: &serde_json::Value,
        enabled: bool,
    ) -> Result<i64, StoreError> {
        let (name, kind, config) = (name.to_string(), kind.to_string(), config.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO crawlers (name, kind, config, enabled) VALUES (?1, ?2, ?3, ?4)",
                params![name, kind, config, enabled],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn update_crawler(&self, id: i64, update: &CrawlerUpdate) -> Result<bool, StoreError> {
        let kind = update.kind.clone();
        let config = update.config.as_ref().map(|c| c.to_string());
        self.with_conn(move |conn| {
            let n = conn.execute(
                "UPDATE crawlers
                 SET kind = COALESCE(?1, kind), config = COALESCE(?2, config)
                 WHERE id = ?3",
                params![kind, config, id],
            )?;
            Ok(n > 0)
        })
        .await
    }

    async fn set_crawler_enabled(&self, id: i64, enabled: bool) -> Result<bool, StoreError> {
        self.with_conn(move |conn| {
            let n = conn.execute(
                "UPDATE crawlers SET enabled = ?1 WHERE id = ?2",
                params![enabled, id],
            )?;
            Ok(n > 0)
        })
        .await
    }

    async fn delete_crawler(&self, id: i64) -> Result<bool, StoreError> {
        self.with_conn(move |conn| {
            let n = conn.execute("DELETE FROM crawlers WHERE id = ?1", params![id])?;
            Ok(n > 0)
        })
        .await
    }

    async fn insert_item(
        &self,
        keyword: &str,
        owner: Option<i64>,
        draft: &ItemDraft,
    ) -> Result<i64, StoreError> {
        let keyword = keyword.to_string();
        let draft = draft.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO items
                   (keyword, title, summary, cover_url, canonical_url, source_label, user_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    keyword,
                    draft.title,
                    draft.summary,
                    draft.cover_url,
                    draft.canonical_url,
                    draft.source_label,
                    owner,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<Item>, StoreError> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let mut sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE 1 = 1");
            let mut args: Vec<SqlValue> = Vec::new();
            if let Some(keyword) = filter.keyword.filter(|k| !k.trim().is_empty()) {
                args.push(SqlValue::Text(keyword.trim().to_string()));
                sql.push_str(&format!(" AND keyword = ?{}", args.len()));
            }
            if let Some(owner) = filter.owner {
                args.push(SqlValue::Integer(owner));
                sql.push_str(&format!(" AND user_id = ?{}", args.len()));
            }
            args.push(SqlValue::Integer(filter.limit.clamp(1, 1000) as i64));
            sql.push_str(&format!(" ORDER BY id DESC LIMIT ?{}", args.len()));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args), item_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn get_item(&self, id: i64) -> Result<Option<Item>, StoreError> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1");
            conn.query_row(&sql, params![id], item_from_row).optional()
        })
        .await
    }
}
