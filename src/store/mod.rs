// src/store/mod.rs
//! Persistent store contract used by the collector and the console.

pub mod sqlite;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{
    CrawlerRegistration, CrawlerUpdate, Item, ItemDraft, ItemFilter, NewSource, Source,
    SourceUpdate,
};

pub use sqlite::SqliteStore;

/// Row-level operations over sources, crawler registrations and items.
///
/// Mutations that target a row by id return `false` when no row matched.
/// Each call is a single short statement; no lock outlives one call.
#[async_trait]
pub trait Store: Send + Sync {
    async fn list_sources(&self, owner: Option<i64>) -> Result<Vec<Source>, StoreError>;
    async fn list_enabled_sources(&self) -> Result<Vec<Source>, StoreError>;
    async fn get_source(&self, id: i64) -> Result<Option<Source>, StoreError>;
    /// `new` must already carry resolved defaults.
    async fn insert_source(&self, new: &NewSource) -> Result<i64, StoreError>;
    async fn update_source(&self, id: i64, update: &SourceUpdate) -> Result<bool, StoreError>;
    async fn set_source_enabled(&self, id: i64, enabled: bool) -> Result<bool, StoreError>;
    async fn delete_source(&self, id: i64) -> Result<bool, StoreError>;
    async fn touch_last_run(&self, id: i64, at: &str) -> Result<(), StoreError>;

    async fn list_crawlers(&self) -> Result<Vec<CrawlerRegistration>, StoreError>;
    async fn list_enabled_crawlers(&self) -> Result<Vec<CrawlerRegistration>, StoreError>;
    async fn find_enabled_crawler(
        &self,
        name: &str,
    ) -> Result<Option<CrawlerRegistration>, StoreError>;
    async fn find_crawler_by_name(
        &self,
        name: &str,
    ) -> Result<Option<CrawlerRegistration>, StoreError>;
    async fn get_crawler(&self, id: i64) -> Result<Option<CrawlerRegistration>, StoreError>;
    async fn insert_crawler(
        &self,
        name: &str,
        kind: &str,
        config: &serde_json::Value,
        enabled: bool,
    ) -> Result<i64, StoreError>;
    async fn update_crawler(&self, id: i64, update: &CrawlerUpdate) -> Result<bool, StoreError>;
    async fn set_crawler_enabled(&self, id: i64, enabled: bool) -> Result<bool, StoreError>;
    async fn delete_crawler(&self, id: i64) -> Result<bool, StoreError>;

    /// Append one item row. There is no existence check against prior rows.
    async fn insert_item(
        &self,
        keyword: &str,
        owner: Option<i64>,
        draft: &ItemDraft,
    ) -> Result<i64, StoreError>;
    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<Item>, StoreError>;
    async fn get_item(&self, id: i64) -> Result<Option<Item>, StoreError>;
}
