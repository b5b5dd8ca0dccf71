// src/console.rs
//! Operations the web layer exposes: source CRUD, manual runs, crawler
//! registration CRUD, item listing and ad-hoc crawl previews.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::ai::Summarizer;
use crate::collect::Collector;
use crate::crawl::template::TemplateConfig;
use crate::error::ConsoleError;
use crate::model::{
    CrawlerKind, CrawlerRegistration, CrawlerUpdate, Item, ItemDraft, ItemFilter, NewCrawler,
    NewSource, Source, SourceUpdate, DEFAULT_INTERVAL_MINUTES, MIN_INTERVAL_MINUTES,
};
use crate::store::Store;

#[derive(Clone)]
pub struct Console {
    store: Arc<dyn Store>,
    collector: Collector,
}

impl Console {
    pub fn new(store: Arc<dyn Store>, collector: Collector) -> Self {
        Self { store, collector }
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    // ---- sources ----------------------------------------------------------

    pub async fn list_sources(&self, owner: Option<i64>) -> Result<Vec<Source>, ConsoleError> {
        Ok(self.store.list_sources(owner).await?)
    }

    pub async fn get_source(&self, id: i64) -> Result<Source, ConsoleError> {
        self.store
            .get_source(id)
            .await?
            .ok_or(ConsoleError::not_found("source", id))
    }

    /// Create a source. Interval defaults to 60 minutes (minimum 1); enabled defaults to true.
    pub async fn add_source(&self, new: NewSource) -> Result<i64, ConsoleError> {
        let keyword = new.keyword.trim();
        if keyword.is_empty() {
            return Err(ConsoleError::EmptyKeyword);
        }
        let resolved = NewSource {
            keyword: keyword.to_string(),
            interval_minutes: Some(
                new.interval_minutes
                    .unwrap_or(DEFAULT_INTERVAL_MINUTES)
                    .max(MIN_INTERVAL_MINUTES),
            ),
            enabled: Some(new.enabled.unwrap_or(true)),
            crawler_name: Some(new.crawler_name.unwrap_or_default().trim().to_string()),
            owner: new.owner,
        };
        let id = self.store.insert_source(&resolved).await?;
        info!(target: "api", source_id = id, keyword = %resolved.keyword, "source added");
        Ok(id)
    }

    /// Flip `enabled` and return the new state.
    pub async fn toggle_source(&self, id: i64) -> Result<bool, ConsoleError> {
        let source = self.get_source(id).await?;
        let next = !source.enabled;
        if !self.store.set_source_enabled(id, next).await? {
            return Err(ConsoleError::not_found("source", id));
        }
        Ok(next)
    }

    pub async fn update_source(&self, id: i64, update: SourceUpdate) -> Result<(), ConsoleError> {
        if update.is_empty() {
            return Err(ConsoleError::NoOp);
        }
        let update = SourceUpdate {
            crawler_name: update.crawler_name.map(|n| n.trim().to_string()),
            interval_minutes: update.interval_minutes.map(|m| m.max(MIN_INTERVAL_MINUTES)),
        };
        if !self.store.update_source(id, &update).await? {
            return Err(ConsoleError::not_found("source", id));
        }
        Ok(())
    }

    /// Remove a source. Collected items stay. Unknown ids are a no-op.
    pub async fn delete_source(&self, id: i64) -> Result<(), ConsoleError> {
        let removed = self.store.delete_source(id).await?;
        info!(target: "api", source_id = id, removed, "delete source");
        Ok(())
    }

    /// Run one source now, regardless of its schedule. Returns the stored item count.
    pub async fn run_source_now(&self, id: i64, owner: Option<i64>) -> Result<usize, ConsoleError> {
        self.collector.run_source_now(id, owner, Utc::now()).await
    }

    // ---- crawler registrations --------------------------------------------

    pub async fn list_crawlers(&self) -> Result<Vec<CrawlerRegistration>, ConsoleError> {
        Ok(self.store.list_crawlers().await?)
    }

    pub async fn add_crawler(&self, new: NewCrawler) -> Result<i64, ConsoleError> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(ConsoleError::EmptyCrawlerName);
        }
        // A registration named like a built-in would never be reached.
        if self.collector.dispatcher().is_builtin(name)
            || self.store.find_crawler_by_name(name).await?.is_some()
        {
            return Err(ConsoleError::DuplicateCrawler(name.to_string()));
        }
        let config = new.config.unwrap_or(Value::Null);
        let kind = self.validate_kind(&new.kind, &config)?;
        let id = self
            .store
            .insert_crawler(name, kind.as_str(), &config, new.enabled.unwrap_or(true))
            .await?;
        info!(target: "api", crawler_id = id, crawler = name, kind = kind.as_str(), "crawler registered");
        Ok(id)
    }

    pub async fn update_crawler(&self, id: i64, update: CrawlerUpdate) -> Result<(), ConsoleError> {
        if update.is_empty() {
            return Err(ConsoleError::NoOp);
        }
        let current = self
            .store
            .get_crawler(id)
            .await?
            .ok_or(ConsoleError::not_found("crawler", id))?;
        let kind_raw = update.kind.as_deref().unwrap_or(&current.kind);
        let config = update.config.as_ref().unwrap_or(&current.config);
        let kind = self.validate_kind(kind_raw, config)?;
        let update = CrawlerUpdate {
            kind: update.kind.map(|_| kind.as_str().to_string()),
            config: update.config,
        };
        if !self.store.update_crawler(id, &update).await? {
            return Err(ConsoleError::not_found("crawler", id));
        }
        Ok(())
    }

    pub async fn toggle_crawler(&self, id: i64) -> Result<bool, ConsoleError> {
        let current = self
            .store
            .get_crawler(id)
            .await?
            .ok_or(ConsoleError::not_found("crawler", id))?;
        let next = !current.enabled;
        if !self.store.set_crawler_enabled(id, next).await? {
            return Err(ConsoleError::not_found("crawler", id));
        }
        Ok(next)
    }

    pub async fn delete_crawler(&self, id: i64) -> Result<(), ConsoleError> {
        let removed = self.store.delete_crawler(id).await?;
        info!(target: "api", crawler_id = id, removed, "delete crawler");
        Ok(())
    }

    fn validate_kind(&self, raw: &str, config: &Value) -> Result<CrawlerKind, ConsoleError> {
        match CrawlerKind::parse(raw) {
            CrawlerKind::Builtin(tag) if tag.is_empty() => {
                Err(ConsoleError::InvalidCrawler("kind must not be empty".into()))
            }
            CrawlerKind::Builtin(tag) if !self.collector.dispatcher().is_builtin(&tag) => {
                Err(ConsoleError::InvalidCrawler(format!("unknown kind `{tag}`")))
            }
            CrawlerKind::Template => {
                TemplateConfig::from_value(config)
                    .map_err(|e| ConsoleError::InvalidCrawler(e.to_string()))?;
                Ok(CrawlerKind::Template)
            }
            kind => Ok(kind),
        }
    }

    // ---- items ------------------------------------------------------------

    pub async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<Item>, ConsoleError> {
        Ok(self.store.list_items(filter).await?)
    }

    pub async fn get_item(&self, id: i64) -> Result<Item, ConsoleError> {
        self.store
            .get_item(id)
            .await?
            .ok_or(ConsoleError::not_found("item", id))
    }

    /// Summarize a stored item. `None` when the summarizer has nothing to offer.
    pub async fn summarize_item(
        &self,
        id: i64,
        summarizer: &dyn Summarizer,
    ) -> Result<Option<String>, ConsoleError> {
        let item = self.get_item(id).await?;
        let text = if item.summary.is_empty() {
            item.title
        } else {
            format!("{}\n{}", item.title, item.summary)
        };
        Ok(summarizer.summarize(&text).await)
    }

    /// Dispatch without persisting. An empty keyword yields nothing, and so
    /// does a strategy that panics.
    pub async fn preview(&self, keyword: &str, crawler: Option<&str>) -> Vec<ItemDraft> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Vec::new();
        }
        let dispatcher = self.collector.dispatcher().clone();
        let name = crawler
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(dispatcher.default_name())
            .to_string();
        let task_keyword = keyword.to_string();
        let max_items = self.collector.max_items();
        let task_name = name.clone();
        let joined =
            tokio::spawn(async move { dispatcher.dispatch(&task_name, &task_keyword, max_items).await }).await;
        match joined {
            Ok(items) => items,
            Err(e) => {
                warn!(target: "api", crawler = %name, keyword, error = %e, "preview crawl aborted");
                Vec::new()
            }
        }
    }
}
