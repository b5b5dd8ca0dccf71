// src/collect/mod.rs
//! Collection run coordinator.
//!
//! One tick loads every enabled source, runs the due ones through dispatch and
//! the storage writer, and stamps `last_run`. Each source runs in its own task:
//! an error or panic there is recorded for that source only, and its
//! `last_run` is still advanced.

pub mod due;
pub mod writer;

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use tracing::{info, warn};

use crate::crawl::Dispatcher;
use crate::error::{ConsoleError, SourceRunError, StoreError, TickError};
use crate::model::Source;
use crate::store::Store;

pub use due::{format_timestamp, is_due, parse_last_run};
pub use writer::StorageWriter;

/// Advisory counts for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Enabled sources that went through the due-check.
    pub evaluated: usize,
    /// Due sources that were run.
    pub run: usize,
    /// Runs that ended in an error or panic.
    pub failed: usize,
    /// Items appended across all runs.
    pub items: usize,
}

#[derive(Clone)]
pub struct Collector {
    store: Arc<dyn Store>,
    dispatcher: Arc<Dispatcher>,
    writer: StorageWriter,
    max_items: usize,
}

impl Collector {
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<Dispatcher>, max_items: usize) -> Self {
        Self {
            writer: StorageWriter::new(store.clone()),
            store,
            dispatcher,
            max_items: max_items.max(1),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Evaluate every enabled source once. Fails only if the source list cannot be loaded.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> Result<TickReport, TickError> {
        let sources = self
            .store
            .list_enabled_sources()
            .await
            .map_err(TickError::LoadSources)?;

        let mut report = TickReport::default();
        for source in sources.into_iter().filter(|s| s.enabled) {
            report.evaluated += 1;
            if !is_due(&source, now) {
                continue;
            }
            report.run += 1;
            counter!("collect_sources_run_total").increment(1);

            let owner = source.owner;
            match self.run_isolated(source.clone(), owner, now).await {
                Ok(n) => report.items += n,
                Err(e) => {
                    report.failed += 1;
                    counter!("collect_source_failures_total").increment(1);
                    warn!(target: "collect", source_id = source.id, keyword = %source.keyword, error = %e, "source run failed");
                }
            }
        }

        counter!("collect_ticks_total").increment(1);
        gauge!("collect_last_tick_ts").set(now.timestamp() as f64);
        Ok(report)
    }

    /// Manual trigger: run one source now regardless of its due state.
    ///
    /// `owner` is the requesting identity; when absent the source's own owner is used.
    pub async fn run_source_now(
        &self,
        id: i64,
        owner: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<usize, ConsoleError> {
        let source = self
            .store
            .get_source(id)
            .await?
            .ok_or(ConsoleError::not_found("source", id))?;
        let owner = owner.or(source.owner);
        let n = self.run_isolated(source, owner, now).await?;
        info!(target: "collect", source_id = id, items = n, "manual run finished");
        Ok(n)
    }

    /// Run one source in its own task, then stamp `last_run` whatever happened.
    async fn run_isolated(
        &self,
        source: Source,
        owner: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<usize, SourceRunError> {
        let this = self.clone();
        let task_source = source.clone();
        let joined = tokio::spawn(async move { this.collect_source(&task_source, owner).await }).await;
        let outcome = match joined {
            Ok(res) => res,
            Err(e) if e.is_panic() => Err(SourceRunError::Panicked(panic_message(e.into_panic()))),
            Err(e) => Err(SourceRunError::Panicked(e.to_string())),
        };

        let stamped = self
            .store
            .touch_last_run(source.id, &format_timestamp(now))
            .await;
        match (outcome, stamped) {
            (Ok(n), Ok(())) => Ok(n),
            (Ok(_), Err(e)) => Err(SourceRunError::Store(e)),
            (Err(run_err), Err(e)) => {
                warn!(target: "collect", source_id = source.id, error = %e, "last_run update failed");
                Err(run_err)
            }
            (Err(run_err), Ok(())) => Err(run_err),
        }
    }

    async fn collect_source(&self, source: &Source, owner: Option<i64>) -> Result<usize, SourceRunError> {
        let keyword = source.keyword.as_str();
        if let Some(name) = source.crawler() {
            let items = self.dispatcher.dispatch(name, keyword, self.max_items).await;
            let ids = self.writer.append(&items, keyword, owner).await?;
            return Ok(ids.len());
        }

        let registrations = self.store.list_enabled_crawlers().await?;
        if registrations.is_empty() {
            let default = self.dispatcher.default_name().to_string();
            let items = self.dispatcher.dispatch(&default, keyword, self.max_items).await;
            let ids = self.writer.append(&items, keyword, owner).await?;
            return Ok(ids.len());
        }

        // Every enabled registration runs once in its own task; results persist after each.
        let mut stored = 0usize;
        let mut first_err: Option<SourceRunError> = None;
        for reg in registrations {
            let this = self.clone();
            let name = reg.name.clone();
            let task_keyword = keyword.to_string();
            let joined =
                tokio::spawn(async move { this.dispatch_and_store(&name, &task_keyword, owner).await }).await;
            let outcome = match joined {
                Ok(Ok(n)) => Ok(n),
                Ok(Err(e)) => Err(SourceRunError::Store(e)),
                Err(e) if e.is_panic() => Err(SourceRunError::Panicked(panic_message(e.into_panic()))),
                Err(e) => Err(SourceRunError::Panicked(e.to_string())),
            };
            match outcome {
                Ok(n) => stored += n,
                Err(e) => {
                    warn!(target: "collect", source_id = source.id, crawler = %reg.name, error = %e, "crawler run failed");
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(stored),
        }
    }

    async fn dispatch_and_store(&self, name: &str, keyword: &str, owner: Option<i64>) -> Result<usize, StoreError> {
        let items = self.dispatcher.dispatch(name, keyword, self.max_items).await;
        let ids = self.writer.append(&items, keyword, owner).await?;
        Ok(ids.len())
    }
}

/// Text of a panic payload caught through a `JoinError`.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic".to_string()
    }
}
