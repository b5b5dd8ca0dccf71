// src/crawl/mod.rs
//! Crawler registry and dispatcher.
//!
//! A dispatch name resolves, first match wins, to:
//!   1. a built-in strategy registered under that name,
//!   2. an enabled crawler registration in the store (built-in tag or template),
//!   3. the default strategy, also used whenever 1–2 fail for any reason.
//!
//! Dispatch never returns an error. Strategies swallow transient per-page
//! failures themselves and report only "cannot run at all" conditions.

pub mod baidu;
pub mod template;
pub mod xinhua;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::CrawlConfig;
use crate::error::{FetchError, StoreError, StrategyError};
use crate::model::{CrawlerKind, CrawlerRegistration, ItemDraft, RawPayload};
use crate::normalize::normalize;
use crate::store::Store;

/// A pluggable fetch implementation producing normalized items for a keyword.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch up to `max_items` items. `config` is the registration's opaque
    /// config (`Value::Null` for direct built-in dispatch).
    async fn fetch(
        &self,
        keyword: &str,
        max_items: usize,
        config: &Value,
    ) -> Result<Vec<ItemDraft>, StrategyError>;
}

/// How a dispatch name was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Builtin(String),
    Registered(String),
    Default(String),
}

#[derive(Debug, thiserror::Error)]
enum Unresolved {
    #[error("no built-in or enabled registration named `{0}`")]
    UnknownName(String),
    #[error("registration `{name}` points at unknown kind `{kind}`")]
    UnknownKind { name: String, kind: String },
    #[error("registration lookup failed: {0}")]
    Lookup(#[from] StoreError),
    #[error(transparent)]
    Strategy(#[from] StrategyError),
}

pub struct Dispatcher {
    store: Arc<dyn Store>,
    builtins: HashMap<String, Arc<dyn Strategy>>,
    template: Option<Arc<dyn Strategy>>,
    default_name: String,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, default_name: impl Into<String>) -> Self {
        Self {
            store,
            builtins: HashMap::new(),
            template: None,
            default_name: default_name.into(),
        }
    }

    /// Dispatcher with the stock built-ins (`baidu`, `xinhua`) and the template strategy.
    pub fn standard(store: Arc<dyn Store>, cfg: &CrawlConfig) -> Result<Self, FetchError> {
        let client = build_client(cfg)?;
        Ok(Self::new(store, cfg.default_strategy.clone())
            .with_builtin(Arc::new(baidu::BaiduStrategy::new(client.clone(), cfg.max_pages)))
            .with_builtin(Arc::new(xinhua::XinhuaStrategy::new(client.clone(), cfg.max_pages)))
            .with_template(Arc::new(template::TemplateStrategy::new(client, cfg.max_pages))))
    }

    /// Register a built-in under its own `name()`.
    pub fn with_builtin(mut self, strategy: Arc<dyn Strategy>) -> Self {
        self.builtins.insert(strategy.name().to_string(), strategy);
        self
    }

    pub fn with_template(mut self, strategy: Arc<dyn Strategy>) -> Self {
        self.template = Some(strategy);
        self
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn is_builtin(&self, tag: &str) -> bool {
        self.builtins.contains_key(tag)
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Resolve `name` and fetch. Never fails; falls back to the default strategy.
    pub async fn dispatch(&self, name: &str, keyword: &str, max_items: usize) -> Vec<ItemDraft> {
        self.dispatch_traced(name, keyword, max_items).await.1
    }

    /// Like `dispatch`, also reporting which resolution step produced the items.
    pub async fn dispatch_traced(
        &self,
        name: &str,
        keyword: &str,
        max_items: usize,
    ) -> (Resolution, Vec<ItemDraft>) {
        let t0 = Instant::now();
        let out = match self.resolve_and_run(name.trim(), keyword, max_items).await {
            Ok(hit) => hit,
            Err(reason) => {
                warn!(target: "crawl", crawler = name, keyword, reason = %reason, "dispatch falling back to default strategy");
                counter!("crawl_fallbacks_total").increment(1);
                (
                    Resolution::Default(self.default_name.clone()),
                    self.run_default(keyword, max_items).await,
                )
            }
        };
        histogram!("crawl_dispatch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        debug!(target: "crawl", crawler = name, keyword, resolution = ?out.0, items = out.1.len(), "dispatch done");
        out
    }

    async fn resolve_and_run(
        &self,
        name: &str,
        keyword: &str,
        max_items: usize,
    ) -> Result<(Resolution, Vec<ItemDraft>), Unresolved> {
        if let Some(strategy) = self.builtins.get(name) {
            let items = strategy.fetch(keyword, max_items, &Value::Null).await?;
            return Ok((Resolution::Builtin(name.to_string()), items));
        }

        let reg = self
            .store
            .find_enabled_crawler(name)
            .await?
            .ok_or_else(|| Unresolved::UnknownName(name.to_string()))?;
        let strategy = self.strategy_for(&reg)?;
        let items = strategy.fetch(keyword, max_items, &reg.config).await?;
        Ok((Resolution::Registered(reg.name), items))
    }

    fn strategy_for(&self, reg: &CrawlerRegistration) -> Result<Arc<dyn Strategy>, Unresolved> {
        let found = match reg.crawler_kind() {
            CrawlerKind::Builtin(tag) => self.builtins.get(&tag).cloned(),
            CrawlerKind::Template => self.template.clone(),
        };
        found.ok_or_else(|| Unresolved::UnknownKind {
            name: reg.name.clone(),
            kind: reg.kind.clone(),
        })
    }

    async fn run_default(&self, keyword: &str, max_items: usize) -> Vec<ItemDraft> {
        let Some(strategy) = self.builtins.get(&self.default_name) else {
            warn!(target: "crawl", default = %self.default_name, "default strategy is not registered");
            return Vec::new();
        };
        match strategy.fetch(keyword, max_items, &Value::Null).await {
            Ok(items) => items,
            Err(e) => {
                warn!(target: "crawl", default = %self.default_name, error = %e, "default strategy failed");
                Vec::new()
            }
        }
    }
}

/// Build the shared HTTP client. Every request carries an explicit timeout.
pub fn build_client(cfg: &CrawlConfig) -> Result<reqwest::Client, FetchError> {
    let client = reqwest::Client::builder()
        .user_agent(cfg.user_agent.clone())
        .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .build()?;
    Ok(client)
}

/// Send a request and read the body, mapping non-2xx to `FetchError::Status`.
pub(crate) async fn fetch_text(req: reqwest::RequestBuilder) -> Result<String, FetchError> {
    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }
    Ok(resp.text().await?)
}

/// Keys already emitted within one dispatch call.
#[derive(Debug, Default)]
pub struct SeenKeys(HashSet<String>);

impl SeenKeys {
    /// True when the draft's URL-or-title key has not been seen yet.
    pub fn admit(&mut self, draft: &ItemDraft) -> bool {
        self.0.insert(draft.dedup_key().to_string())
    }
}

/// Normalize `payloads` into `out`, skipping duplicates, until `max_items`.
/// Returns how many new items were added.
pub fn collect_payloads(
    out: &mut Vec<ItemDraft>,
    seen: &mut SeenKeys,
    payloads: Vec<RawPayload>,
    max_items: usize,
) -> usize {
    let before = out.len();
    for raw in payloads {
        if out.len() >= max_items {
            break;
        }
        if let Some(draft) = normalize(&raw) {
            if seen.admit(&draft) {
                out.push(draft);
            }
        }
    }
    out.len() - before
}

/// Drive a paged fetch until `max_items`, `max_pages`, or upstream exhaustion.
///
/// A page that errors counts as a page with zero items and paging moves on.
/// An empty page, or a page with nothing new, means upstream is exhausted.
pub(crate) async fn paginate<F, Fut>(
    strategy: &str,
    max_items: usize,
    max_pages: usize,
    mut fetch_page: F,
) -> Vec<ItemDraft>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Vec<RawPayload>, FetchError>>,
{
    let mut out = Vec::new();
    let mut seen = SeenKeys::default();
    for page in 0..max_pages.max(1) {
        if out.len() >= max_items {
            break;
        }
        match fetch_page(page).await {
            Ok(payloads) if payloads.is_empty() => break,
            Ok(payloads) => {
                if collect_payloads(&mut out, &mut seen, payloads, max_items) == 0 {
                    break;
                }
            }
            Err(e) => {
                warn!(target: "crawl", strategy, page, error = %e, "page fetch failed; treating as empty");
                counter!("crawl_fetch_errors_total").increment(1);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::payload;

    #[test]
    fn collect_dedupes_by_url_then_title() {
        let mut out = Vec::new();
        let mut seen = SeenKeys::default();
        let page = vec![
            payload([("title", "a"), ("url", "https://x.test/1")]),
            payload([("title", "b"), ("url", "https://x.test/1")]),
            payload([("title", "c")]),
            payload([("title", "c")]),
            payload([("summary", "no title or url")]),
        ];
        let added = collect_payloads(&mut out, &mut seen, page, 10);
        assert_eq!(added, 2);
        assert_eq!(out[0].title, "a");
        assert_eq!(out[1].title, "c");
    }

    #[tokio::test]
    async fn paginate_skips_failed_pages_and_stops_at_max() {
        let items = paginate("t", 3, 5, |page| async move {
            match page {
                0 => Err(FetchError::Status(503)),
                1 => Ok(vec![payload([("title", "p1")])]),
                _ => Ok(vec![
                    payload([("title", format!("p{page}a"))]),
                    payload([("title", format!("p{page}b"))]),
                ]),
            }
        })
        .await;
        let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["p1", "p2a", "p2b"]);
    }

    #[tokio::test]
    async fn paginate_stops_when_a_page_repeats() {
        let mut calls = 0usize;
        let items = paginate("t", 50, 10, |_| {
            calls += 1;
            async { Ok(vec![payload([("title", "same")])]) }
        })
        .await;
        assert_eq!(items.len(), 1);
        assert_eq!(calls, 2);
    }
}
