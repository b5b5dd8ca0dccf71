// tests/common/mod.rs
//
// Shared fixtures: a temp SQLite store and stub strategies that never touch
// the network.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;

use crawl_console::crawl::{Dispatcher, Strategy};
use crawl_console::error::StrategyError;
use crawl_console::model::ItemDraft;
use crawl_console::store::{SqliteStore, Store};
use crawl_console::Collector;

pub const DEFAULT: &str = "fallback";

pub fn temp_store() -> (TempDir, Arc<dyn Store>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::open(dir.path().join("console.db")).expect("open store");
    (dir, Arc::new(store))
}

pub fn draft(title: &str, url: &str) -> ItemDraft {
    ItemDraft {
        title: title.to_string(),
        canonical_url: url.to_string(),
        ..ItemDraft::default()
    }
}

/// Returns one item per call, titled `<name>:<keyword>`, and records the keywords it saw.
pub struct EchoStrategy {
    name: String,
    pub calls: AtomicUsize,
    pub keywords: Mutex<Vec<String>>,
}

impl EchoStrategy {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
            keywords: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Strategy for EchoStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(
        &self,
        keyword: &str,
        max_items: usize,
        _config: &Value,
    ) -> Result<Vec<ItemDraft>, StrategyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.keywords.lock().unwrap().push(keyword.to_string());
        let title = format!("{}:{keyword}", self.name);
        let url = format!("https://{}.test/{keyword}", self.name);
        Ok(vec![draft(&title, &url)].into_iter().take(max_items).collect())
    }
}

/// Always reports that it cannot run.
pub struct BrokenStrategy(pub &'static str);

#[async_trait]
impl Strategy for BrokenStrategy {
    fn name(&self) -> &str {
        self.0
    }

    async fn fetch(&self, _: &str, _: usize, _: &Value) -> Result<Vec<ItemDraft>, StrategyError> {
        Err(StrategyError::Unavailable("stub outage".into()))
    }
}

/// Panics inside `fetch`.
pub struct PanickyStrategy(pub &'static str);

#[async_trait]
impl Strategy for PanickyStrategy {
    fn name(&self) -> &str {
        self.0
    }

    async fn fetch(&self, _: &str, _: usize, _: &Value) -> Result<Vec<ItemDraft>, StrategyError> {
        panic!("strategy blew up");
    }
}

/// Echoes the registration config's `title` field, to prove the config reached it.
pub struct ConfigEcho;

#[async_trait]
impl Strategy for ConfigEcho {
    fn name(&self) -> &str {
        "template"
    }

    async fn fetch(&self, _: &str, _: usize, config: &Value) -> Result<Vec<ItemDraft>, StrategyError> {
        let title = config
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| StrategyError::Config("missing title".into()))?;
        Ok(vec![draft(title, "")])
    }
}

pub struct Harness {
    pub _dir: TempDir,
    pub store: Arc<dyn Store>,
    pub fallback: Arc<EchoStrategy>,
    pub alpha: Arc<EchoStrategy>,
    pub beta: Arc<EchoStrategy>,
    pub dispatcher: Arc<Dispatcher>,
    pub collector: Collector,
}

/// Store plus a dispatcher with built-ins `fallback` (default), `alpha`,
/// `beta`, `broken` and `boom`, and `ConfigEcho` as the template strategy.
pub fn harness() -> Harness {
    let (dir, store) = temp_store();
    let fallback = EchoStrategy::new(DEFAULT);
    let alpha = EchoStrategy::new("alpha");
    let beta = EchoStrategy::new("beta");
    let dispatcher = Arc::new(
        Dispatcher::new(store.clone(), DEFAULT)
            .with_builtin(fallback.clone())
            .with_builtin(alpha.clone())
            .with_builtin(beta.clone())
            .with_builtin(Arc::new(BrokenStrategy("broken")))
            .with_builtin(Arc::new(PanickyStrategy("boom")))
            .with_template(Arc::new(ConfigEcho)),
    );
    let collector = Collector::new(store.clone(), dispatcher.clone(), 10);
    Harness {
        _dir: dir,
        store,
        fallback,
        alpha,
        beta,
        dispatcher,
        collector,
    }
}
