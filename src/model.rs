// src/model.rs
//! Rows the console persists: sources, crawler registrations and collected items.

use serde::{Deserialize, Serialize};

/// Default cadence for a new source.
pub const DEFAULT_INTERVAL_MINUTES: i64 = 60;
/// Smallest cadence a source may carry.
pub const MIN_INTERVAL_MINUTES: i64 = 1;

/// Heterogeneous key/value payload emitted by a strategy before normalization.
pub type RawPayload = serde_json::Map<String, serde_json::Value>;

/// A saved keyword-tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub id: i64,
    pub keyword: String,
    pub interval_minutes: i64,
    pub enabled: bool,
    /// Empty means "run every enabled registration, or the default strategy".
    pub crawler_name: String,
    /// Raw UTC text as stored; may be malformed.
    pub last_run: Option<String>,
    pub owner: Option<i64>,
    pub created_at: String,
}

impl Source {
    /// Cadence with the minimum applied.
    pub fn effective_interval_minutes(&self) -> i64 {
        self.interval_minutes.max(MIN_INTERVAL_MINUTES)
    }

    pub fn crawler(&self) -> Option<&str> {
        let name = self.crawler_name.trim();
        (!name.is_empty()).then_some(name)
    }
}

/// Input for `add_source`; absent fields take defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSource {
    pub keyword: String,
    #[serde(default)]
    pub interval_minutes: Option<i64>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub crawler_name: Option<String>,
    #[serde(default)]
    pub owner: Option<i64>,
}

/// Fields `update_source` recognizes. At least one must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceUpdate {
    #[serde(default)]
    pub crawler_name: Option<String>,
    #[serde(default)]
    pub interval_minutes: Option<i64>,
}

impl SourceUpdate {
    pub fn is_empty(&self) -> bool {
        self.crawler_name.is_none() && self.interval_minutes.is_none()
    }
}

/// Which fetch strategy a registration points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlerKind {
    /// A built-in strategy tag such as `baidu` or `xinhua`.
    Builtin(String),
    /// Declarative HTTP template driven by the registration's config.
    Template,
}

impl CrawlerKind {
    pub const TEMPLATE: &'static str = "template";

    pub fn parse(raw: &str) -> Self {
        let tag = raw.trim().to_ascii_lowercase();
        if tag == Self::TEMPLATE {
            Self::Template
        } else {
            Self::Builtin(tag)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Builtin(tag) => tag,
            Self::Template => Self::TEMPLATE,
        }
    }
}

/// Maps a dispatch name to a strategy plus its opaque config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrawlerRegistration {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub config: serde_json::Value,
    pub enabled: bool,
    pub created_at: String,
}

impl CrawlerRegistration {
    pub fn crawler_kind(&self) -> CrawlerKind {
        CrawlerKind::parse(&self.kind)
    }
}

/// Input for `add_crawler`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCrawler {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Fields `update_crawler` recognizes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlerUpdate {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

impl CrawlerUpdate {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.config.is_none()
    }
}

/// Canonical item shape produced by the normalizer, before it is stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemDraft {
    pub title: String,
    pub summary: String,
    pub cover_url: String,
    pub canonical_url: String,
    pub source_label: String,
}

impl ItemDraft {
    /// Only drafts with a title or a URL are emitted.
    pub fn is_emittable(&self) -> bool {
        !self.title.is_empty() || !self.canonical_url.is_empty()
    }

    /// Within-dispatch dedup key: URL when present, else title.
    pub fn dedup_key(&self) -> &str {
        if self.canonical_url.is_empty() {
            &self.title
        } else {
            &self.canonical_url
        }
    }
}

/// A stored item row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub id: i64,
    pub keyword: String,
    pub title: String,
    pub summary: String,
    pub cover_url: String,
    pub canonical_url: String,
    pub source_label: String,
    pub owner: Option<i64>,
    pub created_at: String,
}

/// Listing filter for collected items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemFilter {
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub owner: Option<i64>,
    #[serde(default = "default_item_limit")]
    pub limit: usize,
}

fn default_item_limit() -> usize {
    50
}

impl Default for ItemFilter {
    fn default() -> Self {
        Self {
            keyword: None,
            owner: None,
            limit: default_item_limit(),
        }
    }
}
