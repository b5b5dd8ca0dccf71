// src/crawl/template.rs
//! Operator-defined strategy: a declarative HTTP template plus extraction rules.
//!
//! Registrations of kind `template` carry a JSON config such as
//!
//! ```json
//! {
//!   "url": "https://search.example.gov.cn/s?q={keyword}&p={page}",
//!   "format": "html",
//!   "item_selector": "ul.results li",
//!   "fields": { "title": "a", "canonical_url": "a@href", "summary": "p.desc" },
//!   "headers": { "referer": "https://search.example.gov.cn/" },
//!   "page_start": 1,
//!   "max_pages": 3
//! }
//! ```
//!
//! `format` is `html` (CSS selectors, `selector@attr` reads an attribute),
//! `json` (`items_path` and field values are dotted paths) or `rss`.
//! Without a `{page}` placeholder only one page is fetched. An `rss` URL
//! without `{keyword}` is treated as a feed and filtered by keyword.

use std::collections::BTreeMap;

use async_trait::async_trait;
use quick_xml::de::from_str as xml_from_str;
use reqwest::header::{HeaderName, HeaderValue};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::crawl::{fetch_text, paginate, Strategy};
use crate::error::{FetchError, StrategyError};
use crate::model::{ItemDraft, RawPayload};

pub const NAME: &str = "template";

const CANONICAL_FIELDS: &[&str] = &[
    "title",
    "summary",
    "cover_url",
    "canonical_url",
    "source_label",
];
const URL_FIELDS: &[&str] = &["cover_url", "canonical_url"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateFormat {
    #[default]
    Html,
    Json,
    Rss,
}

fn one() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub url: String,
    #[serde(default)]
    pub format: TemplateFormat,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "one")]
    pub page_start: usize,
    #[serde(default = "one")]
    pub page_step: usize,
    #[serde(default)]
    pub max_pages: Option<usize>,
    #[serde(default)]
    pub item_selector: Option<String>,
    #[serde(default)]
    pub items_path: Option<String>,
    /// Canonical field name -> extraction rule.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Label used when the page itself carries none.
    #[serde(default)]
    pub source_label: Option<String>,
}

impl TemplateConfig {
    /// Parse and validate a registration config.
    pub fn from_value(config: &Value) -> Result<Self, StrategyError> {
        let cfg: TemplateConfig = serde_json::from_value(config.clone())
            .map_err(|e| StrategyError::Config(format!("template config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), StrategyError> {
        let bad = |msg: String| Err(StrategyError::Config(msg));
        if self.url.trim().is_empty() {
            return bad("url must not be empty".into());
        }
        if self.format != TemplateFormat::Rss && !self.url.contains("{keyword}") {
            return bad("url must contain a {keyword} placeholder".into());
        }
        match Url::parse(&self.render_url("probe", 0)) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            Ok(u) => return bad(format!("unsupported url scheme `{}`", u.scheme())),
            Err(e) => return bad(format!("invalid url: {e}")),
        }
        if self.page_step == 0 {
            return bad("page_step must be positive".into());
        }
        for (name, value) in &self.headers {
            if HeaderName::from_bytes(name.as_bytes()).is_err()
                || HeaderValue::from_str(value).is_err()
            {
                return bad(format!("invalid header `{name}`"));
            }
        }
        if let Some(field) = self
            .fields
            .keys()
            .find(|k| !CANONICAL_FIELDS.contains(&k.as_str()))
        {
            return bad(format!("unknown field `{field}`"));
        }
        if self.format == TemplateFormat::Html {
            let Some(item_sel) = self.item_selector.as_deref() else {
                return bad("html templates need item_selector".into());
            };
            parse_selector(item_sel)?;
            for rule in self.fields.values() {
                let (css, _) = split_rule(rule);
                if !css.is_empty() {
                    parse_selector(css)?;
                }
            }
        }
        Ok(())
    }

    /// Pages to fetch for one dispatch, capped by the strategy's own limit.
    pub fn page_budget(&self, strategy_max: usize) -> usize {
        if !self.url.contains("{page}") {
            return 1;
        }
        self.max_pages.unwrap_or(strategy_max).clamp(1, strategy_max.max(1))
    }

    pub fn render_url(&self, keyword: &str, page_index: usize) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(keyword.as_bytes()).collect();
        let page = self.page_start + page_index * self.page_step;
        self.url
            .replace("{keyword}", &encoded)
            .replace("{page}", &page.to_string())
    }

    fn html_fields(&self) -> BTreeMap<String, String> {
        if self.fields.is_empty() {
            BTreeMap::from([
                ("title".to_string(), "a".to_string()),
                ("canonical_url".to_string(), "a@href".to_string()),
            ])
        } else {
            self.fields.clone()
        }
    }
}

fn parse_selector(css: &str) -> Result<Selector, StrategyError> {
    Selector::parse(css).map_err(|e| StrategyError::Config(format!("selector `{css}`: {e}")))
}

/// `"a.title@href"` -> (`"a.title"`, `Some("href")`); `"@href"` targets the item itself.
fn split_rule(rule: &str) -> (&str, Option<&str>) {
    match rule.rsplit_once('@') {
        Some((css, attr)) => (css.trim(), Some(attr.trim())),
        None => (rule.trim(), None),
    }
}

fn resolve(base: Option<&Url>, raw: &str) -> String {
    match base.and_then(|b| b.join(raw).ok()) {
        Some(u) if !raw.is_empty() => u.to_string(),
        _ => raw.to_string(),
    }
}

fn element_value(el: ElementRef<'_>, attr: Option<&str>) -> String {
    match attr {
        Some(a) => el.value().attr(a).unwrap_or_default().trim().to_string(),
        None => el.text().collect::<String>().trim().to_string(),
    }
}

fn with_label(mut raw: RawPayload, label: Option<&str>) -> RawPayload {
    if let Some(label) = label {
        let has_label = raw
            .get("source_label")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty());
        if !has_label {
            raw.insert("source_label".into(), Value::String(label.to_string()));
        }
    }
    raw
}

pub fn extract_html(
    cfg: &TemplateConfig,
    body: &str,
    page_url: &str,
) -> Result<Vec<RawPayload>, FetchError> {
    let to_parse = |e: StrategyError| FetchError::Parse(e.to_string());
    let item_sel = parse_selector(cfg.item_selector.as_deref().unwrap_or_default())
        .map_err(to_parse)?;
    let mut rules = Vec::new();
    for (field, rule) in cfg.html_fields() {
        let (css, attr) = split_rule(&rule);
        let sel = if css.is_empty() {
            None
        } else {
            Some(parse_selector(css).map_err(to_parse)?)
        };
        rules.push((field, sel, attr.map(str::to_string)));
    }

    let base = Url::parse(page_url).ok();
    let doc = Html::parse_document(body);
    let mut out = Vec::new();
    for el in doc.select(&item_sel) {
        let mut raw = RawPayload::new();
        for (field, sel, attr) in &rules {
            let target = match sel {
                Some(s) => el.select(s).next(),
                None => Some(el),
            };
            let Some(target) = target else { continue };
            let mut value = element_value(target, attr.as_deref());
            if URL_FIELDS.contains(&field.as_str()) {
                value = resolve(base.as_ref(), &value);
            }
            raw.insert(field.clone(), Value::String(value));
        }
        out.push(with_label(raw, cfg.source_label.as_deref()));
    }
    Ok(out)
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|seg| !seg.is_empty())
        .try_fold(root, |v, seg| match v {
            Value::Array(arr) => seg.parse::<usize>().ok().and_then(|i| arr.get(i)),
            other => other.get(seg),
        })
}

pub fn extract_json(cfg: &TemplateConfig, body: &str) -> Result<Vec<RawPayload>, FetchError> {
    let root: Value =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(format!("template json: {e}")))?;
    let path = cfg.items_path.as_deref().unwrap_or_default();
    let Some(Value::Array(entries)) = lookup(&root, path) else {
        return Err(FetchError::Parse(format!("`{path}` is not an array")));
    };

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let Value::Object(obj) = entry else { continue };
        let raw = if cfg.fields.is_empty() {
            obj.clone()
        } else {
            let mut raw = RawPayload::new();
            for (field, rule) in &cfg.fields {
                if let Some(v @ (Value::String(_) | Value::Number(_))) = lookup(entry, rule) {
                    raw.insert(field.clone(), v.clone());
                }
            }
            raw
        };
        out.push(with_label(raw, cfg.source_label.as_deref()));
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
}

pub fn extract_rss(
    cfg: &TemplateConfig,
    body: &str,
    keyword: &str,
) -> Result<Vec<RawPayload>, FetchError> {
    let rss: Rss =
        xml_from_str(body).map_err(|e| FetchError::Parse(format!("template rss: {e}")))?;
    let filter_by_keyword = !cfg.url.contains("{keyword}");
    let needle = keyword.to_lowercase();

    let mut out = Vec::new();
    for it in rss.channel.item {
        let title = it.title.unwrap_or_default();
        let description = it.description.unwrap_or_default();
        if filter_by_keyword
            && !title.to_lowercase().contains(&needle)
            && !description.to_lowercase().contains(&needle)
        {
            continue;
        }
        let mut raw = RawPayload::new();
        raw.insert("title".into(), Value::String(title));
        raw.insert("summary".into(), Value::String(description));
        raw.insert("canonical_url".into(), Value::String(it.link.unwrap_or_default()));
        out.push(with_label(raw, cfg.source_label.as_deref()));
    }
    Ok(out)
}

pub struct TemplateStrategy {
    client: reqwest::Client,
    max_pages: usize,
}

impl TemplateStrategy {
    pub fn new(client: reqwest::Client, max_pages: usize) -> Self {
        Self { client, max_pages }
    }

    async fn fetch_page(
        &self,
        cfg: &TemplateConfig,
        keyword: &str,
        page: usize,
    ) -> Result<Vec<RawPayload>, FetchError> {
        let url = cfg.render_url(keyword, page);
        let mut req = self.client.get(&url);
        for (name, value) in &cfg.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        let body = fetch_text(req).await?;
        match cfg.format {
            TemplateFormat::Html => extract_html(cfg, &body, &url),
            TemplateFormat::Json => extract_json(cfg, &body),
            TemplateFormat::Rss => extract_rss(cfg, &body, keyword),
        }
    }
}

#[async_trait]
impl Strategy for TemplateStrategy {
    fn name(&self) -> &str {
        NAME
    }

    async fn fetch(
        &self,
        keyword: &str,
        max_items: usize,
        config: &Value,
    ) -> Result<Vec<ItemDraft>, StrategyError> {
        let cfg = TemplateConfig::from_value(config)?;
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Ok(Vec::new());
        }
        let pages = cfg.page_budget(self.max_pages);
        let cfg = &cfg;
        Ok(paginate(NAME, max_items, pages, move |page| {
            self.fetch_page(cfg, keyword, page)
        })
        .await)
    }
}
