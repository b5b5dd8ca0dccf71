// src/normalize.rs
//! Item normalizer: maps heterogeneous scraped payloads onto `ItemDraft`.
//!
//! Strategies emit loosely keyed payloads (Chinese labels from the console's
//! HTML scrapers, camelCase keys from JSON search APIs, RSS element names).
//! `normalize` resolves each canonical field through an alias table and
//! cleans the text. It never deduplicates.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::Value;

use crate::model::{ItemDraft, RawPayload};

const TITLE_KEYS: &[&str] = &["title", "标题", "headline", "name"];
const SUMMARY_KEYS: &[&str] = &[
    "summary", "概要", "摘要", "des", "description", "abstract", "content",
];
const COVER_KEYS: &[&str] = &[
    "cover_url", "cover", "封面", "imgUrl", "img", "image", "thumbnail",
];
const URL_KEYS: &[&str] = &["canonical_url", "url", "原始URL", "link", "href"];
const SOURCE_KEYS: &[&str] = &[
    "source_label", "source", "来源", "sitename", "site", "author",
];

const TITLE_MAX_CHARS: usize = 500;
const TEXT_MAX_CHARS: usize = 1500;

/// Normalize free text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    truncate_chars(out, TEXT_MAX_CHARS)
}

fn truncate_chars(s: String, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect()
    } else {
        s
    }
}

/// First non-empty value among `keys`, rendered as text.
fn pick(raw: &RawPayload, keys: &[&str]) -> String {
    for key in keys {
        let text = match raw.get(*key) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        if !text.is_empty() {
            return text;
        }
    }
    String::new()
}

/// Map a raw payload to the canonical shape. Missing fields become "".
///
/// Returns `None` when both title and URL are empty: such payloads are never emitted.
pub fn normalize(raw: &RawPayload) -> Option<ItemDraft> {
    let draft = ItemDraft {
        title: truncate_chars(normalize_text(&pick(raw, TITLE_KEYS)), TITLE_MAX_CHARS),
        summary: normalize_text(&pick(raw, SUMMARY_KEYS)),
        cover_url: pick(raw, COVER_KEYS),
        canonical_url: pick(raw, URL_KEYS),
        source_label: normalize_text(&pick(raw, SOURCE_KEYS)),
    };
    draft.is_emittable().then_some(draft)
}

/// Build a payload from string pairs; handy for scrapers.
pub fn payload<I, K, V>(pairs: I) -> RawPayload
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), Value::String(v.into())))
        .collect()
}
