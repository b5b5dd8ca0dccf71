// src/crawl/xinhua.rs
//! Xinhua news search via its JSON endpoint, paged by `curPage` (1-based).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::crawl::{fetch_text, paginate, Strategy};
use crate::error::{FetchError, StrategyError};
use crate::model::{ItemDraft, RawPayload};

pub const NAME: &str = "xinhua";

const SEARCH_URL: &str = "https://so.news.cn/getNews";

#[derive(Debug, Deserialize)]
struct SearchResp {
    #[serde(default)]
    content: Option<SearchContent>,
}

#[derive(Debug, Deserialize)]
struct SearchContent {
    #[serde(default)]
    results: Vec<serde_json::Map<String, Value>>,
    #[serde(rename = "pageCount", default)]
    page_count: Option<usize>,
}

pub struct XinhuaStrategy {
    client: reqwest::Client,
    max_pages: usize,
}

impl XinhuaStrategy {
    pub fn new(client: reqwest::Client, max_pages: usize) -> Self {
        Self { client, max_pages }
    }

    async fn fetch_page(&self, keyword: &str, page: usize) -> Result<Vec<RawPayload>, FetchError> {
        let cur_page = (page + 1).to_string();
        let req = self.client.get(SEARCH_URL).query(&[
            ("keyword", keyword),
            ("curPage", cur_page.as_str()),
            ("sortField", "0"),
            ("searchFields", "1"),
            ("lang", "cn"),
        ]);
        let body = fetch_text(req).await?;
        parse_results(&body, page + 1)
    }
}

/// Parse one response body. Pages past `pageCount` come back empty.
pub fn parse_results(body: &str, cur_page: usize) -> Result<Vec<RawPayload>, FetchError> {
    let resp: SearchResp =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(format!("xinhua json: {e}")))?;
    let Some(content) = resp.content else {
        return Ok(Vec::new());
    };
    if content.page_count.is_some_and(|n| cur_page > n) {
        return Ok(Vec::new());
    }
    Ok(content.results)
}

#[async_trait]
impl Strategy for XinhuaStrategy {
    fn name(&self) -> &str {
        NAME
    }

    async fn fetch(
        &self,
        keyword: &str,
        max_items: usize,
        _config: &Value,
    ) -> Result<Vec<ItemDraft>, StrategyError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Ok(Vec::new());
        }
        Ok(paginate(NAME, max_items, self.max_pages, move |page| {
            self.fetch_page(keyword, page)
        })
        .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    const BODY: &str = r#"{
        "code": 200,
        "content": {
            "pageCount": 2,
            "results": [
                {"title": "<font color=red>乡村振兴</font>新举措", "url": "http://www.news.cn/a.htm",
                 "des": "简介", "sitename": "新华网", "imgUrl": "http://img.news.cn/a.jpg"},
                {"title": "", "url": ""}
            ]
        }
    }"#;

    #[test]
    fn parses_and_normalizes_results() {
        let raw = parse_results(BODY, 1).unwrap();
        let items: Vec<_> = raw.iter().filter_map(normalize).collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "乡村振兴新举措");
        assert_eq!(items[0].source_label, "新华网");
        assert_eq!(items[0].cover_url, "http://img.news.cn/a.jpg");
    }

    #[test]
    fn pages_past_page_count_are_empty() {
        assert!(parse_results(BODY, 3).unwrap().is_empty());
        assert!(parse_results(r#"{"code": 404}"#, 1).unwrap().is_empty());
        assert!(matches!(parse_results("<html>", 1), Err(FetchError::Parse(_))));
    }
}
