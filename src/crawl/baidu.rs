// src/crawl/baidu.rs
//! Baidu news search, scraped from the HTML result page and paged by `pn`.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::crawl::{fetch_text, paginate, Strategy};
use crate::error::{FetchError, StrategyError};
use crate::model::{ItemDraft, RawPayload};
use crate::normalize::payload;

pub const NAME: &str = "baidu";

const SEARCH_URL: &str = "https://www.baidu.com/s";
const PAGE_SIZE: usize = 10;

pub struct BaiduStrategy {
    client: reqwest::Client,
    max_pages: usize,
}

impl BaiduStrategy {
    pub fn new(client: reqwest::Client, max_pages: usize) -> Self {
        Self { client, max_pages }
    }

    async fn fetch_page(&self, keyword: &str, page: usize) -> Result<Vec<RawPayload>, FetchError> {
        let pn = (page * PAGE_SIZE).to_string();
        let req = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("rtt", "1"),
                ("bsst", "1"),
                ("cl", "2"),
                ("tn", "news"),
                ("rsv_dl", "ns_pc"),
                ("word", keyword),
                ("pn", pn.as_str()),
            ])
            .header("cache-control", "max-age=0")
            .header("referer", "https://www.baidu.com/")
            .header("sec-ch-ua-mobile", "?0")
            .header("sec-ch-ua-platform", "\"Windows\"");
        let html = fetch_text(req).await?;
        Ok(parse_items(&html))
    }
}

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

fn first<'a>(scope: ElementRef<'a>, candidates: &[&Selector]) -> Option<ElementRef<'a>> {
    candidates.iter().find_map(|s| scope.select(s).next())
}

fn text_of(el: Option<ElementRef<'_>>) -> String {
    el.map(|e| e.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Parse a result page into payloads keyed the way the console's scrapers key them.
pub fn parse_items(html: &str) -> Vec<RawPayload> {
    let doc = Html::parse_document(html);
    let result = sel("div.result");
    let (h3_a, any_a) = (sel("h3 a"), sel("a"));
    let (clamp, abstract_, div) = (sel(".c-line-clamp3"), sel(".c-abstract"), sel("div"));
    let (author, news_source, span) = (sel(".c-author"), sel(".news-source"), sel("span"));
    let img = sel("img");

    let mut items = Vec::new();
    for res in doc.select(&result) {
        let title_tag = first(res, &[&h3_a, &any_a]);
        let title = text_of(title_tag);
        let href = title_tag
            .and_then(|a| a.value().attr("href"))
            .unwrap_or_default()
            .to_string();
        let summary = text_of(first(res, &[&clamp, &abstract_, &div]));
        let source = text_of(first(res, &[&author, &news_source, &span]));
        let cover = res
            .select(&img)
            .next()
            .and_then(|i| i.value().attr("src"))
            .unwrap_or_default()
            .to_string();
        if !title.is_empty() || !href.is_empty() {
            items.push(payload([
                ("标题", title),
                ("概要", summary),
                ("封面", cover),
                ("原始URL", href),
                ("来源", source),
            ]));
        }
    }

    // Layout fallback: bare headline links.
    if items.is_empty() {
        for a in doc.select(&h3_a) {
            let title = a.text().collect::<String>().trim().to_string();
            let href = a.value().attr("href").unwrap_or_default().to_string();
            items.push(payload([("标题", title), ("原始URL", href)]));
        }
    }
    items
}

#[async_trait]
impl Strategy for BaiduStrategy {
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

    const PAGE: &str = r#"
        <html><body>
          <div class="result">
            <h3><a href="https://news.test/1">国务院 <em>政策</em> 解读</a></h3>
            <div class="c-line-clamp3">摘要一</div>
            <span class="c-author">新华网</span>
            <img src="https://img.test/1.png">
          </div>
          <div class="result">
            <h3><a href="https://news.test/2">第二条</a></h3>
            <div class="c-abstract">摘要二</div>
          </div>
          <div class="result"><p>no link, no title</p></div>
        </body></html>
    "#;

    #[test]
    fn parses_result_blocks() {
        let items: Vec<_> = parse_items(PAGE).iter().filter_map(normalize).collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "国务院 政策 解读");
        assert_eq!(items[0].summary, "摘要一");
        assert_eq!(items[0].source_label, "新华网");
        assert_eq!(items[0].cover_url, "https://img.test/1.png");
        assert_eq!(items[1].canonical_url, "https://news.test/2");
        assert_eq!(items[1].summary, "摘要二");
    }

    #[test]
    fn falls_back_to_headline_links() {
        let html = r#"<div><h3><a href="https://n.test/x">只有标题</a></h3></div>"#;
        let items = parse_items(html);
        assert_eq!(items.len(), 1);
        let d = normalize(&items[0]).unwrap();
        assert_eq!(d.title, "只有标题");
        assert_eq!(d.summary, "");
    }
}
