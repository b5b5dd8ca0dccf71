// src/ai.rs
//! AI summarization adapter used by the curation side of the console.
//!
//! The scheduling path never calls this. Every failure (disabled, missing key,
//! network, bad response) collapses to `None` so callers can treat a summary
//! as optional enrichment.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::AiConfig;

/// Longest summary kept, in characters.
pub const MAX_SUMMARY_CHARS: usize = 300;

pub trait Summarizer: Send + Sync {
    fn summarize<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynSummarizer = Arc<dyn Summarizer>;

/// Factory.
///
/// * `AI_TEST_MODE=mock` gives a deterministic mock.
/// * `enabled = false` or an unknown provider gives a disabled client.
/// * Otherwise an OpenAI-compatible chat-completions client.
pub fn build_summarizer(cfg: &AiConfig) -> anyhow::Result<DynSummarizer> {
    if std::env::var("AI_TEST_MODE").is_ok_and(|v| v == "mock") {
        return Ok(Arc::new(MockSummarizer::default()));
    }
    if !cfg.enabled {
        return Ok(Arc::new(DisabledSummarizer));
    }
    match cfg.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiSummarizer::new(cfg)?)),
        other => {
            tracing::warn!(provider = other, "unsupported AI provider; summarization disabled");
            Ok(Arc::new(DisabledSummarizer))
        }
    }
}

/// Returns `None` always.
pub struct DisabledSummarizer;

impl Summarizer for DisabledSummarizer {
    fn summarize<'a>(
        &'a self,
        _text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async { None })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

#[derive(Clone)]
pub struct MockSummarizer {
    pub fixed: String,
}

impl Default for MockSummarizer {
    fn default() -> Self {
        Self {
            fixed: "Summary (mock)".to_string(),
        }
    }
}

impl Summarizer for MockSummarizer {
    fn summarize<'a>(
        &'a self,
        _text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        let out = self.fixed.clone();
        Box::pin(async move { Some(out) })
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiSummarizer {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiSummarizer {
    pub fn new(cfg: &AiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("crawl-console/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
            api_key: cfg.resolved_api_key(),
            model: cfg.model.clone(),
        })
    }
}

impl Summarizer for OpenAiSummarizer {
    fn summarize<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            if self.api_key.is_empty() || text.trim().is_empty() {
                return None;
            }

            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                max_tokens: u32,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                content: String,
            }

            let sys = "Summarize the news item in one or two plain sentences, in the language of the input. Output only the summary.";
            let req = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: sys,
                    },
                    Msg {
                        role: "user",
                        content: text,
                    },
                ],
                temperature: 0.2,
                max_tokens: 200,
            };

            let resp = match self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "summarize request failed");
                    return None;
                }
            };
            if !resp.status().is_success() {
                tracing::warn!(status = resp.status().as_u16(), "summarize upstream error");
                return None;
            }
            let body: Resp = resp.json().await.ok()?;
            let content = body
                .choices
                .first()
                .map(|c| c.message.content.as_str())
                .unwrap_or("");
            let cleaned = sanitize_summary(content);
            (!cleaned.is_empty()).then_some(cleaned)
        })
    }
    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Single line, collapsed whitespace, at most `MAX_SUMMARY_CHARS` characters.
pub fn sanitize_summary(input: &str) -> String {
    let mut out = String::new();
    let mut count = 0usize;
    let mut prev_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() || ch.is_control() {
            prev_space = !out.is_empty();
            continue;
        }
        if prev_space {
            if count + 1 >= MAX_SUMMARY_CHARS {
                break;
            }
            out.push(' ');
            count += 1;
            prev_space = false;
        }
        out.push(ch);
        count += 1;
        if count >= MAX_SUMMARY_CHARS {
            break;
        }
    }
    out
}
