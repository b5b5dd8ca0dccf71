// src/api.rs
//! Thin JSON layer over [`Console`].
//!
//! Every response uses the envelope `{"code": 0|1, "msg": "...", "data": ...}`.
//! Failures carry `code = 1` and an operator-safe message.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::ai::DynSummarizer;
use crate::console::Console;
use crate::error::ConsoleError;
use crate::model::{CrawlerUpdate, ItemFilter, NewCrawler, NewSource, SourceUpdate};

#[derive(Clone)]
pub struct AppState {
    pub console: Console,
    pub summarizer: DynSummarizer,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/sources", get(list_sources).post(add_source))
        .route("/api/sources/{id}", get(get_source))
        .route("/api/sources/{id}/toggle", post(toggle_source))
        .route("/api/sources/{id}/update", post(update_source))
        .route("/api/sources/{id}/delete", post(delete_source))
        .route("/api/sources/{id}/run", post(run_source))
        .route("/api/crawlers", get(list_crawlers).post(add_crawler))
        .route("/api/crawlers/{id}/toggle", post(toggle_crawler))
        .route("/api/crawlers/{id}/update", post(update_crawler))
        .route("/api/crawlers/{id}/delete", post(delete_crawler))
        .route("/api/items", get(list_items))
        .route("/api/items/{id}", get(get_item))
        .route("/api/items/{id}/summarize", post(summarize_item))
        .route("/api/crawl", get(crawl_preview))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct Envelope {
    code: u8,
    msg: String,
    data: Value,
}

fn ok(data: Value) -> Json<Envelope> {
    Json(Envelope {
        code: 0,
        msg: "ok".to_string(),
        data,
    })
}

struct ApiError(ConsoleError);

impl From<ConsoleError> for ApiError {
    fn from(e: ConsoleError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ConsoleError::NotFound { .. } => StatusCode::NOT_FOUND,
            ConsoleError::Store(_) | ConsoleError::RunFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        if status.is_server_error() {
            tracing::error!(target: "api", error = %self.0, "request failed");
        }
        let body = Envelope {
            code: 1,
            msg: self.0.user_message(),
            data: Value::Null,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<Envelope>, ApiError>;

#[derive(Debug, Deserialize)]
struct OwnerQuery {
    #[serde(default)]
    owner: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RunQuery {
    #[serde(default)]
    owner: Option<i64>,
    #[serde(default)]
    background: bool,
}

#[derive(Debug, Deserialize)]
struct CrawlQuery {
    #[serde(default)]
    keyword: String,
    #[serde(default)]
    crawler: Option<String>,
}

// ---- sources --------------------------------------------------------------

async fn list_sources(State(st): State<AppState>, Query(q): Query<OwnerQuery>) -> ApiResult {
    let sources = st.console.list_sources(q.owner).await?;
    Ok(ok(json!(sources)))
}

async fn get_source(State(st): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    Ok(ok(json!(st.console.get_source(id).await?)))
}

async fn add_source(State(st): State<AppState>, Json(body): Json<NewSource>) -> ApiResult {
    let id = st.console.add_source(body).await?;
    Ok(ok(json!({ "id": id })))
}

async fn toggle_source(State(st): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    let enabled = st.console.toggle_source(id).await?;
    Ok(ok(json!({ "enabled": enabled })))
}

async fn update_source(
    State(st): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<SourceUpdate>,
) -> ApiResult {
    st.console.update_source(id, body).await?;
    Ok(ok(Value::Null))
}

async fn delete_source(State(st): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    st.console.delete_source(id).await?;
    Ok(ok(Value::Null))
}

/// Manual run. With `background=true` the run is handed to a task and the
/// request answers 202 right away.
async fn run_source(
    State(st): State<AppState>,
    Path(id): Path<i64>,
    Query(q): Query<RunQuery>,
) -> Result<Response, ApiError> {
    if !q.background {
        let items = st.console.run_source_now(id, q.owner).await?;
        return Ok(ok(json!({ "items": items })).into_response());
    }

    // Reject unknown ids before accepting the job.
    st.console.get_source(id).await?;
    let console = st.console.clone();
    tokio::spawn(async move {
        match console.run_source_now(id, q.owner).await {
            Ok(items) => tracing::info!(target: "api", source_id = id, items, "background run finished"),
            Err(e) => tracing::warn!(target: "api", source_id = id, error = %e, "background run failed"),
        }
    });
    Ok((StatusCode::ACCEPTED, ok(json!({ "accepted": true }))).into_response())
}

// ---- crawlers -------------------------------------------------------------

async fn list_crawlers(State(st): State<AppState>) -> ApiResult {
    Ok(ok(json!(st.console.list_crawlers().await?)))
}

async fn add_crawler(State(st): State<AppState>, Json(body): Json<NewCrawler>) -> ApiResult {
    let id = st.console.add_crawler(body).await?;
    Ok(ok(json!({ "id": id })))
}

async fn toggle_crawler(State(st): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    let enabled = st.console.toggle_crawler(id).await?;
    Ok(ok(json!({ "enabled": enabled })))
}

async fn update_crawler(
    State(st): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<CrawlerUpdate>,
) -> ApiResult {
    st.console.update_crawler(id, body).await?;
    Ok(ok(Value::Null))
}

async fn delete_crawler(State(st): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    st.console.delete_crawler(id).await?;
    Ok(ok(Value::Null))
}

// ---- items ----------------------------------------------------------------

async fn list_items(State(st): State<AppState>, Query(filter): Query<ItemFilter>) -> ApiResult {
    Ok(ok(json!(st.console.list_items(&filter).await?)))
}

async fn get_item(State(st): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    Ok(ok(json!(st.console.get_item(id).await?)))
}

async fn summarize_item(State(st): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    let summary = st
        .console
        .summarize_item(id, st.summarizer.as_ref())
        .await?;
    Ok(ok(json!({
        "provider": st.summarizer.provider_name(),
        "summary": summary,
    })))
}

async fn crawl_preview(State(st): State<AppState>, Query(q): Query<CrawlQuery>) -> ApiResult {
    let items = st.console.preview(&q.keyword, q.crawler.as_deref()).await;
    Ok(ok(json!(items)))
}
