// tests/api_http.rs
//
// HTTP-level tests for the router without opening sockets, via
// tower::ServiceExt::oneshot. Strategies are stubs; nothing leaves the process.

mod common;

use std::sync::Arc;

use axum::{
    body::{self, Body},
    Router,
};
use http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt as _;

use crawl_console::ai::MockSummarizer;
use crawl_console::{create_router, AppState, Console};

use common::{harness, Harness};

const BODY_LIMIT: usize = 1024 * 1024;

fn app(h: &Harness) -> Router {
    create_router(AppState {
        console: Console::new(h.store.clone(), h.collector.clone()),
        summarizer: Arc::new(MockSummarizer::default()),
    })
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&v).unwrap())),
        None => builder.body(Body::empty()),
    }
    .expect("build request");

    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn health_is_plain_ok() {
    let h = harness();
    let resp = app(&h)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn source_lifecycle_over_http() {
    let h = harness();
    let app = app(&h);

    let (status, body) = call(
        &app,
        "POST",
        "/api/sources",
        Some(json!({"keyword": "应急管理", "crawler_name": "alpha", "owner": 4})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    let id = body["data"]["id"].as_i64().unwrap();

    let (_, body) = call(&app, "GET", "/api/sources?owner=4", None).await;
    assert_eq!(body["data"][0]["keyword"], "应急管理");
    assert_eq!(body["data"][0]["interval_minutes"], 60);

    let (_, body) = call(&app, "POST", &format!("/api/sources/{id}/toggle"), None).await;
    assert_eq!(body["data"]["enabled"], false);

    let (_, body) = call(
        &app,
        "POST",
        &format!("/api/sources/{id}/update"),
        Some(json!({"interval_minutes": 15})),
    )
    .await;
    assert_eq!(body["code"], 0);

    let (_, body) = call(&app, "POST", &format!("/api/sources/{id}/run"), None).await;
    assert_eq!(body["data"]["items"], 1);

    let (_, body) = call(
        &app,
        "GET",
        "/api/items?keyword=%E5%BA%94%E6%80%A5%E7%AE%A1%E7%90%86",
        None,
    )
    .await;
    let items = body["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "alpha:应急管理");
    assert_eq!(items[0]["owner"], 4);

    let (status, body) = call(&app, "POST", &format!("/api/sources/{id}/delete"), None).await;
    assert_eq!((status, body["code"].clone()), (StatusCode::OK, json!(0)));
}

#[tokio::test]
async fn failures_use_the_envelope() {
    let h = harness();
    let app = app(&h);

    let (status, body) = call(&app, "POST", "/api/sources", Some(json!({"keyword": " "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 1);
    assert_eq!(body["msg"], "keyword must not be empty");

    let (status, body) = call(&app, "POST", "/api/sources/77/toggle", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["msg"], "source 77 not found");

    let (status, body) = call(&app, "POST", "/api/sources/77/update", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "no recognized field to update");

    let (status, _) = call(&app, "POST", "/api/sources/77/run?background=true", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn background_run_is_accepted() {
    let h = harness();
    let app = app(&h);
    let (_, body) = call(
        &app,
        "POST",
        "/api/sources",
        Some(json!({"keyword": "k", "crawler_name": "beta"})),
    )
    .await;
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = call(&app, "POST", &format!("/api/sources/{id}/run?background=true"), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["accepted"], true);

    // The spawned run lands eventually.
    for _ in 0..100 {
        if h.beta.calls() == 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(h.beta.calls(), 1);
}

#[tokio::test]
async fn crawler_endpoints_and_preview() {
    let h = harness();
    let app = app(&h);

    let (_, body) = call(
        &app,
        "POST",
        "/api/crawlers",
        Some(json!({"name": "regional", "kind": "alpha"})),
    )
    .await;
    assert_eq!(body["code"], 0);
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = call(
        &app,
        "POST",
        "/api/crawlers",
        Some(json!({"name": "regional", "kind": "beta"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "crawler `regional` already exists");

    let (_, body) = call(&app, "GET", "/api/crawl?keyword=k&crawler=regional", None).await;
    assert_eq!(body["data"][0]["title"], "alpha:k");

    let (_, body) = call(&app, "POST", &format!("/api/crawlers/{id}/toggle"), None).await;
    assert_eq!(body["data"]["enabled"], false);

    let (_, body) = call(&app, "GET", "/api/crawl?keyword=k&crawler=regional", None).await;
    assert_eq!(body["data"][0]["title"], "fallback:k");

    let (_, body) = call(&app, "GET", "/api/crawl?keyword=", None).await;
    assert_eq!(body["data"], json!([]));

    let (_, body) = call(&app, "GET", "/api/crawlers", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn summarize_endpoint_uses_the_configured_summarizer() {
    let h = harness();
    let app = app(&h);
    let (_, body) = call(
        &app,
        "POST",
        "/api/sources",
        Some(json!({"keyword": "k", "crawler_name": "alpha"})),
    )
    .await;
    let id = body["data"]["id"].as_i64().unwrap();
    call(&app, "POST", &format!("/api/sources/{id}/run"), None).await;

    let (_, body) = call(&app, "GET", "/api/items", None).await;
    let item_id = body["data"][0]["id"].as_i64().unwrap();

    let (_, body) = call(&app, "POST", &format!("/api/items/{item_id}/summarize"), None).await;
    assert_eq!(body["data"]["provider"], "mock");
    assert_eq!(body["data"]["summary"], "Summary (mock)");
}
