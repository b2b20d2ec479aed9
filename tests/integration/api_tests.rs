// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;

use axum::http::StatusCode;
use notecrawl::domain::models::query::query_key;
use notecrawl::engines::replay_session::ReplaySessionFactory;
use serde_json::{json, Value};

use super::helpers::{create_test_app, site_factory, TestApp};

async fn search_watch(app: &TestApp, session_id: &str) -> Value {
    let response = app
        .server
        .get("/api/search")
        .add_query_param("keyword", "手表")
        .add_query_param("max_results", 5)
        .add_query_param("session_id", session_id)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    response.json::<Value>()
}

#[tokio::test]
async fn search_returns_curated_notes() {
    let app = create_test_app(site_factory());

    let body = search_watch(&app, "api1").await;

    assert_eq!(body["keyword"], "手表");
    assert_eq!(body["session_id"], "api1");
    assert_eq!(body["from_cache"], false);
    assert_eq!(body["status"], "verified");
    let notes = body["notes"].as_array().unwrap();
    assert_eq!(body["count"].as_u64(), Some(notes.len() as u64));
    assert!(!notes.is_empty() && notes.len() <= 5);
    assert!(notes
        .iter()
        .all(|n| n["title"].as_str().unwrap_or_default().contains("手表")));
    assert_eq!(
        body["html_api_url"],
        format!("/api/result-html/{}", query_key("手表"))
    );
}

#[tokio::test]
async fn repeated_search_is_served_from_cache() {
    let app = create_test_app(site_factory());
    let first = search_watch(&app, "api2").await;
    let second = search_watch(&app, "api2").await;

    assert_eq!(second["from_cache"], true);
    assert_eq!(second["status"], "cache_hit");
    assert_eq!(second["count"], first["count"]);
    assert_eq!(app.factory.created_count(), 1);
}

#[tokio::test]
async fn invalid_keyword_is_rejected() {
    let app = create_test_app(site_factory());
    let response = app
        .server
        .get("/api/search")
        .add_query_param("keyword", "")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert!(response.json::<Value>()["error"].is_string());

    let response = app
        .server
        .get("/api/search")
        .add_query_param("keyword", "手表")
        .add_query_param("max_results", 0)
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unreachable_browser_returns_503() {
    let app = create_test_app(ReplaySessionFactory::new().with_failing_route("xiaohongshu.com"));
    let response = app
        .server
        .get("/api/search")
        .add_query_param("keyword", "手表")
        .await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn result_html_is_served_after_search() {
    let app = create_test_app(site_factory());
    search_watch(&app, "api3").await;

    let response = app
        .server
        .get(&format!("/api/result-html/{}", query_key("手表")))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains("手表"));

    let response = app
        .server
        .get(&format!("/api/result-html/{}", query_key("相机")))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = app.server.get("/api/result-html/not-a-key").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn debug_events_are_incremental() {
    let app = create_test_app(site_factory());

    let response = app.server.get("/api/debug/unknown").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    search_watch(&app, "dbg").await;
    let response = app.server.get("/api/debug/dbg").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.json::<Value>();
    let total = body["total_count"].as_u64().unwrap();
    assert!(total > 0);
    assert_eq!(body["debug_info"].as_array().map(Vec::len), Some(total as usize));

    let last = body["last_timestamp"].as_f64().unwrap();
    let response = app
        .server
        .get("/api/debug/dbg")
        .add_query_param("since", last)
        .await;
    let body = response.json::<Value>();
    assert_eq!(body["debug_info"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn batch_runs_in_background() {
    let app = create_test_app(site_factory());
    let search = search_watch(&app, "api4").await;
    let count = search["count"].as_u64().unwrap();

    let response = app
        .server
        .post("/api/batch")
        .json(&json!({ "keyword": "手表" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let accepted = response.json::<Value>();
    assert_eq!(accepted["total"].as_u64(), Some(count));
    let batch_id = accepted["session_id"].as_str().unwrap().to_string();

    let mut stats = None;
    for _ in 0..100 {
        let response = app.server.get(&format!("/api/batch/{}", batch_id)).await;
        if response.status_code() == StatusCode::OK {
            stats = Some(response.json::<Value>());
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let stats = stats.expect("batch finished");
    assert_eq!(stats["total"].as_u64(), Some(count));
    assert_eq!(stats["success_count"].as_u64(), Some(count));
}

#[tokio::test]
async fn batch_keeps_caller_supplied_id() {
    let app = create_test_app(site_factory());
    let search = search_watch(&app, "api7").await;
    let count = search["count"].as_u64().unwrap();

    let response = app
        .server
        .post("/api/batch")
        .json(&json!({ "keyword": "手表", "session_id": "watch_batch_1" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    assert_eq!(response.json::<Value>()["session_id"].as_str(), Some("watch_batch_1"));

    let mut stats = None;
    for _ in 0..100 {
        let response = app.server.get("/api/batch/watch_batch_1").await;
        if response.status_code() == StatusCode::OK {
            stats = Some(response.json::<Value>());
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let stats = stats.expect("batch finished");
    assert_eq!(stats["total"].as_u64(), Some(count));

    let response = app
        .server
        .post("/api/batch")
        .json(&json!({ "keyword": "手表", "session_id": "../x" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn batch_requires_notes_or_cached_keyword() {
    let app = create_test_app(site_factory());

    let response = app.server.post("/api/batch").json(&json!({})).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = app
        .server
        .post("/api/batch")
        .json(&json!({ "keyword": "相机" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = app.server.get("/api/batch/..%2Fsecrets").await;
    assert_ne!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn hot_keywords_are_listed() {
    let app = create_test_app(ReplaySessionFactory::new());
    let response = app.server.get("/api/hot-keywords").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.json::<Value>();
    assert!(body["keywords"]
        .as_array()
        .is_some_and(|k| !k.is_empty()));
}
