// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use tower_http::trace::TraceLayer;

use crate::presentation::handlers::{batch_handler, debug_handler, search_handler};
use crate::presentation::state::AppState;

/// 创建应用路由
///
/// # 参数
///
/// * `state` - 共享状态，以 `Extension` 注入各处理器
///
/// # 返回值
///
/// 返回配置好的路由
pub fn routes(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/api/search", get(search_handler::search))
        .route("/api/result-html/{key}", get(search_handler::result_html))
        .route("/api/hot-keywords", get(search_handler::hot_keywords))
        .route("/api/debug/{session_id}", get(debug_handler::debug_events))
        .route("/api/batch", post(batch_handler::submit_batch))
        .route("/api/batch/{session_id}", get(batch_handler::batch_stats));

    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/version", get(version));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}

/// 健康检查端点
///
/// # 返回值
///
/// 返回"OK"字符串
pub async fn health_check() -> &'static str {
    "OK"
}

/// 版本信息端点
///
/// # 返回值
///
/// 返回应用版本号
pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
