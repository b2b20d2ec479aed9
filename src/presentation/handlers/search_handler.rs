// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query as QueryParams},
    response::Html,
    Json,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::application::dto::search_request::{
    HotKeywordsDto, SearchQueryDto, SearchResponseDto,
};
use crate::domain::models::query::Query;
use crate::presentation::errors::{AppError, RequestError};
use crate::presentation::state::AppState;

/// 处理搜索请求
///
/// # 参数
///
/// * `state` - 共享状态
/// * `params` - 关键词、条数、是否使用缓存、会话 ID
///
/// # 返回值
///
/// 返回筛选后的笔记列表；未提供会话 ID 时生成一个，供调试接口使用
///
/// # 错误
///
/// - 参数校验失败：400
/// - 浏览器会话无法建立：503
pub async fn search(
    Extension(state): Extension<Arc<AppState>>,
    QueryParams(params): QueryParams<SearchQueryDto>,
) -> Result<Json<SearchResponseDto>, AppError> {
    params.validate()?;

    let search_settings = &state.settings.search;
    let query = Query::new(
        params.keyword.as_str(),
        params
            .max_results
            .unwrap_or(search_settings.default_max_results),
        params.use_cache.unwrap_or(true),
        search_settings.max_results_limit,
    )?;

    let session_id = params
        .session_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
    let ctx = state.sessions.get_or_create(&session_id);
    ctx.info(format!("Search requested: {}", query.keyword()));

    let outcome = state.run_search(&query, &ctx).await?;
    info!(
        session_id = %session_id,
        count = outcome.count,
        status = ?outcome.status,
        "Search completed"
    );
    Ok(Json(SearchResponseDto::from_outcome(outcome, session_id)))
}

/// 返回预渲染的结果页
pub async fn result_html(
    Extension(state): Extension<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Html<String>, AppError> {
    if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(RequestError::Invalid(format!("malformed result key: {}", key)).into());
    }
    match state.cache().result_html(&key).await? {
        Some(page) => Ok(Html(page)),
        None => Err(RequestError::NotFound(format!("no result page for {}", key)).into()),
    }
}

/// 热门关键词
pub async fn hot_keywords(Extension(state): Extension<Arc<AppState>>) -> Json<HotKeywordsDto> {
    Json(HotKeywordsDto {
        keywords: state.settings.search.hot_keywords.clone(),
    })
}
