// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use tracing::info;
use validator::Validate;

use crate::application::dto::batch_request::{is_valid_batch_id, BatchAcceptedDto, BatchRequestDto};
use crate::domain::models::query::query_key;
use crate::presentation::errors::{AppError, RequestError};
use crate::presentation::state::AppState;
use crate::workers::batch_scheduler::{batch_dir, new_batch_id};

/// 提交批量详情抓取
///
/// 批次在后台任务中执行，立即返回 202 和批次 ID。
/// 请求带 `session_id` 时沿用该 ID，否则生成新 ID
pub async fn submit_batch(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<BatchRequestDto>,
) -> Result<(StatusCode, Json<BatchAcceptedDto>), AppError> {
    request.validate()?;
    let session_id = request.session_id.unwrap_or_else(new_batch_id);

    let items = match (request.notes, request.keyword) {
        (Some(notes), _) if !notes.is_empty() => notes,
        (_, Some(keyword)) => state
            .cache()
            .load(&query_key(&keyword))
            .await
            .map(|items| items.into_iter().map(|v| v.item).collect())
            .ok_or_else(|| RequestError::NotFound(format!("no cached result for {}", keyword)))?,
        _ => return Err(RequestError::Invalid("notes or keyword required".into()).into()),
    };

    let tasks = state.scheduler.tasks_from_items(&items);
    let total = tasks.len();
    info!(batch = %session_id, total, "Accepted detail batch");

    let scheduler = state.scheduler.clone();
    let id = session_id.clone();
    tokio::spawn(async move {
        scheduler.run(tasks, &id).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(BatchAcceptedDto { session_id, total }),
    ))
}

/// 读取已完成批次的统计
pub async fn batch_stats(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if !is_valid_batch_id(&session_id) {
        return Err(RequestError::Invalid(format!("malformed batch id: {}", session_id)).into());
    }
    let key = format!("{}/crawl_stats.json", batch_dir(&session_id));
    let raw = state
        .storage
        .get(&key)
        .await?
        .ok_or_else(|| RequestError::NotFound(format!("batch {} not finished", session_id)))?;
    Ok(Json(serde_json::from_slice(&raw)?))
}
