// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::application::dto::search_request::{DebugQueryDto, DebugResponseDto};
use crate::presentation::errors::{AppError, RequestError};
use crate::presentation::state::AppState;

/// 增量拉取会话调试事件
///
/// `since` 为上次返回的 `last_timestamp`，省略时返回全部事件
pub async fn debug_events(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(params): Query<DebugQueryDto>,
) -> Result<Json<DebugResponseDto>, AppError> {
    let ctx = state
        .sessions
        .get(&session_id)
        .ok_or_else(|| RequestError::NotFound(format!("unknown session {}", session_id)))?;

    let snapshot = ctx.events_since(params.since.unwrap_or(0.0));
    let screenshot = ctx.latest_screenshot().map(|png| STANDARD.encode(png));

    Ok(Json(DebugResponseDto {
        session_id,
        debug_info: snapshot.debug_info,
        last_timestamp: snapshot.last_timestamp,
        total_count: snapshot.total_count,
        screenshot,
    }))
}
