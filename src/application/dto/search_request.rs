// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::models::candidate::CandidateItem;
use crate::domain::models::session_context::DebugEvent;
use crate::domain::services::search_service::{SearchOutcome, SearchStatus};

/// `GET /api/search` 查询参数
#[derive(Debug, Deserialize, Validate)]
pub struct SearchQueryDto {
    #[validate(length(min = 1, max = 100, message = "keyword cannot be empty"))]
    pub keyword: String,
    #[validate(range(min = 1, max = 100))]
    pub max_results: Option<usize>,
    pub use_cache: Option<bool>,
    #[validate(length(min = 1, max = 64))]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponseDto {
    pub keyword: String,
    pub session_id: String,
    pub count: usize,
    pub notes: Vec<CandidateItem>,
    pub status: SearchStatus,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

impl SearchResponseDto {
    pub fn from_outcome(outcome: SearchOutcome, session_id: String) -> Self {
        let html_api_url = if outcome.count > 0 {
            Some(format!("/api/result-html/{}", outcome.query_key))
        } else {
            None
        };
        Self {
            keyword: outcome.keyword,
            session_id,
            count: outcome.count,
            notes: outcome.items.into_iter().map(|v| v.item).collect(),
            status: outcome.status,
            from_cache: outcome.from_cache,
            html_api_url,
            batch_id: outcome.batch_id,
        }
    }
}

/// `GET /api/debug/{session_id}` 查询参数
#[derive(Debug, Default, Deserialize)]
pub struct DebugQueryDto {
    /// 只返回时间戳大于该值的事件
    pub since: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DebugResponseDto {
    pub session_id: String,
    pub debug_info: Vec<DebugEvent>,
    pub last_timestamp: f64,
    pub total_count: usize,
    /// 最近一张截图（PNG，base64）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HotKeywordsDto {
    pub keywords: Vec<String>,
}
