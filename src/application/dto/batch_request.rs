// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::domain::models::candidate::CandidateItem;

/// `POST /api/batch` 请求体
///
/// 直接提交条目，或按关键词取缓存中的搜索结果
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_source"))]
pub struct BatchRequestDto {
    #[validate(length(max = 200))]
    pub notes: Option<Vec<CandidateItem>>,
    #[validate(length(min = 1, max = 100))]
    pub keyword: Option<String>,
    /// 调用方指定的批次 ID，缺省时自动生成
    #[validate(length(min = 1, max = 64), custom(function = "validate_batch_id"))]
    pub session_id: Option<String>,
}

/// 批次 ID 会成为存储目录名，只允许字母、数字和下划线
pub fn is_valid_batch_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_batch_id(id: &str) -> Result<(), ValidationError> {
    if is_valid_batch_id(id) {
        Ok(())
    } else {
        Err(ValidationError::new("malformed batch id"))
    }
}

fn validate_source(request: &BatchRequestDto) -> Result<(), ValidationError> {
    let has_notes = request.notes.as_ref().is_some_and(|n| !n.is_empty());
    let has_keyword = request
        .keyword
        .as_ref()
        .is_some_and(|k| !k.trim().is_empty());
    if has_notes || has_keyword {
        Ok(())
    } else {
        Err(ValidationError::new("notes or keyword required"))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchAcceptedDto {
    pub session_id: String,
    pub total: usize,
}
