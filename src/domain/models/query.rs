// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::utils::errors::CrawlError;

/// 一次搜索查询
///
/// 创建后不可修改；关键词已去除首尾空白
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    keyword: String,
    requested_count: usize,
    allow_cache: bool,
}

impl Query {
    /// 创建查询
    ///
    /// # 参数
    ///
    /// * `keyword` - 搜索关键词
    /// * `requested_count` - 期望返回条数，范围 `1..=limit`
    /// * `allow_cache` - 是否允许命中缓存
    /// * `limit` - 条数上限
    pub fn new(
        keyword: impl Into<String>,
        requested_count: usize,
        allow_cache: bool,
        limit: usize,
    ) -> Result<Self, CrawlError> {
        let keyword = keyword.into().trim().to_string();
        if keyword.is_empty() {
            return Err(CrawlError::InvalidQuery("keyword cannot be empty".into()));
        }
        if requested_count == 0 || requested_count > limit {
            return Err(CrawlError::InvalidQuery(format!(
                "requested count {} must be within 1..={}",
                requested_count, limit
            )));
        }
        Ok(Self {
            keyword,
            requested_count,
            allow_cache,
        })
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn requested_count(&self) -> usize {
        self.requested_count
    }

    pub fn allow_cache(&self) -> bool {
        self.allow_cache
    }

    /// 缓存键
    pub fn cache_key(&self) -> String {
        query_key(&self.keyword)
    }

    /// 小写后的关键词片段（按空白切分，保持顺序去重）
    pub fn tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = Vec::new();
        for token in self.keyword.to_lowercase().split_whitespace() {
            if !tokens.iter().any(|t| t == token) {
                tokens.push(token.to_string());
            }
        }
        tokens
    }
}

/// 根据关键词计算缓存键（SHA-256 十六进制）
pub fn query_key(keyword: &str) -> String {
    let digest = Sha256::digest(keyword.trim().as_bytes());
    hex::encode(digest)
}
