// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::candidate::CandidateItem;

/// 详情抓取任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailTask {
    /// 在批次中的序号（从 1 开始）
    pub index: usize,
    pub identity: String,
    pub source_url: String,
    pub auth_token: Option<String>,
    pub attempt: u32,
    pub max_attempts: u32,
}

impl DetailTask {
    pub fn from_item(index: usize, item: &CandidateItem, max_attempts: u32) -> Self {
        Self {
            index,
            identity: item.identity.clone(),
            source_url: item.source_url.clone(),
            auth_token: item.auth_token.clone(),
            attempt: 0,
            max_attempts,
        }
    }

    /// 带访问令牌的完整详情页地址
    pub fn full_url(&self) -> String {
        with_auth_token(&self.source_url, self.auth_token.as_deref())
    }

    /// 持久化文件名前缀，如 `003_64a1...`
    pub fn file_stem(&self) -> String {
        format!("{:03}_{}", self.index, self.identity)
    }
}

/// 为详情页地址追加 `xsec_source` / `xsec_token`，已存在令牌时保持不变
pub fn with_auth_token(url: &str, token: Option<&str>) -> String {
    match token {
        Some(token) if !token.is_empty() && !url.contains("xsec_token=") => {
            let separator = if url.contains('?') { '&' } else { '?' };
            format!(
                "{}{}xsec_source=pc_feed&xsec_token={}",
                url, separator, token
            )
        }
        _ => url.to_string(),
    }
}

/// 单篇笔记的结构化详情
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailRecord {
    pub identity: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub author: String,
    pub images: Vec<String>,
    pub source_url: String,
    pub crawled_at: Option<DateTime<Utc>>,
    pub batch_session_id: String,
    pub index: usize,
}

/// 单个任务的最终结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub index: usize,
    pub identity: String,
    pub success: bool,
    pub attempts: u32,
    pub error: Option<String>,
    pub source_key: Option<String>,
    pub detail_key: Option<String>,
    pub title: Option<String>,
    pub content_length: usize,
    pub tag_count: usize,
    pub image_count: usize,
}

impl TaskOutcome {
    pub fn failed(task: &DetailTask, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            index: task.index,
            identity: task.identity.clone(),
            success: false,
            attempts,
            error: Some(error.into()),
            source_key: None,
            detail_key: None,
            title: None,
            content_length: 0,
            tag_count: 0,
            image_count: 0,
        }
    }
}

/// 批次元数据，批次开始时写入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchTaskInfo {
    pub session_id: String,
    pub total: usize,
    pub started_at: DateTime<Utc>,
    pub concurrency: usize,
    pub max_attempts: u32,
    pub tasks: Vec<DetailTask>,
}

/// 批次报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub session_id: String,
    pub total: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub success_rate: f64,
    pub results: Vec<TaskOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
}

/// 批次报告构建器，由唯一的收集者持有
#[derive(Debug)]
pub struct BatchReportBuilder {
    session_id: String,
    total: usize,
    started_at: DateTime<Utc>,
    results: Vec<TaskOutcome>,
}

impl BatchReportBuilder {
    pub fn new(session_id: impl Into<String>, total: usize) -> Self {
        Self {
            session_id: session_id.into(),
            total,
            started_at: Utc::now(),
            results: Vec::with_capacity(total),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn record(&mut self, outcome: TaskOutcome) {
        self.results.push(outcome);
    }

    pub fn has_index(&self, index: usize) -> bool {
        self.results.iter().any(|r| r.index == index)
    }

    pub fn finish(mut self) -> BatchReport {
        self.results.sort_by_key(|r| r.index);
        let finished_at = Utc::now();
        let success_count = self.results.iter().filter(|r| r.success).count();
        let failed_count = self.results.len() - success_count;
        let success_rate = if self.total == 0 {
            0.0
        } else {
            success_count as f64 / self.total as f64 * 100.0
        };
        let duration_secs = (finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as f64
            / 1000.0;

        BatchReport {
            session_id: self.session_id,
            total: self.total,
            success_count,
            failed_count,
            success_rate,
            results: self.results,
            started_at: self.started_at,
            finished_at,
            duration_secs,
        }
    }
}
