// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

use crate::domain::repositories::storage_repository::StorageError;
use crate::engines::traits::SessionError;

/// 抓取流程错误类型
///
/// 只有 `SessionEstablishment` 会终止一次查询解析；
/// 其余错误在各自组件内部被记录并降级处理。
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("无法建立浏览器会话: {0}")]
    SessionEstablishment(String),

    #[error("会话错误: {0}")]
    Session(#[from] SessionError),

    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("无效查询: {0}")]
    InvalidQuery(String),

    #[error("提取失败: {0}")]
    Extraction(String),

    #[error("任务失败: {0}")]
    Task(String),
}

impl CrawlError {
    /// 是否为致命错误（需要向调用方传播）
    pub fn is_fatal(&self) -> bool {
        matches!(self, CrawlError::SessionEstablishment(_))
    }
}
