// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 浏览器会话错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// 驱动层错误
    #[error("Driver error: {0}")]
    Driver(String),
    /// 超时
    #[error("Timeout")]
    Timeout,
    /// 元素不存在或已失效
    #[error("Element not found: {0}")]
    ElementNotFound(String),
    /// 脚本执行或选择器解析失败
    #[error("Script error: {0}")]
    Script(String),
    /// 会话已关闭
    #[error("Session closed")]
    Closed,
}

impl SessionError {
    /// 判断错误是否可重试
    ///
    /// # 返回值
    ///
    /// 会话仍可用、重新操作可能成功时返回 true
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Timeout | SessionError::ElementNotFound(_))
    }
}

/// 页面元素句柄
///
/// 由 `find` 返回，按选择器与匹配序号定位；页面变化后可能失效
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub selector: String,
    pub index: usize,
    /// 元素可见文本（已去除首尾空白）
    pub text: String,
}

/// 会话 Cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
}

/// 浏览器会话
///
/// 远程控制浏览器的最小原语集合。所有方法都作用于当前页面。
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// 导航到指定地址并等待加载
    async fn navigate(&self, url: &str) -> Result<(), SessionError>;

    /// 当前页面地址
    async fn current_url(&self) -> Result<String, SessionError>;

    /// 当前页面的完整标记
    async fn page_markup(&self) -> Result<String, SessionError>;

    /// 执行脚本，`args` 以 JSON 形式作为脚本函数的唯一参数传入
    async fn evaluate(
        &self,
        script: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, SessionError>;

    /// 查找匹配选择器的所有元素
    async fn find(&self, selector: &str) -> Result<Vec<ElementHandle>, SessionError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), SessionError>;

    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<(), SessionError>;

    /// 按键；`element` 为 None 时发送到页面
    async fn press_key(&self, element: Option<&ElementHandle>, key: &str)
        -> Result<(), SessionError>;

    async fn reload(&self) -> Result<(), SessionError>;

    /// 整页 PNG 截图
    async fn screenshot(&self) -> Result<Vec<u8>, SessionError>;

    async fn cookies_get(&self) -> Result<Vec<SessionCookie>, SessionError>;

    async fn cookies_set(&self, cookies: &[SessionCookie]) -> Result<(), SessionError>;

    /// 切换到可观察模式，便于人工完成验证
    async fn enter_observable_mode(&self) -> Result<(), SessionError>;

    /// 释放会话资源
    async fn close(&self) -> Result<(), SessionError>;
}

/// 会话工厂
///
/// 批量抓取中每个任务获取一个独占会话
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn BrowserSession>, SessionError>;
}
