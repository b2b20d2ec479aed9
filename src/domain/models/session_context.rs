// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// 调试事件级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warning,
    Error,
    Success,
}

/// 会话调试事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugEvent {
    /// Unix 时间戳（秒，含小数）
    pub timestamp: f64,
    pub time_str: String,
    pub message: String,
    pub level: EventLevel,
}

/// 增量拉取结果
#[derive(Debug, Clone, Serialize)]
pub struct DebugSnapshot {
    pub debug_info: Vec<DebugEvent>,
    pub last_timestamp: f64,
    pub total_count: usize,
}

struct ContextInner {
    events: Vec<DebugEvent>,
    latest_screenshot: Option<Vec<u8>>,
    last_active: Instant,
}

/// 会话级调试上下文
///
/// 显式传入搜索流程各组件，取代全局注册表。事件日志有上限，
/// 超过 `max_events` 后只保留最近的 `trim_to` 条。
pub struct SessionContext {
    session_id: String,
    max_events: usize,
    trim_to: usize,
    inner: Mutex<ContextInner>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self::with_limits(session_id, 1000, 500)
    }

    pub fn with_limits(session_id: impl Into<String>, max_events: usize, trim_to: usize) -> Self {
        Self {
            session_id: session_id.into(),
            max_events: max_events.max(1),
            trim_to: trim_to.clamp(1, max_events.max(1)),
            inner: Mutex::new(ContextInner {
                events: Vec::new(),
                latest_screenshot: None,
                last_active: Instant::now(),
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// 记录一条事件
    pub fn record(&self, level: EventLevel, message: impl Into<String>) {
        let now = Utc::now();
        let event = DebugEvent {
            timestamp: unix_seconds(now),
            time_str: now.with_timezone(&Local).format("%H:%M:%S").to_string(),
            message: message.into(),
            level,
        };

        let mut inner = self.inner.lock();
        inner.events.push(event);
        if inner.events.len() > self.max_events {
            let excess = inner.events.len() - self.trim_to;
            inner.events.drain(..excess);
        }
        inner.last_active = Instant::now();
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(session_id = %self.session_id, "{}", message);
        self.record(EventLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(session_id = %self.session_id, "{}", message);
        self.record(EventLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(session_id = %self.session_id, "{}", message);
        self.record(EventLevel::Error, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(session_id = %self.session_id, "{}", message);
        self.record(EventLevel::Success, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(session_id = %self.session_id, "{}", message);
        self.record(EventLevel::Debug, message);
    }

    /// 保存最近一次截图，供调试接口展示
    pub fn set_screenshot(&self, png: Vec<u8>) {
        let mut inner = self.inner.lock();
        inner.latest_screenshot = Some(png);
        inner.last_active = Instant::now();
    }

    pub fn latest_screenshot(&self) -> Option<Vec<u8>> {
        self.inner.lock().latest_screenshot.clone()
    }

    /// 返回时间戳严格大于 `since` 的事件
    pub fn events_since(&self, since: f64) -> DebugSnapshot {
        let inner = self.inner.lock();
        let debug_info: Vec<DebugEvent> = inner
            .events
            .iter()
            .filter(|e| e.timestamp > since)
            .cloned()
            .collect();
        let last_timestamp = inner.events.last().map(|e| e.timestamp).unwrap_or(since);
        DebugSnapshot {
            debug_info,
            last_timestamp,
            total_count: inner.events.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 距最后一次活动的时间
    pub fn idle_for(&self) -> std::time::Duration {
        self.inner.lock().last_active.elapsed()
    }
}

fn unix_seconds(t: DateTime<Utc>) -> f64 {
    t.timestamp_micros() as f64 / 1_000_000.0
}
