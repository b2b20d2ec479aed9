// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::settings::Settings;
use crate::domain::models::query::Query;
use crate::domain::models::session_context::SessionContext;
use crate::domain::repositories::storage_repository::StorageRepository;
use crate::domain::services::search_service::{SearchOutcome, SearchService};
use crate::engines::traits::{BrowserSession, SessionCookie, SessionFactory};
use crate::infrastructure::cache::SearchCache;
use crate::utils::errors::CrawlError;
use crate::workers::batch_scheduler::BatchScheduler;

/// 会话调试上下文注册表
///
/// 按会话 ID 保存 `SessionContext`，空闲超时后回收
pub struct SessionRegistry {
    contexts: DashMap<String, Arc<SessionContext>>,
    max_events: usize,
    trim_to: usize,
}

impl SessionRegistry {
    pub fn new(max_events: usize, trim_to: usize) -> Self {
        Self {
            contexts: DashMap::new(),
            max_events,
            trim_to,
        }
    }

    pub fn get_or_create(&self, session_id: &str) -> Arc<SessionContext> {
        self.contexts
            .entry(session_id.to_string())
            .or_insert_with(|| {
                Arc::new(SessionContext::with_limits(
                    session_id,
                    self.max_events,
                    self.trim_to,
                ))
            })
            .clone()
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionContext>> {
        self.contexts.get(session_id).map(|c| c.clone())
    }

    /// 回收空闲超过 `max_idle` 的上下文，返回回收数量
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let before = self.contexts.len();
        self.contexts.retain(|_, ctx| ctx.idle_for() <= max_idle);
        let evicted = before.saturating_sub(self.contexts.len());
        if evicted > 0 {
            debug!("Evicted {} idle session contexts", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

/// HTTP 层共享状态
///
/// 交互式查询共用一个浏览器会话，由异步互斥锁串行化
pub struct AppState {
    pub settings: Arc<Settings>,
    pub search: SearchService,
    pub scheduler: BatchScheduler,
    pub storage: Arc<dyn StorageRepository>,
    pub sessions: SessionRegistry,
    factory: Arc<dyn SessionFactory>,
    session: Mutex<Option<Box<dyn BrowserSession>>>,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        search: SearchService,
        scheduler: BatchScheduler,
        storage: Arc<dyn StorageRepository>,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        let sessions = SessionRegistry::new(settings.debug.max_events, settings.debug.trim_to);
        Self {
            settings,
            search,
            scheduler,
            storage,
            sessions,
            factory,
            session: Mutex::new(None),
        }
    }

    pub fn cache(&self) -> &Arc<SearchCache> {
        self.search.cache()
    }

    /// 在共享会话上解析查询
    ///
    /// 会话按需创建；会话无法驱动时丢弃，下次请求重新创建。
    pub async fn run_search(
        &self,
        query: &Query,
        ctx: &SessionContext,
    ) -> Result<SearchOutcome, CrawlError> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            info!("Opening interactive browser session");
            let session = self
                .factory
                .create()
                .await
                .map_err(|e| CrawlError::SessionEstablishment(e.to_string()))?;
            *guard = Some(session);
        }
        let session = guard
            .as_deref()
            .ok_or_else(|| CrawlError::SessionEstablishment("browser session unavailable".into()))?;

        let result = self.search.search(session, query, ctx).await;

        if matches!(&result, Err(e) if e.is_fatal()) {
            if let Some(session) = guard.take() {
                warn!("Discarding unusable browser session");
                if let Err(e) = session.close().await {
                    debug!("Failed to close browser session: {}", e);
                }
            }
        }
        result
    }

    /// 共享会话当前的 Cookie；会话未打开时为 None
    pub async fn session_cookies(&self) -> Option<Vec<SessionCookie>> {
        let guard = self.session.lock().await;
        let session = guard.as_deref()?;
        match session.cookies_get().await {
            Ok(cookies) => Some(cookies),
            Err(e) => {
                warn!("Failed to read session cookies: {}", e);
                None
            }
        }
    }

    /// 关闭共享会话
    pub async fn shutdown(&self) {
        if let Some(session) = self.session.lock().await.take() {
            if let Err(e) = session.close().await {
                debug!("Failed to close browser session: {}", e);
            }
        }
    }
}
