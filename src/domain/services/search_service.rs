// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::settings::Settings;
use crate::domain::models::candidate::{Strictness, ValidatedItem};
use crate::domain::models::query::Query;
use crate::domain::models::session_context::SessionContext;
use crate::domain::models::session_state::SessionState;
use crate::domain::repositories::storage_repository::StorageRepository;
use crate::domain::services::access_recovery::AccessRecoveryController;
use crate::domain::services::extraction::ExtractionPipeline;
use crate::domain::services::page_verifier::PageVerifier;
use crate::domain::services::result_curator::curate;
use crate::engines::traits::BrowserSession;
use crate::infrastructure::cache::SearchCache;
use crate::utils::errors::CrawlError;
use crate::workers::batch_scheduler::{new_batch_id, BatchScheduler};

/// 搜索结果来源
///
/// 调用方据此区分“确认没有结果”和“降级提取的结果”
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    CacheHit,
    Verified,
    Degraded,
}

/// 一次查询解析的结果
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub keyword: String,
    pub query_key: String,
    pub items: Vec<ValidatedItem>,
    pub count: usize,
    pub from_cache: bool,
    pub status: SearchStatus,
    /// 缓存命中时为空
    pub session_state: Option<SessionState>,
    /// 自动提交的批次 ID
    pub batch_id: Option<String>,
}

/// 搜索服务
///
/// 缓存 → 访问恢复 → 提取管道 → 结果筛选 → 写入缓存 → 可选的批量详情抓取
pub struct SearchService {
    recovery: AccessRecoveryController,
    pipeline: ExtractionPipeline,
    cache: Arc<SearchCache>,
    strictness: Strictness,
    use_cache: bool,
    auto_batch: Option<BatchScheduler>,
}

impl SearchService {
    pub fn new(
        recovery: AccessRecoveryController,
        pipeline: ExtractionPipeline,
        cache: Arc<SearchCache>,
        strictness: Strictness,
    ) -> Self {
        Self {
            recovery,
            pipeline,
            cache,
            strictness,
            use_cache: true,
            auto_batch: None,
        }
    }

    /// 按配置组装各组件；验证截图写入 `storage`
    pub fn from_settings(
        settings: &Settings,
        storage: Arc<dyn StorageRepository>,
        cache: Arc<SearchCache>,
    ) -> Self {
        let recovery = AccessRecoveryController::new(
            settings.site.clone(),
            settings.recovery.clone(),
            settings.challenge.clone(),
            PageVerifier::new(settings.verifier.clone()),
        )
        .with_audit_storage(storage);
        let pipeline = ExtractionPipeline::new(&settings.extraction, &settings.site);

        let mut service = Self::new(recovery, pipeline, cache, settings.search.strictness);
        service.use_cache = settings.search.use_cache;
        service
    }

    /// 搜索成功后自动提交批量详情抓取
    pub fn with_auto_batch(mut self, scheduler: BatchScheduler) -> Self {
        self.auto_batch = Some(scheduler);
        self
    }

    pub fn cache(&self) -> &Arc<SearchCache> {
        &self.cache
    }

    /// 解析一次查询
    ///
    /// 只有会话完全无法建立时返回错误；其余情况都返回结果，
    /// 通过 `status` 标明是否经过校验。
    #[instrument(skip(self, session, ctx), fields(keyword = %query.keyword(), session_id = %ctx.session_id()))]
    pub async fn search(
        &self,
        session: &dyn BrowserSession,
        query: &Query,
        ctx: &SessionContext,
    ) -> Result<SearchOutcome, CrawlError> {
        let key = query.cache_key();

        if self.use_cache && query.allow_cache() {
            if let Some(mut items) = self.cache.load(&key).await {
                items.truncate(query.requested_count());
                ctx.success(format!("Served {} cached items", items.len()));
                return Ok(SearchOutcome {
                    keyword: query.keyword().to_string(),
                    query_key: key,
                    count: items.len(),
                    items,
                    from_cache: true,
                    status: SearchStatus::CacheHit,
                    session_state: None,
                    batch_id: None,
                });
            }
        }

        let state = self.recovery.establish(session, query, ctx).await?;
        let status = if state.is_verified() {
            SearchStatus::Verified
        } else {
            SearchStatus::Degraded
        };

        let candidates = self
            .pipeline
            .extract(session, query.requested_count(), ctx)
            .await;
        let extracted = candidates.len();
        let items = curate(candidates, query, self.strictness);
        ctx.info(format!(
            "Kept {} of {} extracted items at {:?} strictness",
            items.len(),
            extracted,
            self.strictness
        ));

        match self.cache.store(&key, query.keyword(), &items).await {
            Ok(true) => ctx.debug("Search result cached"),
            Ok(false) => ctx.debug("Empty result not cached"),
            Err(e) => {
                warn!("Failed to cache search result: {}", e);
                ctx.warn(format!("Failed to cache search result: {}", e));
            }
        }

        let batch_id = self.maybe_submit_batch(&items, ctx);

        info!(
            count = items.len(),
            ?status,
            "Search resolved"
        );
        Ok(SearchOutcome {
            keyword: query.keyword().to_string(),
            query_key: key,
            count: items.len(),
            items,
            from_cache: false,
            status,
            session_state: Some(state),
            batch_id,
        })
    }

    fn maybe_submit_batch(&self, items: &[ValidatedItem], ctx: &SessionContext) -> Option<String> {
        let scheduler = self.auto_batch.as_ref()?;
        if items.is_empty() {
            return None;
        }

        let batch_id = new_batch_id();
        let candidates: Vec<_> = items.iter().map(|v| v.item.clone()).collect();
        let scheduler = scheduler.clone();
        let id = batch_id.clone();
        tokio::spawn(async move {
            scheduler.submit_batch(&candidates, &id).await;
        });

        ctx.info(format!("Submitted detail batch {}", batch_id));
        Some(batch_id)
    }
}
