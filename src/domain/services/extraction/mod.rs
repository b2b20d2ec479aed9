// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 列表条目提取管道
//!
//! 四种策略按固定顺序执行，每种策略只需补足剩余数量。
//! 累积结果按 ID 去重，达到目标数量后立即停止。

pub mod anchor_links;
pub mod attribute_index;
pub mod engagement;
pub mod fields;
pub mod script_eval;
pub mod static_snapshot;
pub mod tokens;

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::settings::{ExtractionSettings, SiteSettings};
use crate::domain::models::candidate::{CandidateItem, ExtractionMethod};
use crate::domain::models::session_context::SessionContext;
use crate::engines::traits::BrowserSession;
use crate::utils::errors::CrawlError;

pub use anchor_links::AnchorLinkStrategy;
pub use attribute_index::AttributeIndexStrategy;
pub use script_eval::ScriptEvalStrategy;
pub use static_snapshot::StaticSnapshotStrategy;
pub use tokens::TokenIndex;

/// 管道开始时获取的页面快照，令牌索引随快照构建一次
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub url: String,
    pub markup: String,
    pub tokens: TokenIndex,
}

impl PageSnapshot {
    pub fn new(url: impl Into<String>, markup: impl Into<String>) -> Self {
        let markup = markup.into();
        let tokens = TokenIndex::build(&markup);
        Self {
            url: url.into(),
            markup,
            tokens,
        }
    }

    /// 从会话读取当前页面，读取失败时返回空快照
    pub async fn capture(session: &dyn BrowserSession) -> Self {
        let markup = match session.page_markup().await {
            Ok(markup) => markup,
            Err(e) => {
                warn!("Failed to read page markup for extraction: {}", e);
                String::new()
            }
        };
        let url = session.current_url().await.unwrap_or_default();
        Self::new(url, markup)
    }
}

/// 提取策略
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn method(&self) -> ExtractionMethod;

    /// 提取最多 `remaining` 个候选条目
    async fn extract(
        &self,
        session: &dyn BrowserSession,
        page: &PageSnapshot,
        remaining: usize,
    ) -> Result<Vec<CandidateItem>, CrawlError>;
}

/// 提取管道
pub struct ExtractionPipeline {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl ExtractionPipeline {
    /// 按配置启用策略，顺序固定为：链接、属性、脚本、静态快照
    pub fn new(settings: &ExtractionSettings, site: &SiteSettings) -> Self {
        let mut strategies: Vec<Box<dyn ExtractionStrategy>> = Vec::new();
        if settings.anchor_links {
            strategies.push(Box::new(AnchorLinkStrategy::new(settings, site)));
        }
        if settings.attribute_index {
            strategies.push(Box::new(AttributeIndexStrategy::new(settings, site)));
        }
        if settings.script_eval {
            strategies.push(Box::new(ScriptEvalStrategy::new(settings, site)));
        }
        if settings.static_snapshot {
            strategies.push(Box::new(StaticSnapshotStrategy::new(settings, site)));
        }
        Self { strategies }
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }

    /// 执行管道，返回最多 `target` 个不重复的候选条目
    ///
    /// 单个策略失败只记录日志，不影响后续策略。
    pub async fn extract(
        &self,
        session: &dyn BrowserSession,
        target: usize,
        ctx: &SessionContext,
    ) -> Vec<CandidateItem> {
        let mut collected: Vec<CandidateItem> = Vec::new();
        if target == 0 {
            return collected;
        }

        let page = PageSnapshot::capture(session).await;
        debug!(tokens = page.tokens.len(), "Captured listing snapshot");
        let mut seen: HashSet<String> = HashSet::new();

        for strategy in &self.strategies {
            let remaining = target - collected.len();
            if remaining == 0 {
                break;
            }
            let method = strategy.method();

            let batch = match strategy.extract(session, &page, remaining).await {
                Ok(batch) => batch,
                Err(e) => {
                    ctx.warn(format!("Strategy {} failed: {}", method, e));
                    continue;
                }
            };

            let before = collected.len();
            for mut item in batch {
                if collected.len() >= target {
                    break;
                }
                if !item.has_identity() || !seen.insert(item.identity.clone()) {
                    continue;
                }
                item.fill_placeholders();
                collected.push(item);
            }
            let added = collected.len() - before;
            info!(
                strategy = %method,
                added,
                total = collected.len(),
                target,
                "Extraction strategy finished"
            );
            ctx.info(format!(
                "Strategy {} added {} items ({}/{})",
                method,
                added,
                collected.len(),
                target
            ));
        }

        if collected.len() < target {
            ctx.warn(format!(
                "Extraction yielded {} of {} requested items",
                collected.len(),
                target
            ));
        }
        collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::replay_session::{ReplayPage, ReplaySession};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// 返回固定 ID 列表并记录调用次数
    struct FixedStrategy {
        method: ExtractionMethod,
        ids: Vec<&'static str>,
        calls: Arc<AtomicUsize>,
        requested: Arc<parking_lot::Mutex<Vec<usize>>>,
    }

    impl FixedStrategy {
        fn boxed(
            method: ExtractionMethod,
            ids: Vec<&'static str>,
            calls: &Arc<AtomicUsize>,
            requested: &Arc<parking_lot::Mutex<Vec<usize>>>,
        ) -> Box<dyn ExtractionStrategy> {
            Box::new(Self {
                method,
                ids,
                calls: calls.clone(),
                requested: requested.clone(),
            })
        }
    }

    #[async_trait]
    impl ExtractionStrategy for FixedStrategy {
        fn method(&self) -> ExtractionMethod {
            self.method
        }

        async fn extract(
            &self,
            _session: &dyn BrowserSession,
            _page: &PageSnapshot,
            remaining: usize,
        ) -> Result<Vec<CandidateItem>, CrawlError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().push(remaining);
            Ok(self
                .ids
                .iter()
                .map(|id| CandidateItem::new(*id, format!("https://x/{}", id), self.method))
                .collect())
        }
    }

    struct FailingStrategy;

    #[async_trait]
    impl ExtractionStrategy for FailingStrategy {
        fn method(&self) -> ExtractionMethod {
            ExtractionMethod::ScriptEvaluation
        }

        async fn extract(
            &self,
            _session: &dyn BrowserSession,
            _page: &PageSnapshot,
            _remaining: usize,
        ) -> Result<Vec<CandidateItem>, CrawlError> {
            Err(CrawlError::Extraction("script crashed".to_string()))
        }
    }

    fn counters() -> (Arc<AtomicUsize>, Arc<parking_lot::Mutex<Vec<usize>>>) {
        (Arc::new(AtomicUsize::new(0)), Arc::new(parking_lot::Mutex::new(Vec::new())))
    }

    #[tokio::test]
    async fn test_fills_monotonically_and_stops_at_target() {
        let (calls, requested) = counters();
        let pipeline = ExtractionPipeline::with_strategies(vec![
            FixedStrategy::boxed(ExtractionMethod::AnchorLinks, vec!["a1", "a2"], &calls, &requested),
            FixedStrategy::boxed(
                ExtractionMethod::AttributeIndex,
                vec!["a2", "", "b1", "b2", "b3"],
                &calls,
                &requested,
            ),
            FixedStrategy::boxed(ExtractionMethod::StaticSnapshot, vec!["c1"], &calls, &requested),
        ]);
        let session = ReplaySession::new(ReplayPage::new("u", "<html></html>"));
        let ctx = SessionContext::new("t");

        let items = pipeline.extract(&session, 4, &ctx).await;
        let ids: Vec<&str> = items.iter().map(|i| i.identity.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2", "b1", "b2"]);
        assert_eq!(items[2].extraction_method, ExtractionMethod::AttributeIndex);
        // 第三个策略不会被调用
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*requested.lock(), vec![4, 2]);
        assert_eq!(items[0].title, "小红书笔记_a1");
    }

    #[tokio::test]
    async fn test_failed_strategy_is_skipped() {
        let (calls, requested) = counters();
        let pipeline = ExtractionPipeline::with_strategies(vec![
            Box::new(FailingStrategy),
            FixedStrategy::boxed(ExtractionMethod::StaticSnapshot, vec!["s1"], &calls, &requested),
        ]);
        let session = ReplaySession::blank();
        let ctx = SessionContext::new("t");

        let items = pipeline.extract(&session, 3, &ctx).await;
        assert_eq!(items.len(), 1);
        assert!(ctx
            .events_since(0.0)
            .debug_info
            .iter()
            .any(|e| e.message.contains("script crashed")));
    }

    #[tokio::test]
    async fn test_default_pipeline_on_listing_markup() {
        let markup = r#"<html><body>
            <section class="note-item"><a class="cover" href="/explore/64f1a2b3c4d5e6f7a8b9c0d1"><img src="https://sns-webpic-qc.xhscdn.com/1.jpg"></a><a class="title">手表一</a></section>
            <div data-note-id="65aa00bb11cc22dd33ee44ff"><span class="title">手表二号笔记</span></div>
        </body></html>"#;
        let session = ReplaySession::new(ReplayPage::new("u", markup));
        let pipeline =
            ExtractionPipeline::new(&ExtractionSettings::default(), &SiteSettings::default());
        assert_eq!(pipeline.strategy_count(), 4);

        let items = pipeline.extract(&session, 2, &SessionContext::new("t")).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].extraction_method, ExtractionMethod::AnchorLinks);
        assert_eq!(items[1].extraction_method, ExtractionMethod::AttributeIndex);
        // 已满足目标，不执行脚本
        assert!(session.scripts().is_empty());
    }
}
