// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::config::settings::{ChallengeSettings, RecoverySettings, SiteSettings};
use crate::domain::models::query::Query;
use crate::domain::models::session_context::SessionContext;
use crate::domain::models::session_state::{SessionState, VerificationStatus};
use crate::domain::repositories::storage_repository::StorageRepository;
use crate::domain::services::challenge::{challenge_in_url, detect_challenge, ChallengeKind};
use crate::domain::services::page_verifier::{PageVerdict, PageVerifier};
use crate::engines::traits::{BrowserSession, ElementHandle};
use crate::utils::errors::CrawlError;

/// 按优先级排列的弹层关闭选择器
const OVERLAY_SELECTORS: &[&str] = &[
    "[class*='modal'] [class*='close']",
    "[class*='dialog'] [class*='close']",
    "[class*='popup'] [class*='close']",
    "[aria-label*='关闭']",
    "[aria-label*='close']",
    "[data-testid*='close']",
    ".close",
    "[class*='close']",
];

/// 按文本匹配的弹层关闭按钮
const OVERLAY_TEXTS: &[&str] = &["关闭", "×", "✕", "跳过", "skip"];
const OVERLAY_TEXT_CANDIDATES: &str = "button, span, i, a, div[role='button']";

/// 状态机状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Navigating,
    Verifying,
    Clearing,
    Recovering,
    ChallengeWait,
    Verified,
    Failed,
}

/// 恢复阶梯的步骤，按顺序执行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LadderStep {
    Renavigate,
    HomeSearch,
    RebuildAddress,
    ReloadRetry,
}

const LADDER: [LadderStep; 4] = [
    LadderStep::Renavigate,
    LadderStep::HomeSearch,
    LadderStep::RebuildAddress,
    LadderStep::ReloadRetry,
];

/// 一次页面检查的结果
enum Inspection {
    Verified(String),
    Challenge(ChallengeKind),
    Rejected(PageVerdict),
}

/// 单次查询解析的运行期数据
struct Run {
    state: SessionState,
    listing_url: String,
    cleared: bool,
    challenge: Option<ChallengeKind>,
    challenge_waits: u32,
}

/// 访问恢复控制器
///
/// 每次查询重新进入状态机：导航 → 校验 → 关闭弹层 → 恢复阶梯 → 验证等待。
/// 只有所有列表地址都无法加载时返回错误；其余失败都以 `Blocked` 状态结束，
/// 由调用方继续尽力提取。
pub struct AccessRecoveryController {
    site: SiteSettings,
    recovery: RecoverySettings,
    challenge: ChallengeSettings,
    verifier: PageVerifier,
    audit: Option<Arc<dyn StorageRepository>>,
}

impl AccessRecoveryController {
    pub fn new(
        site: SiteSettings,
        recovery: RecoverySettings,
        challenge: ChallengeSettings,
        verifier: PageVerifier,
    ) -> Self {
        Self {
            site,
            recovery,
            challenge,
            verifier,
            audit: None,
        }
    }

    /// 验证等待期间的截图保存位置
    pub fn with_audit_storage(mut self, storage: Arc<dyn StorageRepository>) -> Self {
        self.audit = Some(storage);
        self
    }

    /// 驱动会话到已校验的搜索结果页
    ///
    /// # 参数
    ///
    /// * `session` - 浏览器会话，调用期间独占
    /// * `query` - 查询
    /// * `ctx` - 会话调试上下文
    ///
    /// # 返回值
    ///
    /// * `Ok(SessionState)` - 最终状态，可能为 `Verified` 或 `Blocked`
    /// * `Err(CrawlError::SessionEstablishment)` - 浏览器完全无法驱动
    #[instrument(skip(self, session, ctx), fields(keyword = %query.keyword(), session_id = %ctx.session_id()))]
    pub async fn establish(
        &self,
        session: &dyn BrowserSession,
        query: &Query,
        ctx: &SessionContext,
    ) -> Result<SessionState, CrawlError> {
        let mut run = Run {
            state: SessionState::default(),
            listing_url: String::new(),
            cleared: false,
            challenge: None,
            challenge_waits: 0,
        };
        let mut phase = RecoveryState::Navigating;

        loop {
            debug!("Recovery state: {:?}", phase);
            phase = match phase {
                RecoveryState::Navigating => self.navigate_listing(session, query, ctx, &mut run).await?,
                RecoveryState::Verifying => self.verify_current(session, query, ctx, &mut run).await,
                RecoveryState::Clearing => {
                    self.clear_overlays(session, ctx).await;
                    run.cleared = true;
                    RecoveryState::Verifying
                }
                RecoveryState::Recovering => self.recover(session, query, ctx, &mut run).await,
                RecoveryState::ChallengeWait => {
                    self.wait_for_challenge(session, query, ctx, &mut run).await
                }
                RecoveryState::Verified => {
                    ctx.success(format!(
                        "Listing page verified after {} recovery attempt(s)",
                        run.state.attempt_count
                    ));
                    return Ok(run.state);
                }
                RecoveryState::Failed => {
                    run.state.verification_status = VerificationStatus::Blocked;
                    ctx.warn("Could not verify listing page, continuing with best-effort extraction");
                    return Ok(run.state);
                }
            };
        }
    }

    async fn navigate_listing(
        &self,
        session: &dyn BrowserSession,
        query: &Query,
        ctx: &SessionContext,
        run: &mut Run,
    ) -> Result<RecoveryState, CrawlError> {
        let mut last_error = String::from("no listing address configured");
        for url in self.site.listing_urls(query.keyword()) {
            ctx.info(format!("Opening listing page: {}", url));
            match session.navigate(&url).await {
                Ok(()) => {
                    run.listing_url = url.clone();
                    run.state.current_url = url;
                    self.settle(self.recovery.settle_delay()).await;
                    return Ok(RecoveryState::Verifying);
                }
                Err(e) => {
                    ctx.warn(format!("Listing navigation failed: {}", e));
                    last_error = e.to_string();
                }
            }
        }
        ctx.error("Every listing address failed to load");
        Err(CrawlError::SessionEstablishment(last_error))
    }

    async fn verify_current(
        &self,
        session: &dyn BrowserSession,
        query: &Query,
        ctx: &SessionContext,
        run: &mut Run,
    ) -> RecoveryState {
        match self.inspect(session, query, run).await {
            Inspection::Verified(url) => {
                run.state.mark_verified(&url);
                RecoveryState::Verified
            }
            Inspection::Challenge(kind) => {
                run.challenge = Some(kind);
                RecoveryState::ChallengeWait
            }
            Inspection::Rejected(verdict) => {
                ctx.warn(format!(
                    "Page rejected ({:?}) at {}",
                    verdict, run.state.current_url
                ));
                if run.cleared {
                    RecoveryState::Recovering
                } else {
                    RecoveryState::Clearing
                }
            }
        }
    }

    /// 读取页面并判定；会话读取失败视为未通过
    async fn inspect(&self, session: &dyn BrowserSession, query: &Query, run: &mut Run) -> Inspection {
        let markup = match session.page_markup().await {
            Ok(markup) => markup,
            Err(e) => {
                warn!("Failed to read page markup: {}", e);
                return Inspection::Rejected(PageVerdict::NotListingPage);
            }
        };
        let url = session.current_url().await.unwrap_or_default();
        run.state.current_url = url.clone();

        // 地址指向验证页时以验证为准；否则已通过校验的结果页不受正文标记影响
        let challenge = detect_challenge(&self.challenge, &url, &markup, query.keyword());
        let verdict = self.verifier.verify(&url, &markup, query);
        match (challenge, verdict) {
            (Some(kind), _) if challenge_in_url(&self.challenge, &url, query.keyword()) => {
                Inspection::Challenge(kind)
            }
            (_, PageVerdict::Verified) => Inspection::Verified(url),
            (Some(kind), _) => Inspection::Challenge(kind),
            (None, other) => Inspection::Rejected(other),
        }
    }

    /// 依次尝试弹层关闭策略，最后发送 Escape
    async fn clear_overlays(&self, session: &dyn BrowserSession, ctx: &SessionContext) {
        let total_cap = self.recovery.overlay_clicks_total;
        let per_tactic = self.recovery.overlay_clicks_per_tactic;
        let mut closed = 0usize;

        for selector in OVERLAY_SELECTORS {
            if closed >= total_cap {
                break;
            }
            let handles = session.find(selector).await.unwrap_or_default();
            closed += self
                .click_some(session, &handles, per_tactic.min(total_cap - closed))
                .await;
        }

        for text in OVERLAY_TEXTS {
            if closed >= total_cap {
                break;
            }
            let handles: Vec<ElementHandle> = session
                .find(OVERLAY_TEXT_CANDIDATES)
                .await
                .unwrap_or_default()
                .into_iter()
                .filter(|h| h.text.eq_ignore_ascii_case(text))
                .collect();
            closed += self
                .click_some(session, &handles, per_tactic.min(total_cap - closed))
                .await;
        }

        if let Err(e) = session.press_key(None, "Escape").await {
            debug!("Escape key press failed: {}", e);
        }
        ctx.info(format!("Overlay clearing finished, {} element(s) clicked", closed));
    }

    async fn click_some(
        &self,
        session: &dyn BrowserSession,
        handles: &[ElementHandle],
        limit: usize,
    ) -> usize {
        let mut clicked = 0;
        for handle in handles.iter().take(limit) {
            if session.click(handle).await.is_ok() {
                clicked += 1;
                self.settle(self.recovery.overlay_click_delay()).await;
            }
        }
        clicked
    }

    /// 执行一轮完整的恢复阶梯
    async fn recover(
        &self,
        session: &dyn BrowserSession,
        query: &Query,
        ctx: &SessionContext,
        run: &mut Run,
    ) -> RecoveryState {
        if run.state.attempt_count >= self.recovery.max_outer_attempts {
            return RecoveryState::Failed;
        }
        run.state.attempt_count += 1;
        ctx.info(format!(
            "Recovery attempt {}/{}",
            run.state.attempt_count, self.recovery.max_outer_attempts
        ));

        for step in LADDER {
            if let Err(e) = self.run_step(step, session, query, run).await {
                ctx.warn(format!("Recovery step {:?} failed: {}", step, e));
                continue;
            }
            match self.inspect(session, query, run).await {
                Inspection::Verified(url) => {
                    ctx.info(format!("Recovery step {:?} succeeded", step));
                    run.state.mark_verified(&url);
                    return RecoveryState::Verified;
                }
                Inspection::Challenge(kind) => {
                    run.challenge = Some(kind);
                    return RecoveryState::ChallengeWait;
                }
                Inspection::Rejected(verdict) => {
                    debug!("Recovery step {:?} left page as {:?}", step, verdict);
                }
            }
        }

        if run.state.attempt_count >= self.recovery.max_outer_attempts {
            RecoveryState::Failed
        } else {
            RecoveryState::Recovering
        }
    }

    async fn run_step(
        &self,
        step: LadderStep,
        session: &dyn BrowserSession,
        query: &Query,
        run: &mut Run,
    ) -> Result<(), CrawlError> {
        let urls = self.site.listing_urls(query.keyword());
        match step {
            LadderStep::Renavigate => {
                let target = if run.listing_url.is_empty() {
                    urls.first().cloned().unwrap_or_default()
                } else {
                    run.listing_url.clone()
                };
                session.navigate(&target).await?;
            }
            LadderStep::HomeSearch => {
                session.navigate(&self.site.home_url).await?;
                self.settle(self.recovery.settle_delay()).await;
                self.submit_search(session, query).await?;
            }
            LadderStep::RebuildAddress => {
                if urls.is_empty() {
                    return Err(CrawlError::Extraction("no listing address".into()));
                }
                let index = run.state.attempt_count as usize % urls.len();
                session.navigate(&urls[index]).await?;
                run.listing_url = urls[index].clone();
            }
            LadderStep::ReloadRetry => {
                session.reload().await?;
                self.settle(self.recovery.settle_delay()).await;
                if matches!(self.inspect(session, query, run).await, Inspection::Verified(_)) {
                    return Ok(());
                }
                let fallback = urls.last().cloned().unwrap_or_default();
                session.navigate(&fallback).await?;
            }
        }
        self.settle(self.recovery.settle_delay()).await;
        Ok(())
    }

    /// 在首页搜索框中输入关键词并回车
    async fn submit_search(
        &self,
        session: &dyn BrowserSession,
        query: &Query,
    ) -> Result<(), CrawlError> {
        for selector in &self.recovery.search_box_selectors {
            let handles = session.find(selector).await.unwrap_or_default();
            if let Some(input) = handles.first() {
                session.type_text(input, query.keyword()).await?;
                session.press_key(Some(input), "Enter").await?;
                return Ok(());
            }
        }
        Err(CrawlError::Extraction("search box not found".into()))
    }

    /// 验证等待：频率限制时冷却一次，否则轮询直到验证完成或超时
    async fn wait_for_challenge(
        &self,
        session: &dyn BrowserSession,
        query: &Query,
        ctx: &SessionContext,
        run: &mut Run,
    ) -> RecoveryState {
        run.challenge_waits += 1;
        if run.challenge_waits > 1 {
            ctx.warn("Challenge appeared again after waiting, giving up");
            return RecoveryState::Failed;
        }
        run.state.verification_status = VerificationStatus::ChallengePending;

        if run.challenge.take() == Some(ChallengeKind::RateLimited) {
            ctx.warn(format!(
                "Rate limited, cooling down for {}s",
                self.challenge.cooldown().as_secs()
            ));
            self.settle(self.challenge.cooldown()).await;
            return RecoveryState::Verifying;
        }

        ctx.warn("Human verification required, waiting for it to be completed");
        if let Err(e) = session.enter_observable_mode().await {
            warn!("Failed to switch session to observable mode: {}", e);
        }

        let deadline = Instant::now() + self.challenge.max_wait();
        let mut polls = 0u32;
        loop {
            if self.challenge.capture_screenshots {
                self.capture(session, ctx, polls).await;
            }

            let markup = session.page_markup().await.unwrap_or_default();
            let url = session.current_url().await.unwrap_or_default();
            let cleared = match detect_challenge(&self.challenge, &url, &markup, query.keyword()) {
                None => true,
                Some(_) => {
                    !challenge_in_url(&self.challenge, &url, query.keyword())
                        && self.verifier.verify(&url, &markup, query) == PageVerdict::Verified
                }
            };
            let has_content = self.verifier.has_listing_markers(&markup)
                || markup.len() > self.challenge.min_content_len;
            if cleared && has_content {
                ctx.success(format!("Verification completed after {} poll(s)", polls + 1));
                return RecoveryState::Verifying;
            }

            if Instant::now() >= deadline {
                ctx.warn(format!(
                    "Verification not completed within {}s",
                    self.challenge.max_wait().as_secs()
                ));
                return RecoveryState::Failed;
            }
            tokio::time::sleep(self.challenge.poll_interval()).await;
            polls += 1;
        }
    }

    async fn capture(&self, session: &dyn BrowserSession, ctx: &SessionContext, poll: u32) {
        let png = match session.screenshot().await {
            Ok(png) => png,
            Err(e) => {
                debug!("Screenshot failed: {}", e);
                return;
            }
        };
        if let Some(audit) = &self.audit {
            let key = format!("audit/{}/challenge_{:03}.png", ctx.session_id(), poll);
            if let Err(e) = audit.save(&key, &png).await {
                warn!("Failed to store challenge screenshot {}: {}", key, e);
            }
        }
        ctx.set_screenshot(png);
    }

    async fn settle(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::replay_session::{ReplayPage, ReplaySession};
    use crate::infrastructure::storage::InMemoryStorage;

    const HOME: &str = "https://www.xiaohongshu.com/explore";
    const RECOMMEND: &str = r#"<html><title>小红书</title><div id="homefeed_recommend">推荐</div></html>"#;
    const LISTING: &str = r#"<html><title>手表 - 小红书</title><div class="feeds-page"><section class="note-item">手表</section></div></html>"#;

    fn controller(challenge: ChallengeSettings) -> AccessRecoveryController {
        AccessRecoveryController::new(
            SiteSettings::default(),
            RecoverySettings::immediate(),
            challenge,
            PageVerifier::default(),
        )
    }

    fn query() -> Query {
        Query::new("手表", 5, true, 100).unwrap()
    }

    #[tokio::test]
    async fn test_direct_listing_verifies_without_recovery() {
        let session = ReplaySession::blank().with_route("search_result", ReplayPage::new("", LISTING));
        let ctx = SessionContext::new("t");

        let state = controller(ChallengeSettings::default())
            .establish(&session, &query(), &ctx)
            .await
            .unwrap();

        assert!(state.is_verified());
        assert_eq!(state.attempt_count, 0);
        assert_eq!(session.navigations().len(), 1);
        assert!(state.last_verified_url.unwrap().contains("search_result"));
    }

    #[tokio::test]
    async fn test_recommendation_then_listing_after_one_recovery_step() {
        let session = ReplaySession::blank()
            .with_navigation(ReplayPage::new(HOME, RECOMMEND))
            .with_navigation(ReplayPage::new("", LISTING));
        let ctx = SessionContext::new("t");

        let state = controller(ChallengeSettings::default())
            .establish(&session, &query(), &ctx)
            .await
            .unwrap();

        assert_eq!(state.verification_status, VerificationStatus::Verified);
        assert_eq!(state.attempt_count, 1);
        assert_eq!(session.keys(), vec!["Escape".to_string()]);
        assert!(!ctx.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_browser_is_fatal() {
        let session = ReplaySession::blank().with_failing_route("xiaohongshu.com");
        let ctx = SessionContext::new("t");

        let result = controller(ChallengeSettings::default())
            .establish(&session, &query(), &ctx)
            .await;

        assert!(matches!(result, Err(CrawlError::SessionEstablishment(_))));
        assert_eq!(session.navigations().len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_ladder_ends_blocked() {
        let session = ReplaySession::blank().with_route("xiaohongshu.com", ReplayPage::new(HOME, RECOMMEND));
        let ctx = SessionContext::new("t");

        let state = controller(ChallengeSettings::default())
            .establish(&session, &query(), &ctx)
            .await
            .unwrap();

        assert_eq!(state.verification_status, VerificationStatus::Blocked);
        assert_eq!(state.attempt_count, 3);
    }

    #[tokio::test]
    async fn test_home_search_step_submits_keyword() {
        let home = r#"<html><div id="homefeed_recommend"></div><input placeholder="搜索小红书"></html>"#;
        let session = ReplaySession::blank()
            .with_navigation(ReplayPage::new(HOME, RECOMMEND))
            .with_navigation(ReplayPage::new(HOME, RECOMMEND))
            .with_navigation(ReplayPage::new(HOME, home))
            .with_submit_page(ReplayPage::new(
                "https://www.xiaohongshu.com/search_result?keyword=%E6%89%8B%E8%A1%A8",
                LISTING,
            ));
        let ctx = SessionContext::new("t");

        let state = controller(ChallengeSettings::default())
            .establish(&session, &query(), &ctx)
            .await
            .unwrap();

        assert!(state.is_verified());
        assert_eq!(session.typed(), vec!["手表".to_string()]);
        assert!(session.keys().contains(&"Enter".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_challenge_resolves_and_is_audited() {
        let storage = Arc::new(InMemoryStorage::new());
        let session = ReplaySession::blank()
            .with_navigation(ReplayPage::new(
                "https://www.xiaohongshu.com/website-login/captcha",
                "<p>请完成验证</p>",
            ))
            .with_delayed_page(
                3,
                ReplayPage::new(
                    "https://www.xiaohongshu.com/search_result?keyword=%E6%89%8B%E8%A1%A8",
                    LISTING,
                ),
            );
        let ctx = SessionContext::new("audit-test");

        let state = controller(ChallengeSettings::default())
            .with_audit_storage(storage.clone())
            .establish(&session, &query(), &ctx)
            .await
            .unwrap();

        assert!(state.is_verified());
        assert!(session.is_observable());
        assert!(session.screenshot_count() >= 2);
        assert!(storage
            .exists("audit/audit-test/challenge_000.png")
            .await
            .unwrap());
        assert!(ctx.latest_screenshot().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_challenge_timeout_degrades_without_error() {
        let mut settings = ChallengeSettings::default();
        settings.max_wait_secs = 5;
        let session = ReplaySession::blank().with_route(
            "xiaohongshu.com",
            ReplayPage::new("https://www.xiaohongshu.com/website-login/captcha", "<p>请完成验证</p>"),
        );
        let ctx = SessionContext::new("t");

        let state = controller(settings)
            .establish(&session, &query(), &ctx)
            .await
            .unwrap();

        assert_eq!(state.verification_status, VerificationStatus::Blocked);
        assert!(session.screenshot_count() >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_cools_down_once_without_polling() {
        let session = ReplaySession::blank().with_route(
            "xiaohongshu.com",
            ReplayPage::new(HOME, "<p>验证过于频繁，请稍后重试</p>"),
        );
        let ctx = SessionContext::new("t");

        let started = Instant::now();
        let state = controller(ChallengeSettings::default())
            .establish(&session, &query(), &ctx)
            .await
            .unwrap();

        assert_eq!(state.verification_status, VerificationStatus::Blocked);
        assert_eq!(session.screenshot_count(), 0);
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keyword_with_challenge_words_verifies_immediately() {
        let listing = r#"<html><title>滑块验证 - 小红书</title><script>window.captcha=false</script><div class="feeds-page"><section class="note-item">滑块验证怎么过</section></div></html>"#;
        let session = ReplaySession::blank().with_route("search_result", ReplayPage::new("", listing));
        let ctx = SessionContext::new("t");
        let query = Query::new("滑块验证", 5, true, 100).unwrap();

        let started = Instant::now();
        let state = controller(ChallengeSettings::default())
            .establish(&session, &query, &ctx)
            .await
            .unwrap();

        assert!(state.is_verified());
        assert_eq!(session.screenshot_count(), 0);
        assert!(!session.is_observable());
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
