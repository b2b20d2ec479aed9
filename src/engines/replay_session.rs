// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use parking_lot::Mutex;
use scraper::{Html, Selector};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::engines::traits::{
    BrowserSession, ElementHandle, SessionCookie, SessionError, SessionFactory,
};

const BLANK_PAGE: &str = "<html><head></head><body></body></html>";
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// 回放页面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayPage {
    /// 为空时使用导航请求的地址
    pub url: String,
    pub markup: String,
}

impl ReplayPage {
    pub fn new(url: impl Into<String>, markup: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            markup: markup.into(),
        }
    }

    fn resolved(&self, requested: &str) -> ReplayPage {
        let url = if self.url.is_empty() {
            requested.to_string()
        } else {
            self.url.clone()
        };
        ReplayPage::new(url, self.markup.clone())
    }
}

#[derive(Default)]
struct ReplayState {
    current: Option<ReplayPage>,
    scripted: VecDeque<ReplayPage>,
    routes: Vec<(String, ReplayPage)>,
    failing: Vec<String>,
    submit_page: Option<ReplayPage>,
    reload_page: Option<ReplayPage>,
    delayed: Option<(usize, ReplayPage)>,
    script_result: serde_json::Value,
    navigations: Vec<String>,
    clicks: Vec<ElementHandle>,
    typed: Vec<String>,
    keys: Vec<String>,
    scripts: Vec<String>,
    markup_reads: usize,
    screenshots: usize,
    cookies: Vec<SessionCookie>,
    observable: bool,
    closed: bool,
}

/// 离线回放会话
///
/// 用预先保存的页面标记代替真实浏览器：可重新分析缓存的搜索结果页，
/// 也用于在测试中模拟重定向、验证页和详情页。
///
/// 导航时依次尝试：脚本化页面队列 → 地址片段路由 → 空白页。
pub struct ReplaySession {
    state: Mutex<ReplayState>,
    flaky: Arc<Mutex<HashMap<String, usize>>>,
    closed_counter: Option<Arc<AtomicUsize>>,
}

impl ReplaySession {
    pub fn new(initial: ReplayPage) -> Self {
        Self {
            state: Mutex::new(ReplayState {
                current: Some(initial),
                ..ReplayState::default()
            }),
            flaky: Arc::new(Mutex::new(HashMap::new())),
            closed_counter: None,
        }
    }

    /// 从空白页开始
    pub fn blank() -> Self {
        Self::new(ReplayPage::new("about:blank", BLANK_PAGE))
    }

    /// 下一次导航返回该页面（按添加顺序消费）
    pub fn with_navigation(self, page: ReplayPage) -> Self {
        self.state.lock().scripted.push_back(page);
        self
    }

    /// 地址包含 `fragment` 的导航返回该页面
    pub fn with_route(self, fragment: impl Into<String>, page: ReplayPage) -> Self {
        self.state.lock().routes.push((fragment.into(), page));
        self
    }

    /// 地址包含 `fragment` 的导航总是失败
    pub fn with_failing_route(self, fragment: impl Into<String>) -> Self {
        self.state.lock().failing.push(fragment.into());
        self
    }

    /// 在输入框中按下回车后切换到该页面
    pub fn with_submit_page(self, page: ReplayPage) -> Self {
        self.state.lock().submit_page = Some(page);
        self
    }

    /// 刷新后切换到该页面
    pub fn with_reload_page(self, page: ReplayPage) -> Self {
        self.state.lock().reload_page = Some(page);
        self
    }

    /// 第 `reads` 次读取页面标记时切换到该页面
    pub fn with_delayed_page(self, reads: usize, page: ReplayPage) -> Self {
        self.state.lock().delayed = Some((reads, page));
        self
    }

    /// `evaluate` 的返回值
    pub fn with_script_result(self, value: serde_json::Value) -> Self {
        self.state.lock().script_result = value;
        self
    }

    fn with_shared(
        mut self,
        flaky: Arc<Mutex<HashMap<String, usize>>>,
        closed_counter: Arc<AtomicUsize>,
    ) -> Self {
        self.flaky = flaky;
        self.closed_counter = Some(closed_counter);
        self
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    pub fn clicks(&self) -> Vec<ElementHandle> {
        self.state.lock().clicks.clone()
    }

    pub fn typed(&self) -> Vec<String> {
        self.state.lock().typed.clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().keys.clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state.lock().scripts.clone()
    }

    pub fn screenshot_count(&self) -> usize {
        self.state.lock().screenshots
    }

    pub fn is_observable(&self) -> bool {
        self.state.lock().observable
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn ensure_open(state: &ReplayState) -> Result<(), SessionError> {
        if state.closed {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    fn take_flaky_failure(&self, url: &str) -> bool {
        let mut flaky = self.flaky.lock();
        for (fragment, remaining) in flaky.iter_mut() {
            if url.contains(fragment.as_str()) && *remaining > 0 {
                *remaining -= 1;
                return true;
            }
        }
        false
    }
}

/// 在标记中查找元素，返回句柄
fn select_handles(markup: &str, selector: &str) -> Result<Vec<ElementHandle>, SessionError> {
    let parsed = Selector::parse(selector)
        .map_err(|e| SessionError::Script(format!("invalid selector {}: {:?}", selector, e)))?;
    let document = Html::parse_document(markup);
    Ok(document
        .select(&parsed)
        .enumerate()
        .map(|(index, el)| ElementHandle {
            selector: selector.to_string(),
            index,
            text: el.text().collect::<String>().trim().to_string(),
        })
        .collect())
}

#[async_trait]
impl BrowserSession for ReplaySession {
    async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        if self.take_flaky_failure(url) {
            self.state.lock().navigations.push(url.to_string());
            return Err(SessionError::Driver(format!("navigation to {} failed", url)));
        }

        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.navigations.push(url.to_string());

        if state.failing.iter().any(|f| url.contains(f.as_str())) {
            return Err(SessionError::Driver(format!("navigation to {} failed", url)));
        }

        let next = if let Some(page) = state.scripted.pop_front() {
            page.resolved(url)
        } else if let Some((_, page)) = state.routes.iter().find(|(f, _)| url.contains(f.as_str())) {
            page.resolved(url)
        } else {
            ReplayPage::new(url, BLANK_PAGE)
        };
        state.current = Some(next);
        Ok(())
    }

    async fn current_url(&self) -> Result<String, SessionError> {
        let state = self.state.lock();
        Self::ensure_open(&state)?;
        Ok(state
            .current
            .as_ref()
            .map(|p| p.url.clone())
            .unwrap_or_default())
    }

    async fn page_markup(&self) -> Result<String, SessionError> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.markup_reads += 1;
        let reads = state.markup_reads;
        if matches!(state.delayed, Some((after, _)) if reads >= after) {
            if let Some((_, page)) = state.delayed.take() {
                let url = state.current.as_ref().map(|p| p.url.clone()).unwrap_or_default();
                state.current = Some(page.resolved(&url));
            }
        }
        Ok(state
            .current
            .as_ref()
            .map(|p| p.markup.clone())
            .unwrap_or_default())
    }

    async fn evaluate(
        &self,
        script: &str,
        _args: serde_json::Value,
    ) -> Result<serde_json::Value, SessionError> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.scripts.push(script.to_string());
        Ok(state.script_result.clone())
    }

    async fn find(&self, selector: &str) -> Result<Vec<ElementHandle>, SessionError> {
        let markup = {
            let state = self.state.lock();
            Self::ensure_open(&state)?;
            state
                .current
                .as_ref()
                .map(|p| p.markup.clone())
                .unwrap_or_default()
        };
        select_handles(&markup, selector)
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.clicks.push(element.clone());
        Ok(())
    }

    async fn type_text(&self, _element: &ElementHandle, text: &str) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.typed.push(text.to_string());
        Ok(())
    }

    async fn press_key(
        &self,
        element: Option<&ElementHandle>,
        key: &str,
    ) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.keys.push(key.to_string());
        if key == "Enter" && element.is_some() {
            if let Some(page) = state.submit_page.take() {
                let url = state.current.as_ref().map(|p| p.url.clone()).unwrap_or_default();
                state.current = Some(page.resolved(&url));
            }
        }
        Ok(())
    }

    async fn reload(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        if let Some(page) = state.reload_page.take() {
            let url = state.current.as_ref().map(|p| p.url.clone()).unwrap_or_default();
            state.current = Some(page.resolved(&url));
        }
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, SessionError> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.screenshots += 1;
        Ok(PNG_SIGNATURE.to_vec())
    }

    async fn cookies_get(&self) -> Result<Vec<SessionCookie>, SessionError> {
        Ok(self.state.lock().cookies.clone())
    }

    async fn cookies_set(&self, cookies: &[SessionCookie]) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.cookies.extend_from_slice(cookies);
        Ok(())
    }

    async fn enter_observable_mode(&self) -> Result<(), SessionError> {
        self.state.lock().observable = true;
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            if let Some(counter) = &self.closed_counter {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}

/// 回放会话工厂
///
/// 每次创建一个只带路由表的新会话；失败计数在所有会话间共享，
/// 用于模拟“第一次失败、重试成功”的详情页。
#[derive(Clone, Default)]
pub struct ReplaySessionFactory {
    routes: Vec<(String, ReplayPage)>,
    failing: Vec<String>,
    flaky: Arc<Mutex<HashMap<String, usize>>>,
    created: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl ReplaySessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, fragment: impl Into<String>, page: ReplayPage) -> Self {
        self.routes.push((fragment.into(), page));
        self
    }

    pub fn with_failing_route(mut self, fragment: impl Into<String>) -> Self {
        self.failing.push(fragment.into());
        self
    }

    /// 地址包含 `fragment` 的前 `failures` 次导航失败
    pub fn with_flaky_route(self, fragment: impl Into<String>, failures: usize) -> Self {
        self.flaky.lock().insert(fragment.into(), failures);
        self
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for ReplaySessionFactory {
    async fn create(&self) -> Result<Box<dyn BrowserSession>, SessionError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let mut session =
            ReplaySession::blank().with_shared(self.flaky.clone(), self.closed.clone());
        for (fragment, page) in &self.routes {
            session = session.with_route(fragment.clone(), page.clone());
        }
        for fragment in &self.failing {
            session = session.with_failing_route(fragment.clone());
        }
        Ok(Box::new(session))
    }
}
