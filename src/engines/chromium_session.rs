// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::settings::BrowserSettings;
use crate::engines::traits::{
    BrowserSession, ElementHandle, SessionCookie, SessionError, SessionFactory,
};

fn driver_err(e: impl std::fmt::Display) -> SessionError {
    SessionError::Driver(e.to_string())
}

/// 共享的浏览器实例
///
/// 连接远程调试地址或启动本地 Chrome，并在后台任务中处理 CDP 事件
pub struct ChromiumBrowser {
    browser: Browser,
    headless: bool,
    handler_task: JoinHandle<()>,
}

impl ChromiumBrowser {
    /// 启动或连接浏览器
    ///
    /// # 参数
    ///
    /// * `settings` - 浏览器配置
    ///
    /// # 返回值
    ///
    /// * `Ok(ChromiumBrowser)` - 可用的浏览器实例
    /// * `Err(SessionError)` - 无法连接或启动
    pub async fn start(settings: &BrowserSettings) -> Result<Self, SessionError> {
        let (browser, mut handler) = if let Some(url) = &settings.remote_debugging_url {
            info!("Connecting to remote Chrome instance at: {}", url);
            Browser::connect(url.as_str())
                .await
                .map_err(|e| driver_err(format!("Failed to connect to remote Chrome: {}", e)))?
        } else {
            let mut builder = BrowserConfig::builder()
                .no_sandbox()
                .request_timeout(settings.request_timeout())
                .arg("--disable-gpu")
                .arg("--disable-dev-shm-usage")
                .arg("--disable-blink-features=AutomationControlled");
            if !settings.headless {
                builder = builder.with_head();
            }
            Browser::launch(builder.build().map_err(driver_err)?)
                .await
                .map_err(driver_err)?
        };

        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            // 远程浏览器通常是有界面的实例
            headless: settings.remote_debugging_url.is_none() && settings.headless,
            handler_task,
        })
    }

    /// 打开一个新的标签页会话
    pub async fn open_session(
        &self,
        user_agent: Option<&str>,
        cookies: &[SessionCookie],
    ) -> Result<ChromiumSession, SessionError> {
        let page = self.browser.new_page("about:blank").await.map_err(driver_err)?;
        if let Some(ua) = user_agent {
            page.set_user_agent(ua).await.map_err(driver_err)?;
        }
        let session = ChromiumSession {
            page,
            headless: self.headless,
            observable: AtomicBool::new(!self.headless),
        };
        if !cookies.is_empty() {
            session.cookies_set(cookies).await?;
        }
        Ok(session)
    }
}

impl Drop for ChromiumBrowser {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

/// 基于 chromiumoxide 标签页的浏览器会话
pub struct ChromiumSession {
    page: Page,
    headless: bool,
    observable: AtomicBool,
}

impl ChromiumSession {
    async fn resolve(&self, handle: &ElementHandle) -> Result<Element, SessionError> {
        let mut elements = self
            .page
            .find_elements(handle.selector.as_str())
            .await
            .map_err(|e| SessionError::ElementNotFound(format!("{}: {}", handle.selector, e)))?;
        if handle.index >= elements.len() {
            return Err(SessionError::ElementNotFound(format!(
                "{}[{}]",
                handle.selector, handle.index
            )));
        }
        Ok(elements.swap_remove(handle.index))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        self.page.goto(url).await.map_err(driver_err)?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, SessionError> {
        Ok(self
            .page
            .url()
            .await
            .map_err(driver_err)?
            .unwrap_or_default())
    }

    async fn page_markup(&self) -> Result<String, SessionError> {
        self.page.content().await.map_err(driver_err)
    }

    async fn evaluate(
        &self,
        script: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, SessionError> {
        let expression = format!("(function(args) {{ {} }})({})", script, args);
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| SessionError::Script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn find(&self, selector: &str) -> Result<Vec<ElementHandle>, SessionError> {
        let elements = match self.page.find_elements(selector).await {
            Ok(elements) => elements,
            // 没有匹配时 CDP 可能返回错误
            Err(_) => return Ok(Vec::new()),
        };

        let mut handles = Vec::with_capacity(elements.len());
        for (index, element) in elements.iter().enumerate() {
            let text = element
                .inner_text()
                .await
                .ok()
                .flatten()
                .unwrap_or_default();
            handles.push(ElementHandle {
                selector: selector.to_string(),
                index,
                text: text.trim().to_string(),
            });
        }
        Ok(handles)
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), SessionError> {
        self.resolve(element)
            .await?
            .click()
            .await
            .map_err(driver_err)?;
        Ok(())
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<(), SessionError> {
        let target = self.resolve(element).await?;
        target.click().await.map_err(driver_err)?;
        target.type_str(text).await.map_err(driver_err)?;
        Ok(())
    }

    async fn press_key(
        &self,
        element: Option<&ElementHandle>,
        key: &str,
    ) -> Result<(), SessionError> {
        let target = match element {
            Some(handle) => self.resolve(handle).await?,
            None => self.page.find_element("body").await.map_err(driver_err)?,
        };
        target.press_key(key).await.map_err(driver_err)?;
        Ok(())
    }

    async fn reload(&self) -> Result<(), SessionError> {
        self.page.reload().await.map_err(driver_err)?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, SessionError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page.screenshot(params).await.map_err(driver_err)
    }

    async fn cookies_get(&self) -> Result<Vec<SessionCookie>, SessionError> {
        let cookies = self.page.get_cookies().await.map_err(driver_err)?;
        Ok(cookies
            .into_iter()
            .map(|c| SessionCookie {
                name: c.name,
                value: c.value,
                domain: Some(c.domain),
                path: Some(c.path),
                secure: Some(c.secure),
            })
            .collect())
    }

    async fn cookies_set(&self, cookies: &[SessionCookie]) -> Result<(), SessionError> {
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let mut builder = CookieParam::builder()
                .name(cookie.name.clone())
                .value(cookie.value.clone());
            if let Some(domain) = &cookie.domain {
                builder = builder.domain(domain.clone());
            }
            if let Some(path) = &cookie.path {
                builder = builder.path(path.clone());
            }
            if let Some(secure) = cookie.secure {
                builder = builder.secure(secure);
            }
            params.push(builder.build().map_err(driver_err)?);
        }
        self.page.set_cookies(params).await.map_err(driver_err)?;
        Ok(())
    }

    async fn enter_observable_mode(&self) -> Result<(), SessionError> {
        if self.observable.swap(true, Ordering::SeqCst) && !self.headless {
            return Ok(());
        }
        if self.headless {
            warn!("Browser runs headless; challenge must be solved through the remote debugging UI");
        }
        self.page.bring_to_front().await.map_err(driver_err)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.page.clone().close().await.map_err(driver_err)
    }
}

/// 为批量任务创建独立标签页
pub struct ChromiumSessionFactory {
    browser: Arc<ChromiumBrowser>,
    user_agent: Option<String>,
    cookies: Vec<SessionCookie>,
}

impl ChromiumSessionFactory {
    pub fn new(
        browser: Arc<ChromiumBrowser>,
        user_agent: Option<String>,
        cookies: Vec<SessionCookie>,
    ) -> Self {
        Self {
            browser,
            user_agent,
            cookies,
        }
    }
}

#[async_trait]
impl SessionFactory for ChromiumSessionFactory {
    async fn create(&self) -> Result<Box<dyn BrowserSession>, SessionError> {
        let session = self
            .browser
            .open_session(self.user_agent.as_deref(), &self.cookies)
            .await?;
        Ok(Box::new(session))
    }
}
