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

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::domain::models::candidate::Strictness;

/// 应用程序配置设置
///
/// 构造时校验一次，运行期间只读
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    /// 服务器配置
    pub server: ServerSettings,
    /// 日志配置
    pub logging: LoggingSettings,
    /// 浏览器配置
    pub browser: BrowserSettings,
    /// 目标站点地址配置
    pub site: SiteSettings,
    /// 搜索与缓存配置
    pub search: SearchSettings,
    /// 页面校验标记
    pub verifier: VerifierSettings,
    /// 访问恢复状态机配置
    pub recovery: RecoverySettings,
    /// 人机验证等待配置
    pub challenge: ChallengeSettings,
    /// 提取策略配置
    pub extraction: ExtractionSettings,
    /// 批量详情抓取配置
    pub batch: BatchSettings,
    /// 存储配置
    pub storage: StorageSettings,
    /// 调试事件配置
    pub debug: DebugSettings,
}

/// 服务器配置设置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// 服务器监听主机地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// 日志配置设置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingSettings {
    /// 是否输出 JSON 格式日志
    pub json: bool,
}

/// 浏览器配置设置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// 远程调试地址，设置后连接已有浏览器而不是启动新实例
    pub remote_debugging_url: Option<String>,
    /// 启动新实例时是否无头运行
    pub headless: bool,
    /// CDP 请求超时（秒）
    pub request_timeout_secs: u64,
    /// Cookie 凭据文件路径
    pub credentials_file: Option<String>,
    /// 自定义 User-Agent
    pub user_agent: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            remote_debugging_url: None,
            headless: true,
            request_timeout_secs: 30,
            credentials_file: Some("cookies.json".to_string()),
            user_agent: None,
        }
    }
}

impl BrowserSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 目标站点地址配置
///
/// 列表地址模板中的 `{keyword}` 会被替换为百分号编码后的关键词
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    pub base_url: String,
    pub home_url: String,
    pub listing_url_templates: Vec<String>,
    /// 详情页路径前缀
    pub detail_path: String,
    /// 笔记图片所在的 CDN 域名片段
    pub image_hosts: Vec<String>,
}

impl Default for SiteSettings {
    fn default() -> Self {
        let base = "https://www.xiaohongshu.com";
        Self {
            base_url: base.to_string(),
            home_url: format!("{}/explore", base),
            listing_url_templates: vec![
                format!(
                    "{}/search_result?keyword={{keyword}}&source=web_search&type=comprehensive",
                    base
                ),
                format!(
                    "{}/search_result?keyword={{keyword}}&source=web_search&type=note",
                    base
                ),
                format!("{}/search_result?keyword={{keyword}}&source=web_search", base),
            ],
            detail_path: "/explore/".to_string(),
            image_hosts: vec!["xhscdn.com".to_string(), "ci.xiaohongshu.com".to_string()],
        }
    }
}

impl SiteSettings {
    /// 按模板顺序生成列表页地址
    pub fn listing_urls(&self, keyword: &str) -> Vec<String> {
        let encoded = urlencoding::encode(keyword);
        self.listing_url_templates
            .iter()
            .map(|template| template.replace("{keyword}", &encoded))
            .collect()
    }

    /// 根据笔记 ID 生成规范详情页地址
    pub fn detail_url(&self, identity: &str) -> String {
        format!(
            "{}{}{}",
            self.base_url.trim_end_matches('/'),
            self.detail_path,
            identity
        )
    }
}

/// 搜索与缓存配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// 未指定数量时的默认返回条数
    pub default_max_results: usize,
    /// 单次查询数量上限
    pub max_results_limit: usize,
    /// 默认是否允许读取缓存
    pub use_cache: bool,
    /// 缓存有效期（秒）
    pub cache_ttl_secs: u64,
    /// 相关性过滤严格度
    pub strictness: Strictness,
    /// 热门关键词
    pub hot_keywords: Vec<String>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_max_results: 21,
            max_results_limit: 100,
            use_cache: true,
            cache_ttl_secs: 3600,
            strictness: Strictness::Medium,
            hot_keywords: ["美食", "旅行", "穿搭", "护肤", "健身", "摄影", "家居", "读书"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl SearchSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// 页面校验标记
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifierSettings {
    /// 搜索结果页结构标记
    pub listing_markers: Vec<String>,
    /// 通用推荐流标记
    pub feed_markers: Vec<String>,
    /// 推荐流 / 首页地址片段
    pub feed_url_markers: Vec<String>,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            listing_markers: strings(&[
                "search_result",
                "searchResult",
                "搜索结果",
                "noteList",
                "feeds-page",
            ]),
            feed_markers: strings(&["homefeed_recommend", "首页推荐"]),
            feed_url_markers: strings(&["homefeed", "recommend", "/explore?", "channel_id"]),
        }
    }
}

/// 访问恢复状态机配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    /// 恢复阶梯的最大外层尝试次数（不超过 3）
    pub max_outer_attempts: u32,
    /// 导航后的稳定等待（毫秒）
    pub settle_delay_ms: u64,
    /// 关闭弹层点击之间的等待（毫秒）
    pub overlay_click_delay_ms: u64,
    /// 每种弹层策略最多点击次数
    pub overlay_clicks_per_tactic: usize,
    /// 累计最多点击次数
    pub overlay_clicks_total: usize,
    /// 首页搜索框选择器
    pub search_box_selectors: Vec<String>,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            max_outer_attempts: 3,
            settle_delay_ms: 3000,
            overlay_click_delay_ms: 500,
            overlay_clicks_per_tactic: 3,
            overlay_clicks_total: 3,
            search_box_selectors: strings(&[
                "input[placeholder*='搜索']",
                "input[placeholder*='search']",
                ".search-input",
                "#search-input",
                "input[type='search']",
                ".searchInput",
                "[data-testid*='search']",
            ]),
        }
    }
}

impl RecoverySettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn overlay_click_delay(&self) -> Duration {
        Duration::from_millis(self.overlay_click_delay_ms)
    }

    /// 测试用：所有等待为零
    pub fn immediate() -> Self {
        Self {
            settle_delay_ms: 0,
            overlay_click_delay_ms: 0,
            ..Self::default()
        }
    }
}

/// 人机验证等待配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChallengeSettings {
    /// 轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 最长等待时间（秒）
    pub max_wait_secs: u64,
    /// 频率限制提示后的冷却时间（秒）
    pub cooldown_secs: u64,
    /// 视为页面已恢复的最小内容长度
    pub min_content_len: usize,
    /// 每次轮询是否截图留档
    pub capture_screenshots: bool,
    pub url_markers: Vec<String>,
    pub content_markers: Vec<String>,
    pub rate_limit_markers: Vec<String>,
}

impl Default for ChallengeSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_wait_secs: 480,
            cooldown_secs: 60,
            min_content_len: 20_000,
            capture_screenshots: true,
            url_markers: strings(&["captcha", "verify", "website-login", "验证"]),
            content_markers: strings(&[
                "请完成验证",
                "滑块验证",
                "拖动滑块",
                "安全验证",
                "captcha",
                "verify-container",
            ]),
            rate_limit_markers: strings(&[
                "验证过于频繁",
                "请稍后重试",
                "too frequent",
                "try again later",
            ]),
        }
    }
}

impl ChallengeSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// 提取策略配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub anchor_links: bool,
    pub attribute_index: bool,
    pub script_eval: bool,
    pub static_snapshot: bool,
    /// 向上查找条目容器的最大层数
    pub max_climb_depth: usize,
    /// 静态快照策略中容器文本长度上限
    pub container_text_limit: usize,
    /// 属性索引策略中 ID 的最小长度
    pub min_identity_len: usize,
    /// 脚本策略最多遍历的链接数
    pub script_link_limit: usize,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            anchor_links: true,
            attribute_index: true,
            script_eval: true,
            static_snapshot: true,
            max_climb_depth: 5,
            container_text_limit: 500,
            min_identity_len: 10,
            script_link_limit: 60,
        }
    }
}

/// 批量详情抓取配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// 并发工作者数量
    pub concurrency: usize,
    /// 单个任务的最大尝试次数
    pub max_attempts: u32,
    /// 线性退避单位（毫秒）
    pub retry_backoff_ms: u64,
    /// 退避抖动因子 (0.0-1.0)，0 表示不抖动
    pub retry_jitter: f64,
    /// 单次尝试超时（秒）
    pub task_timeout_secs: u64,
    /// 等待页面就绪的超时（秒）
    pub readiness_timeout_secs: u64,
    /// 页面就绪所需的最小标记长度
    pub readiness_min_len: usize,
    /// 搜索成功后是否自动提交批量任务
    pub auto_submit: bool,
    /// 详情页不存在的提示文本，命中后不再重试
    pub error_page_markers: Vec<String>,
    pub pacing: PacingSettings,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_attempts: 2,
            retry_backoff_ms: 2000,
            retry_jitter: 0.0,
            task_timeout_secs: 90,
            readiness_timeout_secs: 15,
            readiness_min_len: 1000,
            auto_submit: false,
            error_page_markers: vec![
                "你访问的笔记不见了".to_string(),
                "页面不存在".to_string(),
                "内容已删除".to_string(),
            ],
            pacing: PacingSettings::default(),
        }
    }
}

impl BatchSettings {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// 随机节奏配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PacingSettings {
    pub enabled: bool,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// 23 点到 6 点的延迟倍率
    pub night_multiplier: f64,
    /// 12 点到 14 点的延迟倍率
    pub midday_multiplier: f64,
    pub scroll_steps_min: u32,
    pub scroll_steps_max: u32,
    pub scroll_px_min: u32,
    pub scroll_px_max: u32,
    pub dwell_min_ms: u64,
    pub dwell_max_ms: u64,
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_delay_ms: 3000,
            max_delay_ms: 8000,
            night_multiplier: 1.5,
            midday_multiplier: 1.2,
            scroll_steps_min: 1,
            scroll_steps_max: 3,
            scroll_px_min: 200,
            scroll_px_max: 800,
            dwell_min_ms: 5000,
            dwell_max_ms: 15000,
        }
    }
}

impl PacingSettings {
    /// 关闭所有节奏等待
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// 存储配置设置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// 本地存储根目录
    pub local_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            local_path: "./data".to_string(),
        }
    }
}

/// 调试事件配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    /// 每个会话保留的最大事件数
    pub max_events: usize,
    /// 超出上限后裁剪到的事件数
    pub trim_to: usize,
    /// 会话上下文空闲多久后被回收（秒）
    pub session_idle_secs: u64,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            max_events: 1000,
            trim_to: 500,
            session_idle_secs: 3600,
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次合并内置默认值、`config/default`、`config/{APP_ENVIRONMENT}`
    /// 以及 `NOTECRAWL__` 前缀的环境变量，然后做一次范围校验
    ///
    /// # 返回值
    ///
    /// * `Ok(Settings)` - 校验通过的配置
    /// * `Err(ConfigError)` - 加载或校验失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("NOTECRAWL").separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// 校验配置取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::Message(msg.to_string()));

        if self.site.listing_url_templates.is_empty() {
            return fail("site.listing_url_templates must not be empty");
        }
        if self
            .site
            .listing_url_templates
            .iter()
            .any(|t| !t.contains("{keyword}"))
        {
            return fail("every listing url template must contain {keyword}");
        }
        if self.search.max_results_limit == 0 {
            return fail("search.max_results_limit must be positive");
        }
        if self.search.default_max_results == 0
            || self.search.default_max_results > self.search.max_results_limit
        {
            return fail("search.default_max_results must be within 1..=max_results_limit");
        }
        if self.recovery.max_outer_attempts == 0 || self.recovery.max_outer_attempts > 3 {
            return fail("recovery.max_outer_attempts must be within 1..=3");
        }
        if self.challenge.poll_interval_ms == 0 {
            return fail("challenge.poll_interval_ms must be positive");
        }
        if self.extraction.max_climb_depth == 0 {
            return fail("extraction.max_climb_depth must be positive");
        }
        if self.batch.concurrency == 0 {
            return fail("batch.concurrency must be at least 1");
        }
        if self.batch.max_attempts == 0 {
            return fail("batch.max_attempts must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.batch.retry_jitter) {
            return fail("batch.retry_jitter must be within 0.0..=1.0");
        }
        let pacing = &self.batch.pacing;
        if pacing.min_delay_ms > pacing.max_delay_ms
            || pacing.dwell_min_ms > pacing.dwell_max_ms
            || pacing.scroll_steps_min > pacing.scroll_steps_max
            || pacing.scroll_px_min > pacing.scroll_px_max
        {
            return fail("batch.pacing ranges must have min <= max");
        }
        if self.debug.trim_to == 0 || self.debug.trim_to > self.debug.max_events {
            return fail("debug.trim_to must be within 1..=max_events");
        }
        Ok(())
    }
}
