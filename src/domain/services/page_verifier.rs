// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use url::Url;

use crate::config::settings::VerifierSettings;
use crate::domain::models::query::Query;

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"));

/// 页面校验结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageVerdict {
    Verified,
    NotListingPage,
    RecommendationPage,
}

/// 页面校验器
///
/// 判断当前页面是否为查询对应的搜索结果页。通过条件：
/// 地址中包含关键词；或页面在标题/配置/提示片段中包含关键词，
/// 并且带有结果页结构标记。
#[derive(Debug, Clone)]
pub struct PageVerifier {
    settings: VerifierSettings,
}

impl Default for PageVerifier {
    fn default() -> Self {
        Self::new(VerifierSettings::default())
    }
}

impl PageVerifier {
    pub fn new(settings: VerifierSettings) -> Self {
        Self { settings }
    }

    /// 校验页面
    ///
    /// # 参数
    ///
    /// * `url` - 当前导航地址
    /// * `markup` - 当前页面标记
    /// * `query` - 查询
    pub fn verify(&self, url: &str, markup: &str, query: &Query) -> PageVerdict {
        let keyword = query.keyword();
        if keyword_in_url(url, keyword) {
            return PageVerdict::Verified;
        }

        let lower = markup.to_lowercase();
        let keyword_lower = keyword.to_lowercase();
        let keyword_anywhere = lower.contains(&keyword_lower);
        let feed = self.has_feed_markers(&lower);

        if keyword_in_content(&lower, &keyword_lower)
            && self.has_listing_markers(markup)
            && (!feed || keyword_anywhere)
        {
            return PageVerdict::Verified;
        }

        if (feed && !keyword_anywhere) || self.is_feed_surface(url) {
            PageVerdict::RecommendationPage
        } else {
            PageVerdict::NotListingPage
        }
    }

    /// 页面是否带有搜索结果结构标记
    pub fn has_listing_markers(&self, markup: &str) -> bool {
        let lower = markup.to_lowercase();
        self.settings
            .listing_markers
            .iter()
            .any(|m| lower.contains(&m.to_lowercase()))
    }

    fn has_feed_markers(&self, lower_markup: &str) -> bool {
        self.settings
            .feed_markers
            .iter()
            .any(|m| lower_markup.contains(&m.to_lowercase()))
    }

    /// 首页或推荐流地址
    fn is_feed_surface(&self, url: &str) -> bool {
        if self.settings.feed_url_markers.iter().any(|m| url.contains(m.as_str())) {
            return true;
        }
        match Url::parse(url) {
            Ok(parsed) => {
                let path = parsed.path().trim_end_matches('/');
                parsed.query().is_none() && (path.is_empty() || path == "/explore")
            }
            Err(_) => false,
        }
    }
}

/// 地址中是否包含关键词（原文、百分号编码或 `+` 编码）
fn keyword_in_url(url: &str, keyword: &str) -> bool {
    if url.contains(keyword) {
        return true;
    }
    let encoded = urlencoding::encode(keyword);
    if url.contains(encoded.as_ref()) || url.contains(&encoded.replace("%20", "+")) {
        return true;
    }
    // 大小写不同的百分号编码
    let upper = url.to_uppercase();
    if upper.contains(&encoded.to_uppercase()) {
        return true;
    }
    urlencoding::decode(&url.replace('+', " "))
        .map(|decoded| decoded.to_lowercase().contains(&keyword.to_lowercase()))
        .unwrap_or(false)
}

/// 关键词是否出现在标题、配置或搜索提示片段中（参数均为小写）
fn keyword_in_content(lower_markup: &str, keyword: &str) -> bool {
    let in_title = TITLE_RE
        .captures_iter(lower_markup)
        .any(|c| c.get(1).is_some_and(|t| t.as_str().contains(keyword)));
    if in_title {
        return true;
    }

    let fragments = [
        format!("\"{}\"", keyword),
        format!("'{}'", keyword),
        format!("搜索\"{}\"", keyword),
        format!("搜索“{}”", keyword),
        format!("keyword:{}", keyword),
        format!("\"keyword\":\"{}\"", keyword),
        format!("\"searchvalue\":\"{}\"", keyword),
        format!("keyword={}", keyword),
    ];
    fragments.iter().any(|f| lower_markup.contains(f.as_str()))
}
