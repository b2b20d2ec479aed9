// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashSet;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::config::settings::{ExtractionSettings, SiteSettings};
use crate::domain::models::candidate::{CandidateItem, ExtractionMethod};
use crate::engines::traits::BrowserSession;
use crate::utils::errors::CrawlError;

use super::fields::{
    element_text, extract_engagement, extract_images, parent_element, tags_from_text,
    truncate_chars,
};
use super::tokens::{token_from_href, TokenIndex};
use super::{ExtractionStrategy, PageSnapshot};

static HEX_IDENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([0-9a-f]{24})\b").expect("valid hex identity regex"));
static ANY_ELEMENT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body *").expect("valid universal selector"));
static AUTHOR_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"@([\w\u{4e00}-\u{9fa5}]{1,20})",
        r"作者[：:]\s*(\S{1,20})",
        r"(?i)\bby\s+(\w{1,20})",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

const MAX_IMAGES: usize = 3;
const SUMMARY_CHARS: usize = 100;

/// 策略四：静态快照
///
/// 重新获取页面标记，按 24 位十六进制笔记 ID 定位元素，
/// 完全基于文本规则提取字段。
pub struct StaticSnapshotStrategy {
    max_climb_depth: usize,
    container_text_limit: usize,
    site: SiteSettings,
}

impl StaticSnapshotStrategy {
    pub fn new(settings: &ExtractionSettings, site: &SiteSettings) -> Self {
        Self {
            max_climb_depth: settings.max_climb_depth,
            container_text_limit: settings.container_text_limit,
            site: site.clone(),
        }
    }

    /// 父元素仍含图片、文本不超过上限且不含其他笔记时继续向上
    fn climb<'a>(&self, start: ElementRef<'a>, identity: &str) -> ElementRef<'a> {
        let mut container = start;
        for _ in 0..self.max_climb_depth {
            let Some(parent) = parent_element(container) else {
                break;
            };
            if extract_images(parent, &self.site.image_hosts).is_empty()
                || element_text(parent).chars().count() > self.container_text_limit
                || holds_other_identity(parent, identity)
            {
                break;
            }
            container = parent;
        }
        container
    }

    fn parse(&self, markup: &str, remaining: usize) -> Vec<CandidateItem> {
        let document = Html::parse_document(markup);
        let tokens = TokenIndex::build(markup);
        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for element in document.select(&ANY_ELEMENT) {
            if items.len() >= remaining {
                break;
            }
            let Some((identity, carrier)) = element
                .value()
                .attrs()
                .find_map(|(_, value)| {
                    HEX_IDENTITY_RE
                        .captures(value)
                        .map(|c| (c[1].to_string(), value))
                })
            else {
                continue;
            };
            if !seen.insert(identity.clone()) {
                continue;
            }

            let container = self.climb(element, &identity);
            let mut item = CandidateItem::new(
                &identity,
                self.site.detail_url(&identity),
                ExtractionMethod::StaticSnapshot,
            );
            item.auth_token = token_from_href(carrier).or_else(|| tokens.lookup(&identity));
            self.fill(&mut item, container, items.len() + 1);
            items.push(item);
        }
        items
    }

    fn fill(&self, item: &mut CandidateItem, container: ElementRef<'_>, ordinal: usize) {
        let text = element_text(container);

        item.title = best_title(container).unwrap_or_else(|| CandidateItem::ordinal_title(ordinal));
        item.summary = if text.chars().count() > SUMMARY_CHARS {
            format!("{}...", truncate_chars(&text, SUMMARY_CHARS))
        } else {
            text.clone()
        };
        item.author = AUTHOR_RES
            .iter()
            .find_map(|re| re.captures(&text).map(|c| c[1].to_string()))
            .unwrap_or_default();
        item.images = extract_images(container, &self.site.image_hosts)
            .into_iter()
            .take(MAX_IMAGES)
            .collect();
        item.cover_image = item.images.first().cloned();
        item.tags = tags_from_text(&text);
        item.engagement = extract_engagement(container);
    }
}

fn holds_other_identity(element: ElementRef<'_>, identity: &str) -> bool {
    element
        .descendants()
        .filter_map(ElementRef::wrap)
        .flat_map(|el| el.value().attrs().map(|(_, v)| v))
        .flat_map(|v| HEX_IDENTITY_RE.captures_iter(v))
        .any(|c| &c[1] != identity)
}

/// 在 5 到 50 个字符的文本片段中选中文字符最多的一段
fn best_title(container: ElementRef<'_>) -> Option<String> {
    let mut best: Option<(usize, String)> = None;
    for fragment in container.text() {
        let fragment = fragment.trim();
        let len = fragment.chars().count();
        if !(5..=50).contains(&len) {
            continue;
        }
        let cjk = fragment
            .chars()
            .filter(|c| ('\u{4e00}'..='\u{9fa5}').contains(c))
            .count();
        if best.as_ref().map_or(true, |(score, _)| cjk > *score) {
            best = Some((cjk, fragment.to_string()));
        }
    }
    best.map(|(_, title)| title)
}

#[async_trait]
impl ExtractionStrategy for StaticSnapshotStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::StaticSnapshot
    }

    async fn extract(
        &self,
        session: &dyn BrowserSession,
        _page: &PageSnapshot,
        remaining: usize,
    ) -> Result<Vec<CandidateItem>, CrawlError> {
        // 前面的策略可能已触发懒加载，重新取一次快照
        let markup = session.page_markup().await?;
        Ok(self.parse(&markup, remaining))
    }
}
