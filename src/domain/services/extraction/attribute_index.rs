// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashSet;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use crate::config::settings::{ExtractionSettings, SiteSettings};
use crate::domain::models::candidate::{CandidateItem, ExtractionMethod};
use crate::engines::traits::BrowserSession;
use crate::utils::errors::CrawlError;

use super::fields::fill_fields;
use super::tokens::{identity_from_href, TokenIndex};
use super::{ExtractionStrategy, PageSnapshot};

/// 选择器与承载 ID 的属性
static ID_ATTRIBUTES: Lazy<Vec<(Selector, &'static str)>> = Lazy::new(|| {
    [
        ("[data-note-id]", "data-note-id"),
        ("[data-id]", "data-id"),
        ("[data-testid]", "data-testid"),
        ("[id*='note']", "id"),
    ]
    .into_iter()
    .filter_map(|(css, attr)| Selector::parse(css).ok().map(|s| (s, attr)))
    .collect()
});

/// 策略二：ID 属性索引
///
/// 适用于没有详情链接、但元素上带有笔记 ID 的布局。
pub struct AttributeIndexStrategy {
    min_identity_len: usize,
    site: SiteSettings,
}

impl AttributeIndexStrategy {
    pub fn new(settings: &ExtractionSettings, site: &SiteSettings) -> Self {
        Self {
            min_identity_len: settings.min_identity_len,
            site: site.clone(),
        }
    }

    fn identity_from_attribute(&self, value: &str) -> Option<String> {
        if let Some(identity) = identity_from_href(value) {
            return Some(identity);
        }
        let value = value.trim();
        let value = value.strip_prefix("note-").unwrap_or(value);
        (value.len() >= self.min_identity_len && value.chars().all(|c| c.is_ascii_alphanumeric()))
            .then(|| value.to_string())
    }

    fn parse(&self, markup: &str, tokens: &TokenIndex, remaining: usize) -> Vec<CandidateItem> {
        let document = Html::parse_document(markup);
        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for (selector, attr) in ID_ATTRIBUTES.iter() {
            for element in document.select(selector) {
                if items.len() >= remaining {
                    return items;
                }
                let Some(identity) = element
                    .value()
                    .attr(attr)
                    .and_then(|v| self.identity_from_attribute(v))
                else {
                    continue;
                };
                if !seen.insert(identity.clone()) {
                    continue;
                }

                let mut item = CandidateItem::new(
                    &identity,
                    self.site.detail_url(&identity),
                    ExtractionMethod::AttributeIndex,
                );
                item.auth_token = tokens.lookup(&identity);
                fill_fields(&mut item, element, &self.site.image_hosts);
                items.push(item);
            }
        }
        items
    }
}

#[async_trait]
impl ExtractionStrategy for AttributeIndexStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::AttributeIndex
    }

    async fn extract(
        &self,
        _session: &dyn BrowserSession,
        page: &PageSnapshot,
        remaining: usize,
    ) -> Result<Vec<CandidateItem>, CrawlError> {
        Ok(self.parse(&page.markup, &page.tokens, remaining))
    }
}
