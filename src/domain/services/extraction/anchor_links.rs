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

use super::fields::{fill_fields, find_container};
use super::tokens::{identity_from_href, token_from_href, TokenIndex};
use super::{ExtractionStrategy, PageSnapshot};

static NOTE_ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "a[href*='/explore/'], a[href*='/search_result/'], a[href*='/discovery/item/']",
    )
    .expect("valid note anchor selector")
});

/// 策略一：笔记链接
///
/// 从指向笔记详情的链接出发，向上找到条目容器后提取字段。
pub struct AnchorLinkStrategy {
    max_climb_depth: usize,
    site: SiteSettings,
}

impl AnchorLinkStrategy {
    pub fn new(settings: &ExtractionSettings, site: &SiteSettings) -> Self {
        Self {
            max_climb_depth: settings.max_climb_depth,
            site: site.clone(),
        }
    }

    fn parse(&self, markup: &str, tokens: &TokenIndex, remaining: usize) -> Vec<CandidateItem> {
        let document = Html::parse_document(markup);
        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for anchor in document.select(&NOTE_ANCHOR_SELECTOR) {
            if items.len() >= remaining {
                break;
            }
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(identity) = identity_from_href(href) else {
                continue;
            };
            if !seen.insert(identity.clone()) {
                continue;
            }

            let container = find_container(anchor, self.max_climb_depth, &self.site.image_hosts);
            let mut item = CandidateItem::new(
                &identity,
                self.site.detail_url(&identity),
                ExtractionMethod::AnchorLinks,
            );
            item.auth_token = token_from_href(href).or_else(|| tokens.lookup(&identity));
            fill_fields(&mut item, container, &self.site.image_hosts);
            items.push(item);
        }
        items
    }
}

#[async_trait]
impl ExtractionStrategy for AnchorLinkStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::AnchorLinks
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
