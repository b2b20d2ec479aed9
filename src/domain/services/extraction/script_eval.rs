// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::settings::{ExtractionSettings, SiteSettings};
use crate::domain::models::candidate::{CandidateItem, ExtractionMethod};
use crate::engines::traits::BrowserSession;
use crate::utils::errors::CrawlError;

use super::fields::{is_note_image, normalize_image_url, truncate_chars};
use super::tokens::{identity_from_href, token_from_href, TokenIndex};
use super::{ExtractionStrategy, PageSnapshot};

/// 在页面中遍历笔记链接，返回每个链接所在条目的可见文本行
const COLLECT_SCRIPT: &str = r#"
const limit = args.limit || 30;
const depth = args.depth || 5;
const seen = new Set();
const out = [];
const links = document.querySelectorAll('a[href*="/explore/"], a[href*="/search_result/"], a[href*="/discovery/item/"]');
for (const a of links) {
  if (out.length >= limit) break;
  const href = a.getAttribute('href') || '';
  const m = href.match(/\/(?:explore|search_result|discovery\/item)\/([0-9a-zA-Z]{8,})/);
  if (!m || seen.has(m[1])) continue;
  seen.add(m[1]);
  let node = a;
  for (let i = 0; i < depth && node.parentElement; i++) {
    node = node.parentElement;
    if (node.querySelector('img') && (node.innerText || '').trim().length > 10) break;
  }
  const lines = (node.innerText || '').split('\n').map(s => s.trim()).filter(s => s.length > 0);
  const img = node.querySelector('img');
  out.push({
    href: href,
    lines: lines.slice(0, 8),
    cover: img ? (img.getAttribute('src') || img.getAttribute('data-src') || '') : ''
  });
}
return out;
"#;

#[derive(Debug, Deserialize)]
struct ScriptEntry {
    href: String,
    #[serde(default)]
    lines: Vec<String>,
    #[serde(default)]
    cover: String,
}

/// 策略三：页面内脚本
///
/// 由浏览器执行脚本遍历实时结构。互动数据无法可靠区分，统一置零，
/// 该策略的结果被视为低可信度。
pub struct ScriptEvalStrategy {
    link_limit: usize,
    max_climb_depth: usize,
    site: SiteSettings,
}

impl ScriptEvalStrategy {
    pub fn new(settings: &ExtractionSettings, site: &SiteSettings) -> Self {
        Self {
            link_limit: settings.script_link_limit,
            max_climb_depth: settings.max_climb_depth,
            site: site.clone(),
        }
    }

    fn to_item(&self, entry: ScriptEntry, tokens: &TokenIndex) -> Option<CandidateItem> {
        let identity = identity_from_href(&entry.href)?;
        let mut item = CandidateItem::new(
            &identity,
            self.site.detail_url(&identity),
            ExtractionMethod::ScriptEvaluation,
        );
        item.auth_token = token_from_href(&entry.href).or_else(|| tokens.lookup(&identity));

        let mut lines = entry
            .lines
            .into_iter()
            .filter(|l| !l.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '万'));
        item.title = lines
            .next()
            .map(|l| truncate_chars(&l, 100))
            .unwrap_or_default();
        let rest: Vec<String> = lines.collect();
        item.summary = rest
            .first()
            .map(|l| truncate_chars(l, 200))
            .unwrap_or_default();
        if rest.len() > 1 {
            item.author = rest.last().cloned().unwrap_or_default();
        }
        if is_note_image(&entry.cover, &self.site.image_hosts) {
            let cover = normalize_image_url(&entry.cover);
            item.images = vec![cover.clone()];
            item.cover_image = Some(cover);
        }
        Some(item)
    }
}

#[async_trait]
impl ExtractionStrategy for ScriptEvalStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::ScriptEvaluation
    }

    async fn extract(
        &self,
        session: &dyn BrowserSession,
        page: &PageSnapshot,
        remaining: usize,
    ) -> Result<Vec<CandidateItem>, CrawlError> {
        let limit = remaining.min(self.link_limit);
        let value = session
            .evaluate(
                COLLECT_SCRIPT,
                json!({ "limit": limit, "depth": self.max_climb_depth }),
            )
            .await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        let entries: Vec<ScriptEntry> = serde_json::from_value(value)?;
        Ok(entries
            .into_iter()
            .filter_map(|entry| self.to_item(entry, &page.tokens))
            .take(limit)
            .collect())
    }
}
