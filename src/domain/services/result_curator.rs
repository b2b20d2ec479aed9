// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashSet;

use tracing::debug;

use crate::domain::models::candidate::{
    CandidateItem, RelevanceVerdict, Strictness, ValidatedItem,
};
use crate::domain::models::query::Query;

/// 判断单个条目与查询的相关性
///
/// - `High`：完整关键词原样出现在标题、摘要、作者或标签中
/// - `Medium`：完整关键词出现，或至少一半的词出现，或带封面图/可信互动数据
/// - `Low`：`Medium` 的全部条件，或任一词出现，或有实际标题且互动数大于 0
pub fn assess(item: &CandidateItem, query: &Query, strictness: Strictness) -> RelevanceVerdict {
    let passed = match strictness {
        Strictness::High => phrase_in_any_field(item, query),
        Strictness::Medium => passes_medium(item, query),
        Strictness::Low => passes_medium(item, query) || passes_low(item, query),
    };
    if passed {
        RelevanceVerdict::Pass
    } else {
        RelevanceVerdict::Fail
    }
}

fn phrase_in_any_field(item: &CandidateItem, query: &Query) -> bool {
    let phrase = query.keyword().to_lowercase();
    item.content_fields()
        .into_iter()
        .any(|field| field.to_lowercase().contains(&phrase))
}

fn passes_medium(item: &CandidateItem, query: &Query) -> bool {
    let text = item.combined_text();
    if text.contains(&query.keyword().to_lowercase()) {
        return true;
    }

    let tokens = query.tokens();
    let required = tokens.len().div_ceil(2).max(1);
    let matched = tokens.iter().filter(|t| text.contains(t.as_str())).count();
    if matched >= required {
        return true;
    }

    item.cover_image.is_some() || item.trusted_engagement().is_some()
}

fn passes_low(item: &CandidateItem, query: &Query) -> bool {
    let text = item.combined_text();
    if query.tokens().iter().any(|t| text.contains(t.as_str())) {
        return true;
    }
    let real_title = item.title.trim().chars().count() > 1 && !item.has_placeholder_title();
    real_title && item.engagement.total() > 0
}

/// 按 ID 去重（保留首次出现）并给出每个条目的判定
pub fn assess_all(
    items: Vec<CandidateItem>,
    query: &Query,
    strictness: Strictness,
) -> Vec<ValidatedItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| item.has_identity() && seen.insert(item.identity.clone()))
        .map(|item| {
            let verdict = assess(&item, query, strictness);
            ValidatedItem { item, verdict }
        })
        .collect()
}

/// 校验、去重并排序
///
/// 只返回通过校验的条目，按评论数、收藏数降序稳定排序，
/// 相同时保持提取顺序。
pub fn curate(
    items: Vec<CandidateItem>,
    query: &Query,
    strictness: Strictness,
) -> Vec<ValidatedItem> {
    let total = items.len();
    let mut passed: Vec<ValidatedItem> = assess_all(items, query, strictness)
        .into_iter()
        .filter(ValidatedItem::passed)
        .collect();

    // sort_by 是稳定排序
    passed.sort_by(|a, b| {
        let (a, b) = (&a.item.engagement, &b.item.engagement);
        b.comments
            .cmp(&a.comments)
            .then_with(|| b.collects.cmp(&a.collects))
    });

    debug!(
        keyword = query.keyword(),
        ?strictness,
        total,
        passed = passed.len(),
        "Curated extracted items"
    );
    passed
}
