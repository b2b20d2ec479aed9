// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::models::candidate::Engagement;

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:[.,]\d+)*)([万kKmM]?)").expect("valid number regex")
});

/// 上下文窗口（字符数）
const CONTEXT_CHARS: usize = 20;
/// 超过该值的最大未标注数字视为浏览量
const VIEW_THRESHOLD: u64 = 1000;

/// 互动数据种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementKind {
    Likes,
    Comments,
    Collects,
    Views,
}

const LABELS: &[(EngagementKind, &[&str])] = &[
    (EngagementKind::Likes, &["点赞", "赞", "like", "❤", "♥", "heart"]),
    (
        EngagementKind::Comments,
        &["评论", "评", "comment", "💬", "回复", "reply"],
    ),
    (EngagementKind::Collects, &["收藏", "collect", "⭐", "★", "star"]),
    (EngagementKind::Views, &["浏览", "观看", "播放", "阅读", "view"]),
];

/// 抓取到的单个数字及其标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberHint {
    pub value: u64,
    pub label: Option<EngagementKind>,
}

impl NumberHint {
    pub fn labelled(value: u64, kind: EngagementKind) -> Self {
        Self {
            value,
            label: Some(kind),
        }
    }

    pub fn bare(value: u64) -> Self {
        Self { value, label: None }
    }
}

/// 解析计数文本，支持 `1.2万`、`3k`、`2m`、`1,234`
pub fn parse_count(text: &str) -> Option<u64> {
    let caps = NUMBER_RE.captures(text.trim())?;
    let digits = caps.get(1)?.as_str();
    let unit = caps.get(2).map(|m| m.as_str()).unwrap_or("");

    let normalized = if unit.is_empty() && digits.contains(',') {
        digits.replace(',', "")
    } else {
        digits.replace(',', ".")
    };
    let base: f64 = normalized.parse().ok()?;
    let multiplier = match unit {
        "万" => 10_000.0,
        "k" | "K" => 1_000.0,
        "m" | "M" => 1_000_000.0,
        _ => 1.0,
    };
    Some((base * multiplier).round() as u64)
}

/// 根据上下文关键词判断种类，取离数字最近的关键词
fn nearest_label(before: &str, after: &str) -> Option<EngagementKind> {
    let before = before.to_lowercase();
    let after = after.to_lowercase();
    let mut best: Option<(usize, EngagementKind)> = None;

    for (kind, words) in LABELS {
        for word in *words {
            if let Some(pos) = before.rfind(word) {
                let distance = before[pos + word.len()..].chars().count();
                if best.map_or(true, |(d, _)| distance < d) {
                    best = Some((distance, *kind));
                }
            }
            if let Some(pos) = after.find(word) {
                let distance = after[..pos].chars().count();
                if best.map_or(true, |(d, _)| distance < d) {
                    best = Some((distance, *kind));
                }
            }
        }
    }
    best.map(|(_, kind)| kind)
}

/// 扫描文本中的所有计数，按前后各 20 个字符的上下文打标签
pub fn scan_numbers(text: &str) -> Vec<NumberHint> {
    let mut hints = Vec::new();
    for caps in NUMBER_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(value) = parse_count(whole.as_str()) else {
            continue;
        };

        let before: String = {
            let prefix = &text[..whole.start()];
            let skip = prefix.chars().count().saturating_sub(CONTEXT_CHARS);
            prefix.chars().skip(skip).collect()
        };
        let after: String = text[whole.end()..].chars().take(CONTEXT_CHARS).collect();

        hints.push(NumberHint {
            value,
            label: nearest_label(&before, &after),
        });
    }
    hints
}

/// 把抓取到的数字分配到各互动字段
///
/// 规则：
/// 1. 带标签的数字优先，每种取第一次出现的值；
/// 2. 其余数字按数值降序（相等时保持文本顺序）；
/// 3. 若浏览量未确定且最大值大于 1000，则最大值为浏览量；
/// 4. 剩余数字依次填入点赞、评论、收藏中尚未确定的字段。
pub fn disambiguate_engagement(hints: &[NumberHint]) -> Engagement {
    let mut likes = None;
    let mut comments = None;
    let mut collects = None;
    let mut views = None;
    let mut bare = Vec::new();

    for hint in hints {
        let slot = match hint.label {
            Some(EngagementKind::Likes) => &mut likes,
            Some(EngagementKind::Comments) => &mut comments,
            Some(EngagementKind::Collects) => &mut collects,
            Some(EngagementKind::Views) => &mut views,
            None => {
                bare.push(hint.value);
                continue;
            }
        };
        if slot.is_none() {
            *slot = Some(hint.value);
        }
    }

    // sort_by 为稳定排序，相等的值保持文本顺序
    bare.sort_by(|a, b| b.cmp(a));
    let mut rest = bare.into_iter().peekable();

    if views.is_none() && rest.peek().is_some_and(|v| *v > VIEW_THRESHOLD) {
        views = rest.next();
    }
    for slot in [&mut likes, &mut comments, &mut collects] {
        if slot.is_none() {
            *slot = rest.next();
        }
    }

    Engagement {
        likes: likes.unwrap_or(0),
        comments: comments.unwrap_or(0),
        collects: collects.unwrap_or(0),
        views: views.unwrap_or(0),
    }
}
