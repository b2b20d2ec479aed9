// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static IDENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/(?:explore|search_result|discovery/item)/([0-9a-zA-Z]{8,})")
        .expect("valid identity regex")
});

static HREF_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"xsec_token=([A-Za-z0-9+/=_%-]+)").expect("valid token regex")
});

static URL_PAIR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"/(?:explore|search_result|discovery/item)/([0-9a-zA-Z]{8,})\?[^"'\s<>]*?xsec_token=([A-Za-z0-9+/=_%-]+)"#,
    )
    .expect("valid url pair regex")
});

static JSON_PAIR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#""(?:noteId|note_id|id)"\s*:\s*"([0-9a-zA-Z]{8,})"[^{}]*?"(?:xsecToken|xsec_token)"\s*:\s*"([^"]+)""#,
    )
    .expect("valid json pair regex")
});

static NEARBY_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"xsec_?[tT]oken["']?\s*[:=]\s*["']?([A-Za-z0-9+/=_%-]{8,})"#)
        .expect("valid nearby token regex")
});

static NOTE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[0-9a-f]{24}\b").expect("valid note id regex"));

static UNDEFINED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bundefined\b").expect("valid undefined regex"));

const INITIAL_STATE_MARKER: &str = "window.__INITIAL_STATE__";
/// 按 ID 向后搜索令牌的范围（字节）
const NEARBY_WINDOW: usize = 400;

/// 从链接中解析笔记 ID
pub fn identity_from_href(href: &str) -> Option<String> {
    IDENTITY_RE
        .captures(href)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// 从链接自身的查询参数中解析访问令牌
pub fn token_from_href(href: &str) -> Option<String> {
    HREF_TOKEN_RE
        .captures(href)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// 页面级的 ID 到访问令牌索引
///
/// 每个页面快照只构建一次，依次使用三种来源：
/// 页面内嵌初始状态、带令牌的笔记地址、JSON 片段。先出现的来源优先。
/// 三种来源都没有的 ID，在构建时顺带记录其后方窗口内的令牌。
#[derive(Debug, Clone, Default)]
pub struct TokenIndex {
    tokens: HashMap<String, String>,
    nearby: HashMap<String, String>,
}

impl TokenIndex {
    pub fn build(markup: &str) -> Self {
        let mut tokens = HashMap::new();

        if let Some(state) = initial_state(markup) {
            collect_state_tokens(&state, &mut tokens);
        }
        for caps in URL_PAIR_RE.captures_iter(markup) {
            tokens
                .entry(caps[1].to_string())
                .or_insert_with(|| caps[2].to_string());
        }
        for caps in JSON_PAIR_RE.captures_iter(markup) {
            tokens
                .entry(caps[1].to_string())
                .or_insert_with(|| caps[2].to_string());
        }

        let nearby = collect_nearby_tokens(markup, &tokens);
        Self { tokens, nearby }
    }

    /// 查询令牌，索引中没有时使用 ID 附近的令牌
    pub fn lookup(&self, identity: &str) -> Option<String> {
        self.tokens
            .get(identity)
            .or_else(|| self.nearby.get(identity))
            .cloned()
    }

    /// 明确来源的令牌数量
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// 一次扫描：每个笔记 ID 取其首次出现后窗口内的第一个令牌
fn collect_nearby_tokens(markup: &str, known: &HashMap<String, String>) -> HashMap<String, String> {
    let mut nearby = HashMap::new();
    for found in NOTE_ID_RE.find_iter(markup) {
        let identity = found.as_str();
        if known.contains_key(identity) || nearby.contains_key(identity) {
            continue;
        }
        let end = floor_boundary(markup, (found.end() + NEARBY_WINDOW).min(markup.len()));
        if let Some(caps) = NEARBY_TOKEN_RE.captures(&markup[found.end()..end]) {
            nearby.insert(identity.to_string(), caps[1].to_string());
        }
    }
    nearby
}

fn floor_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// 解析页面内嵌的 `window.__INITIAL_STATE__`
pub fn initial_state(markup: &str) -> Option<Value> {
    let start = markup.find(INITIAL_STATE_MARKER)?;
    let rest = &markup[start + INITIAL_STATE_MARKER.len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let end = rest.find("</script>").unwrap_or(rest.len());
    let raw = rest[..end].trim().trim_end_matches(';');
    let cleaned = UNDEFINED_RE.replace_all(raw, "null");
    serde_json::from_str(&cleaned).ok()
}

fn collect_state_tokens(value: &Value, out: &mut HashMap<String, String>) {
    match value {
        Value::Object(map) => {
            let id = ["noteId", "note_id", "id"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str));
            let token = ["xsecToken", "xsec_token"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str));
            if let (Some(id), Some(token)) = (id, token) {
                if !token.is_empty() {
                    out.entry(id.to_string())
                        .or_insert_with(|| token.to_string());
                }
            }
            for child in map.values() {
                collect_state_tokens(child, out);
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_state_tokens(child, out);
            }
        }
        _ => {}
    }
}
