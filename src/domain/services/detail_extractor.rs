// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::config::settings::{BatchSettings, SiteSettings};
use crate::domain::models::detail::{DetailRecord, DetailTask};
use crate::domain::services::extraction::fields::{
    element_text, is_note_image, is_valid_tag, normalize_image_url, tags_from_text,
};
use crate::domain::services::extraction::tokens::initial_state;

fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter().filter_map(|s| Selector::parse(s).ok()).collect()
}

static TITLE_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        "#detail-title",
        "h1.title",
        ".note-title",
        "[data-testid='note-title']",
        ".note-content .title",
        "h1",
        ".content-title",
    ])
});

static CONTENT_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        "#detail-desc",
        ".note-content .desc",
        ".note-content",
        ".content-text",
        "[data-testid='note-content']",
        ".desc",
        ".note-desc",
        ".content-desc",
    ])
});

static AUTHOR_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        ".author-wrapper .username",
        ".author-wrapper .name",
        ".author-name",
        ".user-name",
        "[data-testid='author']",
        ".note-author",
        ".author .name",
        ".username",
    ])
});

static TAG_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        "#hash-tag",
        ".tag",
        ".hashtag",
        ".topic",
        "[data-testid='tag']",
        ".note-tag",
        ".topic-tag",
    ])
});

static IMAGE_SCOPES: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[".note-slider img", ".media-container img", ".swiper img", "img"])
});

static DOC_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("valid title selector"));

/// 详情页最多保留的标签数
const MAX_DETAIL_TAGS: usize = 10;
const SITE_TITLE_SUFFIXES: &[&str] = &[" - 小红书", " | 小红书", "- 小红书"];

/// 详情页解析器
///
/// 先用页面结构提取，缺失的字段再从内嵌初始状态中补齐。
#[derive(Debug, Clone)]
pub struct DetailExtractor {
    error_markers: Vec<String>,
    image_hosts: Vec<String>,
}

impl DetailExtractor {
    pub fn new(batch: &BatchSettings, site: &SiteSettings) -> Self {
        Self {
            error_markers: batch.error_page_markers.clone(),
            image_hosts: site.image_hosts.clone(),
        }
    }

    /// 返回命中的“笔记不存在”提示
    pub fn missing_marker(&self, markup: &str) -> Option<&str> {
        self.error_markers
            .iter()
            .find(|m| markup.contains(m.as_str()))
            .map(String::as_str)
    }

    /// 解析详情页
    pub fn extract(&self, markup: &str, task: &DetailTask, batch_session_id: &str) -> DetailRecord {
        let document = Html::parse_document(markup);

        let first_text = |list: &[Selector]| {
            list.iter()
                .flat_map(|s| document.select(s))
                .map(element_text)
                .find(|t| !t.is_empty())
        };

        let mut title = first_text(&TITLE_SELECTORS).unwrap_or_default();
        let mut content = first_text(&CONTENT_SELECTORS).unwrap_or_default();
        let mut author = first_text(&AUTHOR_SELECTORS).unwrap_or_default();

        let mut tags: Vec<String> = Vec::new();
        for el in TAG_SELECTORS.iter().flat_map(|s| document.select(s)) {
            push_tag(&mut tags, &element_text(el));
        }
        for tag in tags_from_text(&content) {
            push_tag(&mut tags, &tag);
        }

        let mut images: Vec<String> = Vec::new();
        for scope in IMAGE_SCOPES.iter() {
            for img in document.select(scope) {
                for attr in ["src", "data-src", "data-original"] {
                    if let Some(src) = img.value().attr(attr) {
                        push_image(&mut images, src, &self.image_hosts);
                    }
                }
            }
            if !images.is_empty() {
                break;
            }
        }

        if title.is_empty() {
            title = document
                .select(&DOC_TITLE)
                .next()
                .map(element_text)
                .map(|t| strip_site_suffix(&t))
                .unwrap_or_default();
        }

        if let Some(state) = initial_state(markup) {
            if let Some(note) = find_state_note(&state, &task.identity) {
                fill_from_state(
                    note,
                    &mut title,
                    &mut content,
                    &mut author,
                    &mut tags,
                    &mut images,
                    &self.image_hosts,
                );
            }
            if content.is_empty() {
                content = search_text(&state).unwrap_or_default();
            }
        }

        DetailRecord {
            identity: task.identity.clone(),
            title,
            content,
            tags,
            author,
            images,
            source_url: task.full_url(),
            crawled_at: Some(Utc::now()),
            batch_session_id: batch_session_id.to_string(),
            index: task.index,
        }
    }
}

fn strip_site_suffix(title: &str) -> String {
    let mut title = title.trim().to_string();
    for suffix in SITE_TITLE_SUFFIXES {
        if let Some(stripped) = title.strip_suffix(suffix) {
            title = stripped.trim().to_string();
        }
    }
    if title == "小红书" {
        String::new()
    } else {
        title
    }
}

fn push_tag(tags: &mut Vec<String>, raw: &str) {
    if tags.len() >= MAX_DETAIL_TAGS {
        return;
    }
    let tag = raw.trim().trim_start_matches('#').trim_end_matches("[话题]").trim().to_string();
    if is_valid_tag(&tag) && !tags.contains(&tag) {
        tags.push(tag);
    }
}

fn push_image(images: &mut Vec<String>, raw: &str, hosts: &[String]) {
    if is_note_image(raw, hosts) {
        let url = normalize_image_url(raw);
        if !images.contains(&url) {
            images.push(url);
        }
    }
}

/// 在初始状态中查找 ID 对应的笔记对象
fn find_state_note<'a>(state: &'a Value, identity: &str) -> Option<&'a Value> {
    let pointer = format!("/note/noteDetailMap/{}/note", identity);
    if let Some(note) = state.pointer(&pointer) {
        return Some(note);
    }
    find_note_object(state, identity)
}

fn find_note_object<'a>(value: &'a Value, identity: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => {
            let id_matches = ["noteId", "note_id", "id"]
                .iter()
                .any(|k| map.get(*k).and_then(Value::as_str) == Some(identity));
            if id_matches && (map.contains_key("desc") || map.contains_key("title")) {
                return Some(value);
            }
            map.values().find_map(|v| find_note_object(v, identity))
        }
        Value::Array(items) => items.iter().find_map(|v| find_note_object(v, identity)),
        _ => None,
    }
}

fn fill_from_state(
    note: &Value,
    title: &mut String,
    content: &mut String,
    author: &mut String,
    tags: &mut Vec<String>,
    images: &mut Vec<String>,
    hosts: &[String],
) {
    let text = |key: &str| {
        note.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if title.is_empty() {
        if let Some(t) = text("title") {
            *title = t;
        }
    }
    if content.is_empty() {
        if let Some(desc) = text("desc").or_else(|| text("content")) {
            *content = desc;
        }
    }
    if author.is_empty() {
        if let Some(name) = note
            .pointer("/user/nickname")
            .or_else(|| note.pointer("/user/nickName"))
            .and_then(Value::as_str)
        {
            *author = name.to_string();
        }
    }
    if let Some(list) = note.get("tagList").and_then(Value::as_array) {
        for tag in list {
            if let Some(name) = tag.get("name").and_then(Value::as_str) {
                push_tag(tags, name);
            }
        }
    }
    if let Some(list) = note.get("imageList").and_then(Value::as_array) {
        for image in list {
            let url = ["urlDefault", "url", "urlPre"]
                .iter()
                .find_map(|k| image.get(*k).and_then(Value::as_str));
            if let Some(url) = url {
                push_image(images, url, hosts);
            }
        }
    }
}

/// 任意位置第一个足够长的 desc/content/text 字段
fn search_text(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            for key in ["desc", "content", "text"] {
                if let Some(s) = map.get(key).and_then(Value::as_str) {
                    if s.chars().count() > 10 {
                        return Some(s.to_string());
                    }
                }
            }
            map.values().find_map(search_text)
        }
        Value::Array(items) => items.iter().find_map(search_text),
        _ => None,
    }
}
