// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 列表条目字段提取
//!
//! 所有函数都是同步的，调用方负责在 `.await` 之前释放解析后的文档。

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};

use crate::domain::models::candidate::{CandidateItem, Engagement};

use super::engagement::{
    disambiguate_engagement, parse_count, scan_numbers, EngagementKind, NumberHint,
};

fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter().filter_map(|s| Selector::parse(s).ok()).collect()
}

static TITLE_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        ".title",
        "[class*='title']",
        "[class*='Title']",
        "h1, h2, h3, h4",
        "[class*='name']:not([class*='author']):not([class*='user'])",
        "[class*='desc']",
    ])
});

static SUMMARY_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        ".desc",
        "[class*='desc']",
        "[class*='content']",
        "[class*='summary']",
        "[class*='text']",
        "p",
    ])
});

static AUTHOR_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        ".author .name",
        "[class*='author'] [class*='name']",
        "[class*='nickname']",
        "[class*='author']",
        "[class*='user'] [class*='name']",
        "[class*='user']",
    ])
});

static TAG_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        "[class*='tag']",
        "[class*='topic']",
        "[class*='label']",
        "a[href*='search_result?keyword']",
    ])
});

static IMG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("valid img selector"));
static STYLED_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[style*='background']").expect("valid style selector"));
static COUNT_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "[class*='like'], [class*='comment'], [class*='collect'], [class*='count'], [class*='interact'], [class*='view']",
    )
    .expect("valid count selector")
});

static BACKGROUND_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"url\(\s*['"]?([^'")]+)['"]?\s*\)"#).expect("valid background regex")
});
static AUTHOR_TRAILER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\d\s·•|:：,.]+$").expect("valid author trailer regex"));
static TAG_CHARS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\u{4e00}-\u{9fa5}a-zA-Z0-9#@\s]+$").expect("valid tag charset regex")
});
static TAG_TEXT_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"#([^#\s]{1,20})", r"【([^】]{1,20})】", r"「([^」]{1,20})」"]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

const IMAGE_ATTRIBUTES: &[&str] = &["src", "data-src", "data-lazy-src", "data-original"];
const IMAGE_REJECT: &[&str] = &["avatar", "icon", "logo", "placeholder", "default", "emoji"];
const TAG_EXCLUDED: &[&str] = &["小红书", "笔记", "更多", "展开", "收起", "关注", "点赞", "收藏", "评论"];
const CONTAINER_HINTS: &[&str] = &[
    "note-item",
    "note_item",
    "noteitem",
    "card",
    "item",
    "feed",
    "post",
    "result",
    "cover",
];
const CONTAINER_TAGS: &[&str] = &["section", "article", "li"];
const SUBSTANTIAL_TEXT_CHARS: usize = 10;

/// 最多保留的标签数量
pub const MAX_TAGS: usize = 8;

/// 元素的文本，空白合并为单个空格
pub fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

pub fn parent_element<'a>(el: ElementRef<'a>) -> Option<ElementRef<'a>> {
    el.parent().and_then(ElementRef::wrap)
}

/// 规范化图片地址，协议相对地址补全为 https
pub fn normalize_image_url(url: &str) -> String {
    let url = url.trim();
    if let Some(rest) = url.strip_prefix("//") {
        format!("https://{}", rest)
    } else {
        url.to_string()
    }
}

/// 是否为笔记图片：来自允许的图片域名，且不是头像、图标等
pub fn is_note_image(url: &str, hosts: &[String]) -> bool {
    let lower = url.to_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("//"))
    {
        return false;
    }
    hosts.iter().any(|h| lower.contains(&h.to_lowercase()))
        && !IMAGE_REJECT.iter().any(|r| lower.contains(r))
}

/// 标题：依次尝试标题类选择器，长度 4 到 199 个字符，截断到 100
pub fn extract_title(container: ElementRef<'_>) -> Option<String> {
    for selector in TITLE_SELECTORS.iter() {
        for el in container.select(selector) {
            let text = element_text(el);
            let len = text.chars().count();
            if len > 3 && len < 200 {
                return Some(truncate_chars(&text, 100));
            }
        }
    }
    container
        .value()
        .attr("title")
        .map(str::trim)
        .filter(|t| t.chars().count() > 3)
        .map(|t| truncate_chars(t, 100))
}

/// 摘要：不同于标题且长于 5 个字符，截断到 200
pub fn extract_summary(container: ElementRef<'_>, title: Option<&str>) -> Option<String> {
    for selector in SUMMARY_SELECTORS.iter() {
        for el in container.select(selector) {
            let text = element_text(el);
            if text.chars().count() > 5 && Some(text.as_str()) != title {
                return Some(truncate_chars(&text, 200));
            }
        }
    }
    None
}

/// 作者：去掉尾部的计数和分隔符
pub fn extract_author(container: ElementRef<'_>) -> Option<String> {
    for selector in AUTHOR_SELECTORS.iter() {
        for el in container.select(selector) {
            let class = el.value().attr("class").unwrap_or("").to_lowercase();
            if ["avatar", "img", "icon"].iter().any(|c| class.contains(c)) {
                continue;
            }
            let text = element_text(el);
            let cleaned = AUTHOR_TRAILER_RE.replace(&text, "").trim().to_string();
            let len = cleaned.chars().count();
            if len > 0 && len <= 30 {
                return Some(cleaned);
            }
        }
    }
    None
}

/// 图片：`img` 的各类地址属性和背景图，去重后保持文档顺序
pub fn extract_images(container: ElementRef<'_>, hosts: &[String]) -> Vec<String> {
    let mut images: Vec<String> = Vec::new();
    let mut push = |raw: &str| {
        if is_note_image(raw, hosts) {
            let url = normalize_image_url(raw);
            if !images.contains(&url) {
                images.push(url);
            }
        }
    };

    for img in std::iter::once(container)
        .filter(|el| el.value().name() == "img")
        .chain(container.select(&IMG_SELECTOR))
    {
        for attr in IMAGE_ATTRIBUTES {
            if let Some(value) = img.value().attr(attr) {
                push(value);
            }
        }
    }
    for el in container.select(&STYLED_SELECTOR) {
        if let Some(style) = el.value().attr("style") {
            for caps in BACKGROUND_URL_RE.captures_iter(style) {
                push(&caps[1]);
            }
        }
    }
    images
}

pub fn has_note_image(container: ElementRef<'_>, hosts: &[String]) -> bool {
    !extract_images(container, hosts).is_empty()
}

/// 标签是否有效：2 到 20 个字符、非纯数字、不在排除列表中
pub fn is_valid_tag(tag: &str) -> bool {
    let len = tag.chars().count();
    (2..=20).contains(&len)
        && !tag.chars().all(|c| c.is_ascii_digit())
        && !TAG_EXCLUDED.contains(&tag)
        && TAG_CHARS_RE.is_match(tag)
}

/// 从文本中识别 `#话题`、`【标签】`、`「标签」`
pub fn tags_from_text(text: &str) -> Vec<String> {
    let mut tags = Vec::new();
    for re in TAG_TEXT_RES.iter() {
        for caps in re.captures_iter(text) {
            push_tag(&mut tags, &caps[1]);
        }
    }
    tags
}

fn push_tag(tags: &mut Vec<String>, raw: &str) {
    if tags.len() >= MAX_TAGS {
        return;
    }
    let tag = raw.trim().trim_start_matches('#').trim().to_string();
    if is_valid_tag(&tag) && !tags.contains(&tag) {
        tags.push(tag);
    }
}

/// 标签：先取标签类元素，再补充文本中的话题标记，最多 8 个
pub fn extract_tags(container: ElementRef<'_>) -> Vec<String> {
    let mut tags = Vec::new();
    for selector in TAG_SELECTORS.iter() {
        for el in container.select(selector) {
            push_tag(&mut tags, &element_text(el));
        }
    }
    for tag in tags_from_text(&element_text(container)) {
        push_tag(&mut tags, &tag);
    }
    tags
}

/// 互动数据：`data-*` 属性上的数字带标签，计数元素的文本按上下文判断
///
/// 没有计数元素时只接受正文中带标签的数字，标题里的年份、型号不算互动数据。
pub fn extract_engagement(container: ElementRef<'_>) -> Engagement {
    let mut hints = Vec::new();
    let labelled_attrs = [
        ("data-likes", EngagementKind::Likes),
        ("data-like-count", EngagementKind::Likes),
        ("data-comments", EngagementKind::Comments),
        ("data-comment-count", EngagementKind::Comments),
        ("data-collects", EngagementKind::Collects),
        ("data-collect-count", EngagementKind::Collects),
        ("data-views", EngagementKind::Views),
        ("data-view-count", EngagementKind::Views),
    ];
    // descendants 包含容器自身
    for el in container.descendants().filter_map(ElementRef::wrap) {
        for (attr, kind) in labelled_attrs {
            if let Some(value) = el.value().attr(attr).and_then(parse_count) {
                hints.push(NumberHint::labelled(value, kind));
            }
        }
    }

    let count_text: Vec<String> = container
        .select(&COUNT_SELECTOR)
        .filter(|el| !el.select(&COUNT_SELECTOR).any(|_| true))
        .map(|el| format!("{} {}", element_text(el), class_trail(el, container)))
        .collect();
    if count_text.is_empty() {
        hints.extend(
            scan_numbers(&element_text(container))
                .into_iter()
                .filter(|hint| hint.label.is_some()),
        );
    } else {
        for text in &count_text {
            hints.extend(scan_numbers(text));
        }
    }
    disambiguate_engagement(&hints)
}

/// 计数元素及其祖先（不含容器）的类名，用作标签上下文
fn class_trail(el: ElementRef<'_>, container: ElementRef<'_>) -> String {
    let mut classes = Vec::new();
    let mut current = Some(el);
    while let Some(node) = current {
        if node.id() == container.id() {
            break;
        }
        if let Some(class) = node.value().attr("class") {
            classes.push(class.to_string());
        }
        current = parent_element(node);
    }
    classes.join(" ")
}

/// 从锚点向上查找最小的条目容器
///
/// 在限定深度内，类名或标签提示优先；其次是含笔记图片的祖先；最后是文本足够长的祖先。
pub fn find_container<'a>(
    anchor: ElementRef<'a>,
    max_depth: usize,
    hosts: &[String],
) -> ElementRef<'a> {
    let mut with_image = None;
    let mut with_text = None;
    let mut current = anchor;
    for _ in 0..max_depth {
        let Some(parent) = parent_element(current) else {
            break;
        };
        current = parent;

        let name = current.value().name();
        if name == "body" || name == "html" {
            break;
        }
        let class = current.value().attr("class").unwrap_or("").to_lowercase();
        if CONTAINER_HINTS.iter().any(|h| class.contains(h)) || CONTAINER_TAGS.contains(&name) {
            return current;
        }
        if with_image.is_none() && has_note_image(current, hosts) {
            with_image = Some(current);
        }
        if with_text.is_none() && element_text(current).chars().count() > SUBSTANTIAL_TEXT_CHARS
        {
            with_text = Some(current);
        }
    }
    with_image.or(with_text).unwrap_or(anchor)
}

/// 用容器内容填充条目字段
pub fn fill_fields(item: &mut CandidateItem, container: ElementRef<'_>, hosts: &[String]) {
    let title = extract_title(container).or_else(|| {
        let text = element_text(container);
        (text.chars().count() > 3).then(|| truncate_chars(&text, 100))
    });
    item.summary = extract_summary(container, title.as_deref())
        .or_else(|| title.clone())
        .unwrap_or_default();
    item.title = title.unwrap_or_default();
    item.author = extract_author(container).unwrap_or_default();
    item.images = extract_images(container, hosts);
    item.cover_image = item.images.first().cloned();
    item.tags = extract_tags(container);
    item.engagement = extract_engagement(container);
}
