// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::domain::models::candidate::ValidatedItem;

const STYLE: &str = "body{font-family:-apple-system,'PingFang SC',sans-serif;margin:24px;background:#fafafa}\
.grid{display:grid;grid-template-columns:repeat(auto-fill,minmax(240px,1fr));gap:16px}\
.card{background:#fff;border-radius:8px;padding:12px;box-shadow:0 1px 3px rgba(0,0,0,.1)}\
.card img{width:100%;border-radius:6px}.meta{color:#888;font-size:12px}.tag{color:#ff2442;margin-right:6px}";

/// 渲染搜索结果页
///
/// 所有来自页面的文本都经过转义
pub fn render_results_page(
    keyword: &str,
    items: &[ValidatedItem],
    generated_at: DateTime<Utc>,
) -> String {
    let mut cards = String::new();
    for (index, validated) in items.iter().enumerate() {
        let item = &validated.item;
        let cover = item
            .cover_image
            .as_deref()
            .map(|src| format!(r#"<img src="{}" loading="lazy">"#, encode_double_quoted_attribute(src)))
            .unwrap_or_default();
        let tags: String = item
            .tags
            .iter()
            .map(|t| format!(r#"<span class="tag">#{}</span>"#, encode_text(t)))
            .collect();
        cards.push_str(&format!(
            r#"<div class="card" data-index="{index}">{cover}<h3><a href="{url}" target="_blank">{title}</a></h3><p>{summary}</p><div>{tags}</div><p class="meta">{author} · 赞 {likes} · 评论 {comments} · 收藏 {collects}</p></div>"#,
            index = index + 1,
            cover = cover,
            url = encode_double_quoted_attribute(&item.source_url),
            title = encode_text(&item.title),
            summary = encode_text(&item.summary),
            tags = tags,
            author = encode_text(&item.author),
            likes = item.engagement.likes,
            comments = item.engagement.comments,
            collects = item.engagement.collects,
        ));
    }

    format!(
        r#"<!DOCTYPE html><html lang="zh-CN"><head><meta charset="utf-8"><title>{kw} - 搜索结果</title><style>{style}</style></head><body><h1>{kw}</h1><p class="meta">共 {count} 条 · 生成于 {time}</p><div class="grid">{cards}</div></body></html>"#,
        kw = encode_text(keyword),
        style = STYLE,
        count = items.len(),
        time = generated_at.format("%Y-%m-%d %H:%M:%S"),
        cards = cards,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::candidate::{CandidateItem, ExtractionMethod, RelevanceVerdict};

    #[test]
    fn test_escapes_page_text() {
        let mut item = CandidateItem::new("abc", "https://x/abc?a=1&b=\"2\"", ExtractionMethod::AnchorLinks);
        item.title = "<script>alert(1)</script>".into();
        item.tags = vec!["手表".into()];
        let items = vec![ValidatedItem {
            item,
            verdict: RelevanceVerdict::Pass,
        }];

        let html = render_results_page("手表 & 腕表", &items, Utc::now());
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("手表 &amp; 腕表"));
        assert!(html.contains("#手表"));
        assert!(html.contains("共 1 条"));
    }
}
