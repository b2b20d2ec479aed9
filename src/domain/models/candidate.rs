// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const PLACEHOLDER_TITLE: &str = "小红书笔记";
const PLACEHOLDER_SUMMARY: &str = "小红书笔记内容";
const ORDINAL_TITLE_PREFIX: &str = "小红书笔记 #";

/// 互动数据
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub likes: u64,
    pub comments: u64,
    pub collects: u64,
    pub views: u64,
}

impl Engagement {
    pub fn is_empty(&self) -> bool {
        self.likes == 0 && self.comments == 0 && self.collects == 0 && self.views == 0
    }

    pub fn total(&self) -> u64 {
        self.likes
            .saturating_add(self.comments)
            .saturating_add(self.collects)
            .saturating_add(self.views)
    }
}

/// 条目来源策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    AnchorLinks,
    AttributeIndex,
    ScriptEvaluation,
    StaticSnapshot,
}

impl ExtractionMethod {
    /// 脚本策略的互动数据是占位值，不能作为相关性证据
    pub fn is_low_confidence(&self) -> bool {
        matches!(self, ExtractionMethod::ScriptEvaluation)
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractionMethod::AnchorLinks => "anchor_links",
            ExtractionMethod::AttributeIndex => "attribute_index",
            ExtractionMethod::ScriptEvaluation => "script_evaluation",
            ExtractionMethod::StaticSnapshot => "static_snapshot",
        };
        f.write_str(name)
    }
}

/// 单个策略产出的候选条目，字段可能不完整
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub identity: String,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub engagement: Engagement,
    #[serde(default)]
    pub tags: Vec<String>,
    pub extraction_method: ExtractionMethod,
}

impl CandidateItem {
    pub fn new(
        identity: impl Into<String>,
        source_url: impl Into<String>,
        extraction_method: ExtractionMethod,
    ) -> Self {
        Self {
            identity: identity.into(),
            source_url: source_url.into(),
            auth_token: None,
            title: String::new(),
            summary: String::new(),
            author: String::new(),
            cover_image: None,
            images: Vec::new(),
            engagement: Engagement::default(),
            tags: Vec::new(),
            extraction_method,
        }
    }

    pub fn has_identity(&self) -> bool {
        !self.identity.trim().is_empty()
    }

    /// 可作为相关性证据的互动数据
    pub fn trusted_engagement(&self) -> Option<&Engagement> {
        if self.extraction_method.is_low_confidence() || self.engagement.is_empty() {
            None
        } else {
            Some(&self.engagement)
        }
    }

    /// 可作为相关性证据的文本字段，占位标题与摘要不计入
    pub fn content_fields(&self) -> Vec<&str> {
        let mut fields = Vec::with_capacity(3 + self.tags.len());
        if !self.has_placeholder_title() {
            fields.push(self.title.as_str());
        }
        if !self.has_placeholder_summary() {
            fields.push(self.summary.as_str());
        }
        fields.push(self.author.as_str());
        fields.extend(self.tags.iter().map(String::as_str));
        fields
    }

    /// 用于相关性判断的合并文本（小写）
    pub fn combined_text(&self) -> String {
        self.content_fields().join(" ").to_lowercase()
    }

    /// 标题是否为提取失败时生成的占位文本
    pub fn has_placeholder_title(&self) -> bool {
        let title = self.title.trim();
        if title.is_empty() || title == format!("{}_{}", PLACEHOLDER_TITLE, self.identity) {
            return true;
        }
        title
            .strip_prefix(ORDINAL_TITLE_PREFIX)
            .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
    }

    pub fn has_placeholder_summary(&self) -> bool {
        let summary = self.summary.trim();
        summary.is_empty() || summary == format!("{}_{}", PLACEHOLDER_SUMMARY, self.identity)
    }

    /// 标题或摘要为空时使用基于 ID 的占位文本
    pub fn fill_placeholders(&mut self) {
        if self.title.trim().is_empty() {
            self.title = format!("{}_{}", PLACEHOLDER_TITLE, self.identity);
        }
        if self.summary.trim().is_empty() {
            self.summary = format!("{}_{}", PLACEHOLDER_SUMMARY, self.identity);
        }
    }

    /// 静态快照策略按序号生成的占位标题
    pub fn ordinal_title(ordinal: usize) -> String {
        format!("{}{}", ORDINAL_TITLE_PREFIX, ordinal)
    }
}

/// 相关性过滤严格度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    Low,
    #[default]
    Medium,
    High,
}

impl FromStr for Strictness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Strictness::Low),
            "medium" => Ok(Strictness::Medium),
            "high" => Ok(Strictness::High),
            other => Err(format!("unknown strictness: {}", other)),
        }
    }
}

/// 相关性判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelevanceVerdict {
    Pass,
    Fail,
}

/// 附带相关性判定的条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedItem {
    #[serde(flatten)]
    pub item: CandidateItem,
    pub verdict: RelevanceVerdict,
}

impl ValidatedItem {
    pub fn passed(&self) -> bool {
        self.verdict == RelevanceVerdict::Pass
    }
}
