// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::ChallengeSettings;

/// 人机验证页面识别结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    /// 需要人工完成的验证
    Interactive,
    /// 请求过于频繁，只能等待
    RateLimited,
}

/// 检测当前页面是否为验证页
///
/// 匹配前先去掉关键词本身，关键词中包含“验证”之类的词时不会误判。
pub fn detect_challenge(
    settings: &ChallengeSettings,
    url: &str,
    markup: &str,
    keyword: &str,
) -> Option<ChallengeKind> {
    let lower = without_keyword(&markup.to_lowercase(), keyword);
    if settings
        .rate_limit_markers
        .iter()
        .any(|m| lower.contains(&m.to_lowercase()))
    {
        return Some(ChallengeKind::RateLimited);
    }

    let in_content = settings
        .content_markers
        .iter()
        .any(|m| lower.contains(&m.to_lowercase()));

    if challenge_in_url(settings, url, keyword) || in_content {
        Some(ChallengeKind::Interactive)
    } else {
        None
    }
}

/// 地址本身是否指向验证页
pub fn challenge_in_url(settings: &ChallengeSettings, url: &str, keyword: &str) -> bool {
    let decoded = urlencoding::decode(&url.replace('+', " "))
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| url.to_string());
    let url_lower = without_keyword(&decoded.to_lowercase(), keyword);
    settings
        .url_markers
        .iter()
        .any(|m| url_lower.contains(&m.to_lowercase()))
}

fn without_keyword(text: &str, keyword: &str) -> String {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        text.to_string()
    } else {
        text.replace(&keyword, " ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_captcha_url() {
        let settings = ChallengeSettings::default();
        assert_eq!(
            detect_challenge(
                &settings,
                "https://www.xiaohongshu.com/website-login/captcha?redirect=x",
                "<html></html>",
                "手表"
            ),
            Some(ChallengeKind::Interactive)
        );
    }

    #[test]
    fn test_rate_limit_takes_precedence() {
        let settings = ChallengeSettings::default();
        assert_eq!(
            detect_challenge(&settings, "https://x.com/captcha", "<p>验证过于频繁，请稍后重试</p>", "手表"),
            Some(ChallengeKind::RateLimited)
        );
    }

    #[test]
    fn test_normal_page_is_not_challenge() {
        let settings = ChallengeSettings::default();
        assert_eq!(
            detect_challenge(
                &settings,
                "https://www.xiaohongshu.com/search_result?keyword=a",
                "<div class='feeds-page'>ok</div>",
                "a"
            ),
            None
        );
    }

    #[test]
    fn test_keyword_containing_marker_is_not_challenge() {
        let settings = ChallengeSettings::default();
        let url = "https://www.xiaohongshu.com/search_result?keyword=%E6%BB%91%E5%9D%97%E9%AA%8C%E8%AF%81";
        let markup = "<title>滑块验证 - 小红书</title><div class='feeds-page'>滑块验证教程</div>";
        assert_eq!(detect_challenge(&settings, url, markup, "滑块验证"), None);
        assert!(!challenge_in_url(&settings, url, "滑块验证"));

        let captcha = "https://www.xiaohongshu.com/search_result?keyword=captcha";
        assert!(!challenge_in_url(&settings, captcha, "captcha"));
        assert!(challenge_in_url(
            &settings,
            "https://www.xiaohongshu.com/website-login/captcha?redirect=x",
            "手表"
        ));
    }
}
