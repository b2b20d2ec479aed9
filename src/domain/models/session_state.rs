// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// 页面校验状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Unverified,
    Verified,
    Blocked,
    ChallengePending,
}

/// 单次查询解析期间的会话状态
///
/// 仅由访问恢复控制器修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub current_url: String,
    pub last_verified_url: Option<String>,
    pub verification_status: VerificationStatus,
    /// 已执行的恢复阶梯外层轮数
    pub attempt_count: u32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            current_url: String::new(),
            last_verified_url: None,
            verification_status: VerificationStatus::Unverified,
            attempt_count: 0,
        }
    }
}

impl SessionState {
    pub fn is_verified(&self) -> bool {
        self.verification_status == VerificationStatus::Verified
    }

    pub(crate) fn mark_verified(&mut self, url: &str) {
        self.current_url = url.to_string();
        self.last_verified_url = Some(url.to_string());
        self.verification_status = VerificationStatus::Verified;
    }
}
