// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;

/// 详情任务重试策略
///
/// 第 n 次失败后的等待时间为 `n × backoff`（线性退避），
/// 可选抖动只会拉长等待，不会缩短。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（包含首次）
    pub max_attempts: u32,
    /// 单位退避时间
    pub backoff: Duration,
    /// 最大退避时间
    pub max_backoff: Duration,
    /// 抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
    /// 是否启用抖动
    pub enable_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            jitter_factor: 0.0,
            enable_jitter: false,
        }
    }
}

impl RetryPolicy {
    /// 创建线性退避策略
    pub fn linear(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
            ..Self::default()
        }
    }

    /// 设置抖动因子，0 表示关闭抖动
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self.enable_jitter = self.jitter_factor > 0.0;
        self
    }

    /// 不等待的策略，测试中使用
    pub fn immediate(max_attempts: u32) -> Self {
        Self::linear(max_attempts, Duration::ZERO)
    }

    /// 计算第 `attempt` 次失败后的退避时间
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let base = self.backoff.as_secs_f64() * attempt as f64;
        let capped = base.min(self.max_backoff.as_secs_f64());

        let final_backoff = if self.enable_jitter && capped > 0.0 {
            let jitter = rand::random_range(0.0..=capped * self.jitter_factor);
            capped + jitter
        } else {
            capped
        };

        Duration::from_secs_f64(final_backoff)
    }

    /// 已经尝试 `attempt` 次后是否还应继续
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_backoff_linear() {
        let policy = RetryPolicy::linear(3, Duration::from_secs(2));

        assert_eq!(policy.calculate_backoff(1), Duration::from_secs(2));
        assert_eq!(policy.calculate_backoff(2), Duration::from_secs(4));
        assert_eq!(policy.calculate_backoff(3), Duration::from_secs(6));
    }

    #[test]
    fn test_calculate_backoff_max_limit() {
        let mut policy = RetryPolicy::linear(50, Duration::from_secs(10));
        policy.max_backoff = Duration::from_secs(25);

        assert_eq!(policy.calculate_backoff(10), Duration::from_secs(25));
    }

    #[test]
    fn test_jitter_never_shortens() {
        let policy = RetryPolicy::linear(3, Duration::from_secs(1)).with_jitter(0.5);
        assert!(policy.enable_jitter);

        for _ in 0..20 {
            let backoff = policy.calculate_backoff(2);
            assert!(backoff >= Duration::from_secs(2));
            assert!(backoff <= Duration::from_secs(3));
        }
    }

    #[test]
    fn test_zero_jitter_disables_it() {
        let policy = RetryPolicy::linear(3, Duration::from_secs(1)).with_jitter(0.0);
        assert!(!policy.enable_jitter);
        assert_eq!(policy.calculate_backoff(2), Duration::from_secs(2));
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();

        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
    }

    #[test]
    fn test_immediate_has_zero_backoff() {
        let policy = RetryPolicy::immediate(4);
        assert_eq!(policy.calculate_backoff(3), Duration::ZERO);
    }
}
