// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;

use chrono::{Local, Timelike};
use serde_json::json;
use tokio::time::sleep;
use tracing::debug;

use crate::config::settings::PacingSettings;
use crate::engines::traits::BrowserSession;

const SCROLL_SCRIPT: &str = "window.scrollBy(0, args.px); return window.scrollY;";

/// 随机节奏
///
/// 在详情页上模拟滚动和停留，并在任务之间插入随机延迟。
/// 只影响时序，不影响结果。
#[derive(Debug, Clone)]
pub struct Pacer {
    settings: PacingSettings,
}

impl Pacer {
    pub fn new(settings: PacingSettings) -> Self {
        Self { settings }
    }

    pub fn disabled() -> Self {
        Self::new(PacingSettings::disabled())
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// 按小时计算的延迟倍率：深夜放慢，午间略慢
    pub fn time_multiplier(&self, hour: u32) -> f64 {
        if hour >= 23 || hour < 6 {
            self.settings.night_multiplier
        } else if (12..14).contains(&hour) {
            self.settings.midday_multiplier
        } else {
            1.0
        }
    }

    /// 任务之间的随机延迟
    pub fn next_delay(&self, hour: u32) -> Duration {
        let (min, max) = ordered(self.settings.min_delay_ms, self.settings.max_delay_ms);
        let base = rand::random_range(min..=max) as f64;
        Duration::from_millis((base * self.time_multiplier(hour)) as u64)
    }

    /// 模拟浏览：若干次随机滚动后停留
    pub async fn browse(&self, session: &dyn BrowserSession) {
        if !self.settings.enabled {
            return;
        }
        let (min_steps, max_steps) =
            ordered(self.settings.scroll_steps_min, self.settings.scroll_steps_max);
        let (min_px, max_px) = ordered(self.settings.scroll_px_min, self.settings.scroll_px_max);

        let steps = rand::random_range(min_steps..=max_steps);
        for _ in 0..steps {
            let px = rand::random_range(min_px..=max_px);
            if let Err(e) = session.evaluate(SCROLL_SCRIPT, json!({ "px": px })).await {
                debug!("Scroll simulation failed: {}", e);
                break;
            }
            sleep(Duration::from_millis(rand::random_range(300..=1200))).await;
        }

        let (min_dwell, max_dwell) = ordered(self.settings.dwell_min_ms, self.settings.dwell_max_ms);
        sleep(Duration::from_millis(rand::random_range(min_dwell..=max_dwell))).await;
    }

    /// 任务间隔
    pub async fn pause(&self) {
        if !self.settings.enabled {
            return;
        }
        let delay = self.next_delay(Local::now().hour());
        debug!(delay_ms = delay.as_millis() as u64, "Pacing before next task");
        sleep(delay).await;
    }
}

fn ordered<T: PartialOrd>(a: T, b: T) -> (T, T) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::replay_session::ReplaySession;

    #[test]
    fn test_time_multiplier() {
        let pacer = Pacer::new(PacingSettings::default());
        assert_eq!(pacer.time_multiplier(23), 1.5);
        assert_eq!(pacer.time_multiplier(3), 1.5);
        assert_eq!(pacer.time_multiplier(12), 1.2);
        assert_eq!(pacer.time_multiplier(13), 1.2);
        assert_eq!(pacer.time_multiplier(14), 1.0);
        assert_eq!(pacer.time_multiplier(6), 1.0);
    }

    #[test]
    fn test_delay_stays_within_widened_range() {
        let pacer = Pacer::new(PacingSettings::default());
        for _ in 0..50 {
            let day = pacer.next_delay(10);
            assert!(day >= Duration::from_millis(3000) && day <= Duration::from_millis(8000));
            let night = pacer.next_delay(1);
            assert!(night >= Duration::from_millis(4500) && night <= Duration::from_millis(12000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_browse_scrolls_within_bounds() {
        let pacer = Pacer::new(PacingSettings::default());
        let session = ReplaySession::blank();
        let started = tokio::time::Instant::now();

        pacer.browse(&session).await;

        let scrolls = session.scripts().len();
        assert!((1..=3).contains(&scrolls));
        assert!(started.elapsed() >= Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_disabled_pacer_does_nothing() {
        let pacer = Pacer::disabled();
        let session = ReplaySession::blank();
        pacer.browse(&session).await;
        pacer.pause().await;
        assert!(session.scripts().is_empty());
    }
}
