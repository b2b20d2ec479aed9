// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 批量详情抓取调度与任务之间的随机节奏
pub mod batch_scheduler;
pub mod pacing;

pub use batch_scheduler::BatchScheduler;
pub use pacing::Pacer;
