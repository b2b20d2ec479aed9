// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了系统的核心业务实体，包括：
/// - 查询（query）：不可变的搜索请求及其缓存键
/// - 会话状态（session_state）：访问恢复控制器维护的页面校验状态
/// - 候选条目（candidate）：提取策略产出的笔记条目与相关性判定
/// - 详情（detail）：批量详情任务、详情记录与批次报告
/// - 会话上下文（session_context）：按会话隔离的调试事件日志
pub mod candidate;
pub mod detail;
pub mod query;
pub mod session_context;
pub mod session_state;
