// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含系统的核心业务逻辑，包括：
/// - 领域模型（models）：查询、候选条目、详情任务等数据结构
/// - 仓库接口（repositories）：存储抽象接口
/// - 服务（services）：页面校验、访问恢复、提取与筛选
///
/// 领域层不依赖于具体的浏览器或存储实现。
pub mod models;
pub mod repositories;
pub mod services;
