// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 包含的服务：
/// - 页面校验（page_verifier）：判断当前页面是否为查询的搜索结果页
/// - 验证检测（challenge）：识别人机验证与访问频率限制页面
/// - 访问恢复（access_recovery）：把会话驱动到已校验的结果页
/// - 提取管道（extraction）：按优先级运行的四种提取策略
/// - 结果筛选（result_curator）：相关性判定、去重与排序
/// - 详情解析（detail_extractor）：解析单篇笔记详情页
/// - 搜索服务（search_service）：串联缓存与上述组件
pub mod access_recovery;
pub mod challenge;
pub mod detail_extractor;
pub mod extraction;
pub mod page_verifier;
pub mod result_curator;
pub mod search_service;
