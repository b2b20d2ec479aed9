// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 请求 DTO 与参数校验
pub mod application;

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含核心业务实体、服务和仓库接口
pub mod domain;

/// 引擎模块
///
/// 浏览器会话抽象及其实现
pub mod engines;

/// 基础设施模块
///
/// 提供存储、缓存与凭据文件等外部集成
pub mod infrastructure;

/// 表示层模块
///
/// 处理HTTP请求和响应，包括路由和处理器
pub mod presentation;

/// 工具模块
///
/// 错误类型、重试策略与日志初始化
pub mod utils;

/// 工作器模块
///
/// 批量详情抓取与随机节奏
pub mod workers;
