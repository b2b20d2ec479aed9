// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// HTTP请求处理器模块
///
/// 包含各个API端点的具体处理逻辑
/// 每个处理器只做参数转换，业务逻辑在领域服务中
pub mod batch_handler;
pub mod debug_handler;
pub mod search_handler;
