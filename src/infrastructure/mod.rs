// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 包含的子模块：
/// - 缓存（cache）：搜索结果缓存与预渲染结果页
/// - 凭据（credentials）：Cookie 凭据文件的读写
/// - 存储（storage）：本地文件与内存存储实现
///
/// 基础设施层依赖于领域层的抽象接口。
pub mod cache;
pub mod credentials;
pub mod storage;
