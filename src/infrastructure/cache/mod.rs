// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 缓存模块
///
/// 搜索结果缓存与对应的预渲染结果页
pub mod results_page;
pub mod search_cache;

pub use search_cache::{CacheEntry, CacheStats, SearchCache};
