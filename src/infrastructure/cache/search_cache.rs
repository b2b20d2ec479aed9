// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::models::candidate::ValidatedItem;
use crate::domain::repositories::storage_repository::{StorageError, StorageRepository};
use crate::infrastructure::cache::results_page::render_results_page;

/// 持久化的缓存记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub query_key: String,
    pub keyword: String,
    pub timestamp: DateTime<Utc>,
    pub items: Vec<ValidatedItem>,
}

/// 缓存统计信息
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub purges: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    purges: AtomicU64,
}

pub fn entry_key(query_key: &str) -> String {
    format!("cache/search_{}.json", query_key)
}

pub fn artifact_key(query_key: &str) -> String {
    format!("results/search_{}.html", query_key)
}

/// 搜索结果缓存
///
/// 只写入非空结果；记录与预渲染结果页同时写入、同时删除。
/// 记录为空或无法解析时直接删除，而不仅仅视为过期。
pub struct SearchCache {
    storage: Arc<dyn StorageRepository>,
    ttl: Duration,
    counters: Counters,
}

impl SearchCache {
    pub fn new(storage: Arc<dyn StorageRepository>, ttl: Duration) -> Self {
        Self {
            storage,
            ttl,
            counters: Counters::default(),
        }
    }

    /// 读取未过期的缓存结果
    pub async fn load(&self, query_key: &str) -> Option<Vec<ValidatedItem>> {
        self.load_at(query_key, Utc::now()).await
    }

    /// 以指定时间判断是否过期
    pub async fn load_at(&self, query_key: &str, now: DateTime<Utc>) -> Option<Vec<ValidatedItem>> {
        let raw = match self.storage.get(&entry_key(query_key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return self.miss(),
            Err(e) => {
                warn!("Failed to read cache entry {}: {}", query_key, e);
                return self.miss();
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Unreadable cache entry {}, purging: {}", query_key, e);
                self.purge(query_key).await;
                return self.miss();
            }
        };
        if entry.items.is_empty() {
            warn!("Empty cache entry {}, purging", query_key);
            self.purge(query_key).await;
            return self.miss();
        }

        let age = now.signed_duration_since(entry.timestamp);
        let expired = age
            .to_std()
            .map(|age| age > self.ttl)
            .unwrap_or(false);
        if expired {
            debug!(key = query_key, age_secs = age.num_seconds(), "Cache entry expired");
            return self.miss();
        }

        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        info!(key = query_key, items = entry.items.len(), "Cache hit");
        Some(entry.items)
    }

    /// 写入缓存
    ///
    /// 空结果不写入，同时删除该键已有的记录和结果页。返回是否写入。
    pub async fn store(
        &self,
        query_key: &str,
        keyword: &str,
        items: &[ValidatedItem],
    ) -> Result<bool, StorageError> {
        self.store_at(query_key, keyword, items, Utc::now()).await
    }

    pub async fn store_at(
        &self,
        query_key: &str,
        keyword: &str,
        items: &[ValidatedItem],
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        if items.is_empty() {
            info!(key = query_key, "Refusing to cache empty result, purging stale entry");
            self.purge(query_key).await;
            return Ok(false);
        }

        let entry = CacheEntry {
            query_key: query_key.to_string(),
            keyword: keyword.to_string(),
            timestamp: now,
            items: items.to_vec(),
        };
        let payload =
            serde_json::to_vec_pretty(&entry).map_err(|e| StorageError::Other(e.to_string()))?;
        self.storage.save(&entry_key(query_key), &payload).await?;

        let page = render_results_page(keyword, items, now);
        if let Err(e) = self.storage.save(&artifact_key(query_key), page.as_bytes()).await {
            // 结果页与记录必须同时存在
            warn!("Failed to write results page for {}: {}", query_key, e);
            self.purge(query_key).await;
            return Err(e);
        }

        self.counters.stores.fetch_add(1, Ordering::Relaxed);
        info!(key = query_key, items = items.len(), "Cached search result");
        Ok(true)
    }

    /// 删除记录和结果页
    pub async fn invalidate(&self, query_key: &str) {
        self.purge(query_key).await;
    }

    /// 读取预渲染结果页
    pub async fn result_html(&self, query_key: &str) -> Result<Option<String>, StorageError> {
        let raw = self.storage.get(&artifact_key(query_key)).await?;
        Ok(raw.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stores: self.counters.stores.load(Ordering::Relaxed),
            purges: self.counters.purges.load(Ordering::Relaxed),
        }
    }

    fn miss<T>(&self) -> Option<T> {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    async fn purge(&self, query_key: &str) {
        for key in [entry_key(query_key), artifact_key(query_key)] {
            if let Err(e) = self.storage.delete(&key).await {
                warn!("Failed to delete {}: {}", key, e);
            }
        }
        self.counters.purges.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::candidate::{CandidateItem, ExtractionMethod, RelevanceVerdict};
    use crate::domain::models::query::query_key;
    use crate::infrastructure::storage::InMemoryStorage;

    fn items(n: usize) -> Vec<ValidatedItem> {
        (0..n)
            .map(|i| ValidatedItem {
                item: CandidateItem::new(
                    format!("note{}", i),
                    format!("https://x/note{}", i),
                    ExtractionMethod::AnchorLinks,
                ),
                verdict: RelevanceVerdict::Pass,
            })
            .collect()
    }

    fn cache(storage: &InMemoryStorage) -> SearchCache {
        SearchCache::new(Arc::new(storage.clone()), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let storage = InMemoryStorage::new();
        let cache = cache(&storage);
        let key = query_key("手表");

        assert!(cache.store(&key, "手表", &items(3)).await.unwrap());
        let loaded = cache.load(&key).await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(cache.result_html(&key).await.unwrap().is_some());
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_empty_store_purges_record_and_artifact() {
        let storage = InMemoryStorage::new();
        let cache = cache(&storage);
        let key = query_key("手表");

        cache.store(&key, "手表", &items(2)).await.unwrap();
        assert!(!cache.store(&key, "手表", &[]).await.unwrap());

        assert!(cache.load(&key).await.is_none());
        assert!(!storage.exists(&entry_key(&key)).await.unwrap());
        assert!(!storage.exists(&artifact_key(&key)).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss_but_kept() {
        let storage = InMemoryStorage::new();
        let cache = cache(&storage);
        let key = query_key("手表");
        let written = Utc::now();

        cache.store_at(&key, "手表", &items(1), written).await.unwrap();
        let later = written + chrono::Duration::seconds(3601);
        assert!(cache.load_at(&key, later).await.is_none());
        assert!(storage.exists(&entry_key(&key)).await.unwrap());
        assert!(cache
            .load_at(&key, written + chrono::Duration::seconds(10))
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_corrupt_or_empty_entry_is_deleted() {
        let storage = InMemoryStorage::new();
        let cache = cache(&storage);

        let corrupt = query_key("坏数据");
        storage.save(&entry_key(&corrupt), b"{not json").await.unwrap();
        storage.save(&artifact_key(&corrupt), b"<html>").await.unwrap();
        assert!(cache.load(&corrupt).await.is_none());
        assert!(!storage.exists(&entry_key(&corrupt)).await.unwrap());
        assert!(!storage.exists(&artifact_key(&corrupt)).await.unwrap());

        let empty = query_key("空");
        let entry = CacheEntry {
            query_key: empty.clone(),
            keyword: "空".into(),
            timestamp: Utc::now(),
            items: Vec::new(),
        };
        storage
            .save(&entry_key(&empty), &serde_json::to_vec(&entry).unwrap())
            .await
            .unwrap();
        assert!(cache.load(&empty).await.is_none());
        assert!(!storage.exists(&entry_key(&empty)).await.unwrap());
        assert_eq!(cache.stats().purges, 2);
    }
}
