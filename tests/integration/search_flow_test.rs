// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use notecrawl::config::settings::{ExtractionSettings, SiteSettings};
use notecrawl::domain::models::candidate::Strictness;
use notecrawl::domain::models::query::{query_key, Query};
use notecrawl::domain::models::session_context::SessionContext;
use notecrawl::domain::models::session_state::VerificationStatus;
use notecrawl::domain::repositories::storage_repository::StorageRepository;
use notecrawl::domain::services::extraction::ExtractionPipeline;
use notecrawl::domain::services::result_curator::curate;
use notecrawl::domain::services::search_service::{SearchService, SearchStatus};
use notecrawl::engines::replay_session::{ReplayPage, ReplaySession};
use notecrawl::infrastructure::cache::search_cache::{artifact_key, entry_key};
use notecrawl::infrastructure::cache::SearchCache;
use notecrawl::infrastructure::storage::InMemoryStorage;

use super::helpers::{identity, test_settings, watch_listing, HOME, RECOMMEND};

fn service(storage: &InMemoryStorage) -> SearchService {
    let settings = test_settings();
    let shared = Arc::new(storage.clone());
    let cache = Arc::new(SearchCache::new(shared.clone(), settings.search.cache_ttl()));
    SearchService::from_settings(&settings, shared, cache)
}

/// 推荐页之后经过一次恢复到达结果页
///
/// 最终状态为已校验；最多 5 条；中等严格度保留包含“手表”的条目；
/// 缓存以 hash("手表") 为键写入非空记录
#[tokio::test]
async fn watch_search_recovers_from_recommendation_page() {
    let storage = InMemoryStorage::new();
    let service = service(&storage);
    let session = ReplaySession::blank()
        .with_navigation(ReplayPage::new(HOME, RECOMMEND))
        .with_navigation(ReplayPage::new("", watch_listing()));
    let query = Query::new("手表", 5, true, 100).unwrap();
    let ctx = SessionContext::new("flow");

    let outcome = service.search(&session, &query, &ctx).await.unwrap();

    let state = outcome.session_state.clone().unwrap();
    assert_eq!(state.verification_status, VerificationStatus::Verified);
    assert_eq!(outcome.status, SearchStatus::Verified);
    assert!(outcome.count <= 5);
    assert!(outcome.count > 0);
    assert!(outcome.items.iter().all(|v| v.item.title.contains("手表")));

    let key = query_key("手表");
    let raw = storage
        .get(&entry_key(&key))
        .await
        .unwrap()
        .expect("cache entry written");
    let entry: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(entry["keyword"], "手表");
    assert_eq!(
        entry["items"].as_array().map(Vec::len),
        Some(outcome.count)
    );
    assert!(storage
        .exists(&artifact_key(&key))
        .await
        .unwrap());
}

/// 严格度越低保留的条目越多
#[tokio::test]
async fn strictness_tiers_are_ordered() {
    let session = ReplaySession::new(ReplayPage::new(
        "https://www.xiaohongshu.com/search_result?keyword=%E6%89%8B%E8%A1%A8",
        watch_listing(),
    ));
    let pipeline = ExtractionPipeline::new(&ExtractionSettings::default(), &SiteSettings::default());
    let ctx = SessionContext::new("tiers");
    let items = pipeline.extract(&session, 20, &ctx).await;
    assert_eq!(items.len(), 6);

    let query = Query::new("手表", 20, true, 100).unwrap();
    let low = curate(items.clone(), &query, Strictness::Low).len();
    let medium = curate(items.clone(), &query, Strictness::Medium).len();
    let high = curate(items, &query, Strictness::High).len();

    assert!(low >= medium);
    assert!(medium >= high);
    assert_eq!(high, 5);
}

/// 链接策略读取标题、令牌、封面与互动数据
#[tokio::test]
async fn pipeline_reads_engagement_and_tokens() {
    let session = ReplaySession::new(ReplayPage::new(
        "https://www.xiaohongshu.com/search_result?keyword=%E6%89%8B%E8%A1%A8",
        watch_listing(),
    ));
    let pipeline = ExtractionPipeline::new(&ExtractionSettings::default(), &SiteSettings::default());
    let items = pipeline
        .extract(&session, 3, &SessionContext::new("e"))
        .await;

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].identity, identity(1));
    assert!(items[0].engagement.total() > 0);
    assert_eq!(items[0].auth_token.as_deref(), Some("ABtoken1xyz"));
    assert_eq!(items[0].title, "入门机械手表推荐");
    assert!(items[0].cover_image.is_some());
}

/// 空结果不写缓存，且旧记录被删除
#[tokio::test]
async fn empty_result_never_reaches_cache() {
    let storage = InMemoryStorage::new();
    let service = service(&storage);
    let key = query_key("手表");
    storage
        .save(&artifact_key(&key), b"<html>stale</html>")
        .await
        .unwrap();

    let session = ReplaySession::blank().with_route(
        "search_result",
        ReplayPage::new("", r#"<html><title>手表 - 小红书</title><div class="feeds-page"></div></html>"#),
    );
    let query = Query::new("手表", 5, true, 100).unwrap();
    let outcome = service
        .search(&session, &query, &SessionContext::new("empty"))
        .await
        .unwrap();

    assert_eq!(outcome.count, 0);
    assert!(service.cache().load(&key).await.is_none());
    assert!(!storage
        .exists(&artifact_key(&key))
        .await
        .unwrap());
}
