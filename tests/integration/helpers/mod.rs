// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use axum_test::TestServer;
use notecrawl::config::settings::{PacingSettings, RecoverySettings, Settings};
use notecrawl::domain::services::search_service::SearchService;
use notecrawl::engines::replay_session::{ReplayPage, ReplaySessionFactory};
use notecrawl::infrastructure::cache::SearchCache;
use notecrawl::infrastructure::storage::InMemoryStorage;
use notecrawl::presentation::routes;
use notecrawl::presentation::state::AppState;
use notecrawl::workers::BatchScheduler;

pub const HOME: &str = "https://www.xiaohongshu.com/explore";
pub const RECOMMEND: &str =
    r#"<html><title>小红书</title><body><div id="homefeed_recommend">首页推荐</div></body></html>"#;

pub fn identity(i: usize) -> String {
    format!("6601a2b3c4d5e6f7a8b9c0{:02}", i)
}

/// 搜索结果页中的单个笔记卡片
pub fn note_card(i: usize, title: &str, likes: &str, with_cover: bool) -> String {
    let cover = if with_cover {
        format!(r#"<img src="https://sns-webpic-qc.xhscdn.com/202401/cover{i}.jpg">"#)
    } else {
        String::new()
    };
    let count = if likes.is_empty() {
        String::new()
    } else {
        format!(r#"<span class="like-wrapper"><span class="count">{likes}</span></span>"#)
    };
    format!(
        r#"<section class="note-item" data-index="{i}">
            <a class="cover" href="/search_result/{id}?xsec_token=ABtoken{i}xyz&xsec_source=">{cover}</a>
            <div class="footer">
                <a class="title"><span>{title}</span></a>
                <div class="card-bottom-wrapper">
                    <a class="author"><span class="name">表友</span></a>
                    {count}
                </div>
            </div>
        </section>"#,
        id = identity(i)
    )
}

/// 关键词“手表”的搜索结果页
pub fn watch_listing() -> String {
    let cards = [
        note_card(1, "入门机械手表推荐", "1.2万", true),
        note_card(2, "手表表带怎么选", "856", true),
        note_card(3, "周末穿搭分享", "", false),
        note_card(4, "通勤手表分享", "2,301", true),
        note_card(5, "我的第一块手表", "77", true),
        note_card(6, "手表收纳盒开箱", "5", true),
    ]
    .join("\n");
    format!(
        r#"<html><head><title>手表 - 小红书搜索</title></head><body>
        <div class="feeds-page"><div class="feeds-container">{cards}</div></div></body></html>"#
    )
}

pub fn detail_page(i: usize) -> ReplayPage {
    ReplayPage::new(
        "",
        format!(
            r#"<html><head><title>笔记{i} - 小红书</title></head><body>
            <div class="author-wrapper"><span class="username">表友{i}</span></div>
            <div id="detail-title">手表笔记第{i}篇</div>
            <div id="detail-desc">这块表戴了半年，说说真实感受和保养心得 #手表 #机械表</div>
            <div class="note-slider"><img src="https://sns-webpic-qc.xhscdn.com/202401/detail{i}.jpg"></div>
            </body></html>"#
        ),
    )
}

/// 测试用配置：无等待、无随机节奏
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.recovery = RecoverySettings::immediate();
    settings.batch.retry_backoff_ms = 0;
    settings.batch.readiness_min_len = 100;
    settings.batch.readiness_timeout_secs = 1;
    settings.batch.pacing = PacingSettings::disabled();
    settings
}

/// 站点回放：搜索结果页与各详情页
pub fn site_factory() -> ReplaySessionFactory {
    let mut factory =
        ReplaySessionFactory::new().with_route("search_result?keyword", ReplayPage::new("", watch_listing()));
    for i in 1..=6 {
        factory = factory.with_route(identity(i), detail_page(i));
    }
    factory
}

#[allow(dead_code)]
pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub storage: InMemoryStorage,
    pub factory: ReplaySessionFactory,
}

pub fn create_test_app(factory: ReplaySessionFactory) -> TestApp {
    let settings = Arc::new(test_settings());
    let storage = InMemoryStorage::new();
    let shared_storage = Arc::new(storage.clone());

    let cache = Arc::new(SearchCache::new(
        shared_storage.clone(),
        settings.search.cache_ttl(),
    ));
    let scheduler = BatchScheduler::new(
        Arc::new(factory.clone()),
        shared_storage.clone(),
        &settings.batch,
        &settings.site,
    );
    let search = SearchService::from_settings(&settings, shared_storage.clone(), cache);
    let state = Arc::new(AppState::new(
        settings,
        search,
        scheduler,
        shared_storage,
        Arc::new(factory.clone()),
    ));

    let server = TestServer::new(routes::routes(state.clone())).expect("test server");
    TestApp {
        server,
        state,
        storage,
        factory,
    }
}
