// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;
use std::time::Duration;

use notecrawl::config::settings::Settings;
use notecrawl::domain::repositories::storage_repository::StorageRepository;
use notecrawl::domain::services::search_service::SearchService;
use notecrawl::engines::chromium_session::{ChromiumBrowser, ChromiumSessionFactory};
use notecrawl::engines::traits::SessionFactory;
use notecrawl::infrastructure::cache::SearchCache;
use notecrawl::infrastructure::credentials::{load_credentials, save_credentials};
use notecrawl::infrastructure::storage::LocalStorage;
use notecrawl::presentation::routes;
use notecrawl::presentation::state::AppState;
use notecrawl::utils::telemetry;
use notecrawl::workers::BatchScheduler;
use tokio::net::TcpListener;
use tracing::{info, warn};

const EVICTION_INTERVAL: Duration = Duration::from_secs(300);

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动服务
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration
    let settings = Arc::new(Settings::new()?);

    // 2. Initialize logging
    telemetry::init_telemetry(settings.logging.json);
    info!("Starting notecrawl...");

    // 3. Storage and credentials
    let storage: Arc<dyn StorageRepository> =
        Arc::new(LocalStorage::new(settings.storage.local_path.clone()));
    let cookies = match &settings.browser.credentials_file {
        Some(path) => load_credentials(path).await?,
        None => Vec::new(),
    };

    // 4. Browser
    let browser = Arc::new(ChromiumBrowser::start(&settings.browser).await?);
    let factory: Arc<dyn SessionFactory> = Arc::new(ChromiumSessionFactory::new(
        browser,
        settings.browser.user_agent.clone(),
        cookies,
    ));
    info!("Browser ready");

    // 5. Services
    let cache = Arc::new(SearchCache::new(
        storage.clone(),
        settings.search.cache_ttl(),
    ));
    let scheduler = BatchScheduler::new(
        factory.clone(),
        storage.clone(),
        &settings.batch,
        &settings.site,
    );
    let mut search = SearchService::from_settings(&settings, storage.clone(), cache);
    if settings.batch.auto_submit {
        search = search.with_auto_batch(scheduler.clone());
    }

    let state = Arc::new(AppState::new(
        settings.clone(),
        search,
        scheduler,
        storage,
        factory,
    ));

    // 6. Evict idle session contexts
    let idle = Duration::from_secs(settings.debug.session_idle_secs);
    let eviction_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(EVICTION_INTERVAL);
        loop {
            ticker.tick().await;
            eviction_state.sessions.evict_idle(idle);
        }
    });

    // 7. Start HTTP server
    let app = routes::routes(state.clone());
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    // 8. Persist refreshed cookies and release the browser
    if let (Some(path), Some(cookies)) = (
        settings.browser.credentials_file.as_ref(),
        state.session_cookies().await,
    ) {
        if let Err(e) = save_credentials(path, &cookies).await {
            warn!("Failed to save credentials: {}", e);
        }
    }
    state.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}
