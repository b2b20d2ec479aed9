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

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use notecrawl::engines::replay_session::ReplaySessionFactory;
use notecrawl::presentation::routes;
use tower::util::ServiceExt;

use super::helpers::create_test_app;

/// 健康检查测试
///
/// 验证健康检查端点是否正常工作
#[tokio::test]
async fn health_check_works() {
    let app = create_test_app(ReplaySessionFactory::new());
    let router = routes::routes(app.state.clone());

    let response = router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

/// 未知路由返回 404
#[tokio::test]
async fn unknown_route_returns_404() {
    let app = create_test_app(ReplaySessionFactory::new());
    let router = routes::routes(app.state.clone());

    let response = router
        .oneshot(
            Request::builder()
                .uri("/v1/scrape")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
