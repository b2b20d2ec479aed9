// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use notecrawl::domain::models::candidate::{CandidateItem, ExtractionMethod};
use notecrawl::domain::repositories::storage_repository::StorageRepository;
use notecrawl::infrastructure::storage::InMemoryStorage;
use notecrawl::workers::batch_scheduler::{batch_dir, new_batch_id};
use notecrawl::workers::BatchScheduler;

use super::helpers::{identity, site_factory, test_settings};

fn items(n: usize) -> Vec<CandidateItem> {
    (1..=n)
        .map(|i| {
            let id = identity(i);
            let mut item = CandidateItem::new(
                id.clone(),
                format!("https://www.xiaohongshu.com/explore/{}", id),
                ExtractionMethod::AnchorLinks,
            );
            item.auth_token = Some(format!("ABtoken{}xyz", i));
            item
        })
        .collect()
}

fn scheduler(concurrency: usize, storage: &InMemoryStorage, fail: Option<usize>) -> BatchScheduler {
    let mut settings = test_settings();
    settings.batch.concurrency = concurrency;
    let mut factory = site_factory();
    if let Some(i) = fail {
        factory = factory.with_failing_route(identity(i));
    }
    BatchScheduler::new(
        Arc::new(factory),
        Arc::new(storage.clone()),
        &settings.batch,
        &settings.site,
    )
}

/// 任意并发度下每个任务恰好产生一个结果
#[tokio::test]
async fn every_task_is_accounted_for() {
    for concurrency in 1..=3 {
        let storage = InMemoryStorage::new();
        let scheduler = scheduler(concurrency, &storage, Some(4));
        let report = scheduler.submit_batch(&items(6), &new_batch_id()).await;

        assert_eq!(report.total, 6);
        assert_eq!(report.success_count + report.failed_count, report.total);
        assert_eq!(report.failed_count, 1);

        let mut indices: Vec<usize> = report.results.iter().map(|r| r.index).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![1, 2, 3, 4, 5, 6]);

        let failed = report.results.iter().find(|r| !r.success).unwrap();
        assert_eq!(failed.index, 4);
        assert_eq!(failed.identity, identity(4));
    }
}

/// 批次目录下写入任务信息、每条笔记的源码与详情以及统计
#[tokio::test]
async fn batch_writes_artifacts_and_stats() {
    let storage = InMemoryStorage::new();
    let scheduler = scheduler(2, &storage, None);
    let batch_id = new_batch_id();
    let report = scheduler.submit_batch(&items(3), &batch_id).await;
    assert_eq!(report.success_count, 3);

    let dir = batch_dir(&batch_id);
    assert!(storage.exists(&format!("{}/task_info.json", dir)).await.unwrap());
    for i in 1..=3 {
        let stem = format!("{:03}_{}", i, identity(i));
        assert!(storage
            .exists(&format!("{}/{}_source.html", dir, stem))
            .await
            .unwrap());
        let raw = storage
            .get(&format!("{}/{}_detail.json", dir, stem))
            .await
            .unwrap()
            .expect("detail record");
        let detail: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(detail["title"], format!("手表笔记第{}篇", i));
    }

    let raw = storage
        .get(&format!("{}/crawl_stats.json", dir))
        .await
        .unwrap()
        .expect("stats");
    let stats: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(stats["total"], 3);
    assert_eq!(stats["success_count"], 3);
    assert_eq!(stats["failures"].as_array().map(Vec::len), Some(0));
}
