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

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::settings::{BatchSettings, SiteSettings};
use crate::domain::models::candidate::CandidateItem;
use crate::domain::models::detail::{
    BatchReport, BatchReportBuilder, BatchTaskInfo, DetailTask, TaskOutcome,
};
use crate::domain::repositories::storage_repository::StorageRepository;
use crate::domain::services::detail_extractor::DetailExtractor;
use crate::engines::traits::{BrowserSession, SessionFactory};
use crate::utils::retry_policy::RetryPolicy;
use crate::workers::pacing::Pacer;

const READINESS_POLL: Duration = Duration::from_millis(500);

/// 单次尝试的失败类型
#[derive(Debug)]
enum AttemptError {
    /// 可重试（导航失败、超时、页面未就绪）
    Retryable(String),
    /// 笔记不存在等，重试无意义
    Permanent(String),
}

impl AttemptError {
    fn message(&self) -> &str {
        match self {
            AttemptError::Retryable(msg) | AttemptError::Permanent(msg) => msg,
        }
    }
}

/// 生成批次 ID，如 `20250301_142530_1a2b3c4d`
pub fn new_batch_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// 批次目录
pub fn batch_dir(batch_id: &str) -> String {
    format!("notes/batch_{}", batch_id)
}

/// 批量详情抓取调度器
///
/// 固定数量的工作者从共享队列取任务，每次尝试独占一个新会话；
/// 结果经通道汇总到唯一的收集者。任何任务失败都不会中断整个批次。
#[derive(Clone)]
pub struct BatchScheduler {
    factory: Arc<dyn SessionFactory>,
    storage: Arc<dyn StorageRepository>,
    extractor: Arc<DetailExtractor>,
    retry_policy: RetryPolicy,
    pacer: Pacer,
    concurrency: usize,
    task_timeout: Duration,
    readiness_timeout: Duration,
    readiness_min_len: usize,
}

/// 批次结束时写入的统计
#[derive(Debug, Serialize)]
struct CrawlStats<'a> {
    session_id: &'a str,
    total: usize,
    success_count: usize,
    failed_count: usize,
    success_rate: f64,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    duration_secs: f64,
    failures: Vec<&'a TaskOutcome>,
}

impl BatchScheduler {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        storage: Arc<dyn StorageRepository>,
        batch: &BatchSettings,
        site: &SiteSettings,
    ) -> Self {
        Self {
            factory,
            storage,
            extractor: Arc::new(DetailExtractor::new(batch, site)),
            retry_policy: RetryPolicy::linear(batch.max_attempts, batch.retry_backoff())
                .with_jitter(batch.retry_jitter),
            pacer: Pacer::new(batch.pacing.clone()),
            concurrency: batch.concurrency.max(1),
            task_timeout: batch.task_timeout(),
            readiness_timeout: batch.readiness_timeout(),
            readiness_min_len: batch.readiness_min_len,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// 为每个有 ID 的条目创建任务，序号从 1 开始
    pub fn tasks_from_items(&self, items: &[CandidateItem]) -> Vec<DetailTask> {
        items
            .iter()
            .filter(|item| !item.identity.is_empty())
            .enumerate()
            .map(|(i, item)| DetailTask::from_item(i + 1, item, self.retry_policy.max_attempts))
            .collect()
    }

    /// 提交一批条目并等待批次完成
    pub async fn submit_batch(&self, items: &[CandidateItem], batch_id: &str) -> BatchReport {
        let tasks = self.tasks_from_items(items);
        self.run(tasks, batch_id).await
    }

    /// 执行批次
    ///
    /// 返回时 `success_count + failed_count == total`，每个结果保留任务序号。
    #[instrument(skip(self, tasks), fields(batch = %batch_id, total = tasks.len()))]
    pub async fn run(&self, tasks: Vec<DetailTask>, batch_id: &str) -> BatchReport {
        let mut builder = BatchReportBuilder::new(batch_id, tasks.len());
        self.write_task_info(&tasks, batch_id, builder.started_at()).await;

        let workers = self.concurrency.min(tasks.len()).max(1);
        info!("Starting batch with {} tasks on {} workers", tasks.len(), workers);

        let queue = Arc::new(Mutex::new(tasks.iter().cloned().collect::<VecDeque<_>>()));
        let (tx, mut rx) = mpsc::unbounded_channel::<TaskOutcome>();
        let batch: Arc<str> = Arc::from(batch_id);

        let handles: Vec<_> = (0..workers)
            .map(|worker_id| {
                let scheduler = self.clone();
                let queue = queue.clone();
                let tx = tx.clone();
                let batch = batch.clone();
                tokio::spawn(async move {
                    scheduler.worker_loop(worker_id, queue, tx, batch).await;
                })
            })
            .collect();
        drop(tx);

        while let Some(outcome) = rx.recv().await {
            builder.record(outcome);
        }

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("Batch worker terminated abnormally: {}", e);
            }
        }

        for task in &tasks {
            if !builder.has_index(task.index) {
                builder.record(TaskOutcome::failed(
                    task,
                    task.attempt,
                    "worker terminated before completing task",
                ));
            }
        }

        let report = builder.finish();
        self.write_stats(&report).await;
        info!(
            success = report.success_count,
            failed = report.failed_count,
            "Batch finished in {:.1}s ({:.1}% success)",
            report.duration_secs,
            report.success_rate
        );
        report
    }

    async fn worker_loop(
        self,
        worker_id: usize,
        queue: Arc<Mutex<VecDeque<DetailTask>>>,
        tx: mpsc::UnboundedSender<TaskOutcome>,
        batch_id: Arc<str>,
    ) {
        let mut first = true;
        loop {
            let next = queue.lock().pop_front();
            let Some(task) = next else {
                break;
            };
            if !first {
                self.pacer.pause().await;
            }
            first = false;

            debug!(worker = worker_id, index = task.index, "Picked detail task");
            let outcome = self.process(task, &batch_id).await;
            if tx.send(outcome).is_err() {
                warn!(worker = worker_id, "Result collector closed, stopping worker");
                break;
            }
        }
        debug!(worker = worker_id, "Worker drained queue");
    }

    /// 带重试地处理单个任务
    async fn process(&self, mut task: DetailTask, batch_id: &str) -> TaskOutcome {
        loop {
            task.attempt += 1;
            let error = match self.attempt(&task, batch_id).await {
                Ok(outcome) => return outcome,
                Err(e) => e,
            };

            let can_retry = matches!(error, AttemptError::Retryable(_))
                && task.attempt < task.max_attempts
                && self.retry_policy.should_retry(task.attempt);
            if !can_retry {
                warn!(
                    index = task.index,
                    identity = %task.identity,
                    attempts = task.attempt,
                    "Detail task failed: {}",
                    error.message()
                );
                return TaskOutcome::failed(&task, task.attempt, error.message());
            }

            let delay = self.retry_policy.calculate_backoff(task.attempt);
            warn!(
                index = task.index,
                attempt = task.attempt,
                "Detail attempt failed, retrying in {:?}: {}",
                delay,
                error.message()
            );
            sleep(delay).await;
        }
    }

    /// 单次尝试：获取会话、限时抓取、总是释放会话
    async fn attempt(&self, task: &DetailTask, batch_id: &str) -> Result<TaskOutcome, AttemptError> {
        let session = self
            .factory
            .create()
            .await
            .map_err(|e| AttemptError::Retryable(format!("failed to acquire session: {}", e)))?;

        let result = timeout(self.task_timeout, self.fetch(session.as_ref(), task, batch_id)).await;

        if let Err(e) = session.close().await {
            debug!("Failed to close detail session: {}", e);
        }

        match result {
            Ok(outcome) => outcome,
            Err(_) => Err(AttemptError::Retryable(format!(
                "timed out after {}s",
                self.task_timeout.as_secs()
            ))),
        }
    }

    async fn fetch(
        &self,
        session: &dyn BrowserSession,
        task: &DetailTask,
        batch_id: &str,
    ) -> Result<TaskOutcome, AttemptError> {
        let url = task.full_url();
        session
            .navigate(&url)
            .await
            .map_err(|e| AttemptError::Retryable(format!("navigation failed: {}", e)))?;

        self.wait_ready(session).await?;
        self.pacer.browse(session).await;

        let markup = session
            .page_markup()
            .await
            .map_err(|e| AttemptError::Retryable(format!("failed to read page: {}", e)))?;
        if let Some(marker) = self.extractor.missing_marker(&markup) {
            return Err(AttemptError::Permanent(format!("note unavailable: {}", marker)));
        }

        let record = self.extractor.extract(&markup, task, batch_id);

        let dir = batch_dir(batch_id);
        let stem = task.file_stem();
        let source_key = format!("{}/{}_source.html", dir, stem);
        let detail_key = format!("{}/{}_detail.json", dir, stem);

        self.storage
            .save(&source_key, markup.as_bytes())
            .await
            .map_err(|e| AttemptError::Retryable(format!("failed to save markup: {}", e)))?;
        let payload = serde_json::to_vec_pretty(&record)
            .map_err(|e| AttemptError::Permanent(format!("failed to encode record: {}", e)))?;
        self.storage
            .save(&detail_key, &payload)
            .await
            .map_err(|e| AttemptError::Retryable(format!("failed to save record: {}", e)))?;

        info!(
            index = task.index,
            identity = %task.identity,
            attempt = task.attempt,
            "Saved detail: {}",
            record.title
        );

        Ok(TaskOutcome {
            index: task.index,
            identity: task.identity.clone(),
            success: true,
            attempts: task.attempt,
            error: None,
            source_key: Some(source_key),
            detail_key: Some(detail_key),
            title: Some(record.title.clone()).filter(|t| !t.is_empty()),
            content_length: record.content.chars().count(),
            tag_count: record.tags.len(),
            image_count: record.images.len(),
        })
    }

    /// 轮询直到页面标记足够长；不存在提示页直接判定为永久失败
    async fn wait_ready(&self, session: &dyn BrowserSession) -> Result<(), AttemptError> {
        let deadline = Instant::now() + self.readiness_timeout;
        loop {
            let markup = session
                .page_markup()
                .await
                .map_err(|e| AttemptError::Retryable(format!("failed to read page: {}", e)))?;
            if let Some(marker) = self.extractor.missing_marker(&markup) {
                return Err(AttemptError::Permanent(format!("note unavailable: {}", marker)));
            }
            if markup.len() >= self.readiness_min_len {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AttemptError::Retryable(format!(
                    "page not ready: {} bytes after {}s",
                    markup.len(),
                    self.readiness_timeout.as_secs()
                )));
            }
            sleep(READINESS_POLL).await;
        }
    }

    async fn write_task_info(&self, tasks: &[DetailTask], batch_id: &str, started_at: DateTime<Utc>) {
        let info = BatchTaskInfo {
            session_id: batch_id.to_string(),
            total: tasks.len(),
            started_at,
            concurrency: self.concurrency,
            max_attempts: self.retry_policy.max_attempts,
            tasks: tasks.to_vec(),
        };
        self.write_json(&format!("{}/task_info.json", batch_dir(batch_id)), &info)
            .await;
    }

    async fn write_stats(&self, report: &BatchReport) {
        let stats = CrawlStats {
            session_id: &report.session_id,
            total: report.total,
            success_count: report.success_count,
            failed_count: report.failed_count,
            success_rate: report.success_rate,
            started_at: report.started_at,
            finished_at: report.finished_at,
            duration_secs: report.duration_secs,
            failures: report.results.iter().filter(|r| !r.success).collect(),
        };
        self.write_json(
            &format!("{}/crawl_stats.json", batch_dir(&report.session_id)),
            &stats,
        )
        .await;
    }

    async fn write_json<T: Serialize>(&self, key: &str, value: &T) {
        let payload = match serde_json::to_vec_pretty(value) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.storage.save(key, &payload).await {
            error!("Failed to write {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::candidate::ExtractionMethod;
    use crate::engines::replay_session::{ReplayPage, ReplaySessionFactory};
    use crate::infrastructure::storage::InMemoryStorage;

    fn detail_page(title: &str) -> ReplayPage {
        ReplayPage::new(
            "",
            format!(
                r#"<html><body><div id="detail-title">{title}</div>
                <div id="detail-desc">这是一段足够长的正文内容，用来通过就绪检查 #手表</div>
                <img src="https://sns-webpic-qc.xhscdn.com/{title}.jpg"></body></html>"#
            ),
        )
    }

    fn identity(i: usize) -> String {
        format!("64f1a2b3c4d5e6f7a8b9c0{:02}", i)
    }

    fn items(n: usize) -> Vec<CandidateItem> {
        (1..=n)
            .map(|i| {
                let mut item = CandidateItem::new(
                    identity(i),
                    format!("https://www.xiaohongshu.com/explore/{}", identity(i)),
                    ExtractionMethod::AnchorLinks,
                );
                item.auth_token = Some(format!("TOKEN{}", i));
                item
            })
            .collect()
    }

    fn settings(concurrency: usize) -> BatchSettings {
        BatchSettings {
            concurrency,
            readiness_min_len: 80,
            readiness_timeout_secs: 2,
            task_timeout_secs: 30,
            pacing: crate::config::settings::PacingSettings::disabled(),
            ..BatchSettings::default()
        }
    }

    fn scheduler(
        factory: &ReplaySessionFactory,
        storage: &InMemoryStorage,
        concurrency: usize,
    ) -> BatchScheduler {
        BatchScheduler::new(
            Arc::new(factory.clone()),
            Arc::new(storage.clone()),
            &settings(concurrency),
            &SiteSettings::default(),
        )
        .with_retry_policy(RetryPolicy::immediate(2))
        .with_pacer(Pacer::disabled())
    }

    #[tokio::test]
    async fn test_batch_completeness_for_any_concurrency() {
        for concurrency in 1..=3 {
            let mut factory = ReplaySessionFactory::new();
            for i in 1..=5 {
                if i != 4 {
                    factory = factory.with_route(identity(i), detail_page(&format!("标题{}", i)));
                }
            }
            let factory = factory.with_failing_route(identity(4));
            let storage = InMemoryStorage::new();

            let report = scheduler(&factory, &storage, concurrency)
                .submit_batch(&items(5), "b1")
                .await;

            assert_eq!(report.total, 5);
            assert_eq!(report.success_count + report.failed_count, report.total);
            assert_eq!(report.success_count, 4);
            let indices: Vec<usize> = report.results.iter().map(|r| r.index).collect();
            assert_eq!(indices, vec![1, 2, 3, 4, 5]);

            let failed = &report.results[3];
            assert!(!failed.success);
            assert_eq!(failed.attempts, 2);
            assert_eq!(factory.created_count(), factory.closed_count());
        }
    }

    #[tokio::test]
    async fn test_flaky_task_succeeds_on_retry() {
        let factory = ReplaySessionFactory::new()
            .with_route(identity(1), detail_page("重试成功"))
            .with_flaky_route(identity(1), 1);
        let storage = InMemoryStorage::new();

        let report = scheduler(&factory, &storage, 1)
            .submit_batch(&items(1), "b2")
            .await;

        let outcome = &report.results[0];
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.title.as_deref(), Some("重试成功"));
    }

    #[tokio::test]
    async fn test_missing_note_is_not_retried() {
        let factory = ReplaySessionFactory::new().with_route(
            identity(1),
            ReplayPage::new("", "<html><body>你访问的笔记不见了</body></html>"),
        );
        let storage = InMemoryStorage::new();

        let report = scheduler(&factory, &storage, 1)
            .submit_batch(&items(1), "b3")
            .await;

        let outcome = &report.results[0];
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.error.as_deref().unwrap_or_default().contains("note unavailable"));
        assert_eq!(factory.created_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unready_page_fails_after_retries() {
        let factory = ReplaySessionFactory::new()
            .with_route(identity(1), ReplayPage::new("", "<html><body>...</body></html>"));
        let storage = InMemoryStorage::new();

        let report = scheduler(&factory, &storage, 1)
            .submit_batch(&items(1), "b4")
            .await;

        let outcome = &report.results[0];
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 2);
        assert!(outcome.error.as_deref().unwrap_or_default().contains("not ready"));
    }

    #[tokio::test]
    async fn test_batch_writes_artifacts() {
        let factory = ReplaySessionFactory::new()
            .with_route(identity(1), detail_page("落盘"))
            .with_route(identity(2), detail_page("第二篇"));
        let storage = InMemoryStorage::new();

        let report = scheduler(&factory, &storage, 2)
            .submit_batch(&items(2), "b5")
            .await;
        assert_eq!(report.success_count, 2);

        let stem = format!("001_{}", identity(1));
        assert!(storage
            .exists(&format!("notes/batch_b5/{}_source.html", stem))
            .await
            .unwrap());
        let raw = storage
            .get(&format!("notes/batch_b5/{}_detail.json", stem))
            .await
            .unwrap()
            .unwrap();
        let record: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(record["title"], "落盘");
        assert_eq!(record["batch_session_id"], "b5");
        assert!(record["source_url"]
            .as_str()
            .unwrap()
            .contains("xsec_source=pc_feed&xsec_token=TOKEN1"));

        assert!(storage.exists("notes/batch_b5/task_info.json").await.unwrap());
        let stats = storage
            .get("notes/batch_b5/crawl_stats.json")
            .await
            .unwrap()
            .unwrap();
        let stats: serde_json::Value = serde_json::from_slice(&stats).unwrap();
        assert_eq!(stats["success_count"], 2);
    }

    #[tokio::test]
    async fn test_empty_batch_reports_zero() {
        let factory = ReplaySessionFactory::new();
        let storage = InMemoryStorage::new();
        let report = scheduler(&factory, &storage, 2).run(Vec::new(), "b6").await;
        assert_eq!(report.total, 0);
        assert_eq!(report.success_count + report.failed_count, 0);
        assert_eq!(factory.created_count(), 0);
    }

    #[test]
    fn test_retry_policy_follows_settings() {
        let batch = BatchSettings {
            max_attempts: 3,
            retry_backoff_ms: 500,
            retry_jitter: 0.25,
            ..BatchSettings::default()
        };
        let scheduler = BatchScheduler::new(
            Arc::new(ReplaySessionFactory::new()),
            Arc::new(InMemoryStorage::new()),
            &batch,
            &SiteSettings::default(),
        );
        assert_eq!(scheduler.retry_policy.max_attempts, 3);
        assert_eq!(scheduler.retry_policy.backoff, Duration::from_millis(500));
        assert!(scheduler.retry_policy.enable_jitter);
        assert_eq!(scheduler.retry_policy.jitter_factor, 0.25);
    }

    #[test]
    fn test_new_batch_id_shape() {
        let id = new_batch_id();
        assert_eq!(id.len(), "20250301_142530_".len() + 8);
    }
}
