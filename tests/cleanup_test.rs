//! Cleanup worker tests under tokio virtual time.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use docsim::cleanup::{CleanupQueue, CleanupWorker};
use docsim::config::CleanupConfig;
use docsim::index::{Filter, IndexError, ScoredPoint, SearchRequest, VectorIndex};
use docsim::types::DocumentId;

#[derive(Debug, Clone, PartialEq)]
enum DeleteCall {
    Points(Vec<String>),
    ByFilter,
}

/// Index double that fails the first `failures` delete calls.
struct FlakyIndex {
    failures: usize,
    calls: Mutex<Vec<DeleteCall>>,
}

impl FlakyIndex {
    fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, call: DeleteCall) -> Result<(), IndexError> {
        let mut calls = self.calls.lock();
        calls.push(call);
        if calls.len() <= self.failures {
            Err(IndexError::Backend("connection reset".to_string()))
        } else {
            Ok(())
        }
    }

    fn calls(&self) -> Vec<DeleteCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl VectorIndex for FlakyIndex {
    async fn search(&self, _request: SearchRequest) -> Result<Vec<ScoredPoint>, IndexError> {
        Ok(Vec::new())
    }

    async fn delete_points(&self, ids: &[String]) -> Result<(), IndexError> {
        self.record(DeleteCall::Points(ids.to_vec()))
    }

    async fn delete_by_filter(&self, _filter: &Filter) -> Result<(), IndexError> {
        self.record(DeleteCall::ByFilter)
    }
}

fn config(max_attempts: u32) -> CleanupConfig {
    CleanupConfig {
        max_attempts,
        base_delay_ms: 100,
        max_delay_ms: 1_000,
        failure_history: 3,
    }
}

/// Wait (in virtual time) until the queue goes idle.
async fn drain(queue: &CleanupQueue) {
    for _ in 0..1_000 {
        let metrics = queue.metrics();
        if metrics.pending_documents == 0 && !metrics.is_processing {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("cleanup queue did not drain");
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_enqueue_tracks_one_task() {
    let index = Arc::new(FlakyIndex::new(usize::MAX));
    let worker = CleanupWorker::spawn(index.clone(), &config(5));
    let queue = worker.queue();
    let doc = DocumentId::random();

    queue.enqueue(doc, None);
    queue.enqueue(doc, None);

    let metrics = queue.metrics();
    assert_eq!(metrics.pending_documents, 1);
    assert_eq!(metrics.queue_depth, 1);

    worker.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_second_enqueue_upgrades_vector_id_hint() {
    let index = Arc::new(FlakyIndex::new(0));
    let worker = CleanupWorker::spawn(index.clone(), &config(5));
    let queue = worker.queue();
    let doc = DocumentId::random();

    queue.enqueue(doc, None);
    queue.enqueue(doc, Some(vec!["p1".to_string(), "p2".to_string()]));
    drain(&queue).await;

    assert_eq!(
        index.calls(),
        vec![DeleteCall::Points(vec![
            "p1".to_string(),
            "p2".to_string()
        ])]
    );
    worker.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_missing_hint_falls_back_to_filter_delete() {
    let index = Arc::new(FlakyIndex::new(0));
    let worker = CleanupWorker::spawn(index.clone(), &config(5));
    let queue = worker.queue();

    queue.enqueue(DocumentId::random(), None);
    drain(&queue).await;

    assert_eq!(index.calls(), vec![DeleteCall::ByFilter]);
    worker.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_retries_until_success() {
    let index = Arc::new(FlakyIndex::new(2));
    let worker = CleanupWorker::spawn(index.clone(), &config(5));
    let queue = worker.queue();

    queue.enqueue(DocumentId::random(), None);
    drain(&queue).await;

    assert_eq!(index.calls().len(), 3);
    let metrics = queue.metrics();
    assert!(metrics.recent_failures.is_empty());
    worker.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_lands_in_recent_failures() {
    let index = Arc::new(FlakyIndex::new(usize::MAX));
    let worker = CleanupWorker::spawn(index.clone(), &config(3));
    let queue = worker.queue();
    let doc = DocumentId::random();

    queue.enqueue(doc, None);
    drain(&queue).await;

    assert_eq!(index.calls().len(), 3);
    let metrics = queue.metrics();
    assert_eq!(metrics.pending_documents, 0);
    assert_eq!(metrics.recent_failures.len(), 1);
    assert_eq!(metrics.recent_failures[0].document_id, doc);
    assert_eq!(metrics.recent_failures[0].attempts, 3);
    worker.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failure_history_is_bounded() {
    let index = Arc::new(FlakyIndex::new(usize::MAX));
    let worker = CleanupWorker::spawn(index.clone(), &config(1));
    let queue = worker.queue();

    for _ in 0..5 {
        queue.enqueue(DocumentId::random(), None);
    }
    drain(&queue).await;

    // failure_history is 3; only the most recent failures are kept.
    assert_eq!(queue.metrics().recent_failures.len(), 3);
    worker.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_after_success_starts_fresh_task() {
    let index = Arc::new(FlakyIndex::new(0));
    let worker = CleanupWorker::spawn(index.clone(), &config(5));
    let queue = worker.queue();
    let doc = DocumentId::random();

    queue.enqueue(doc, None);
    drain(&queue).await;
    queue.enqueue(doc, Some(vec!["late".to_string()]));
    drain(&queue).await;

    assert_eq!(
        index.calls(),
        vec![
            DeleteCall::ByFilter,
            DeleteCall::Points(vec!["late".to_string()])
        ]
    );
    worker.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_metrics_snapshot_is_serializable() {
    let index = Arc::new(FlakyIndex::new(usize::MAX));
    let worker = CleanupWorker::spawn(index.clone(), &config(2));
    let queue = worker.queue();

    queue.enqueue(DocumentId::random(), None);
    let value = serde_json::to_value(queue.metrics()).unwrap();
    assert!(value.get("queue_depth").is_some());
    assert!(value.get("retry_config").is_some());

    worker.stop().await;
}
