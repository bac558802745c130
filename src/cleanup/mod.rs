//! Asynchronous vector-store cleanup.
//!
//! When a document is deleted, its points must leave the ANN index, but the
//! deleting request must not block on (or fail because of) the index. Work
//! is handed to a single background worker that retries with exponential
//! backoff and gives up after a ceiling, recording the failure for operator
//! visibility. Orphaned vectors are a storage-hygiene issue, not a search
//! correctness issue: a deleted document is already excluded from retrieval
//! by filter.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::CleanupConfig;
use crate::index::filter::DOCUMENT_ID_FIELD;
use crate::index::{Filter, VectorIndex};
use crate::types::DocumentId;

/// Retry schedule: `base * 2^(attempt-1)`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(rename = "base_delay_ms", with = "duration_millis")]
    pub base_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "duration_millis")]
    pub max_delay: Duration,
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CleanupConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
        }
    }

    /// Delay before the retry following the given completed attempt count.
    pub fn delay_after(&self, attempts: u32) -> Duration {
        let doublings = attempts.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_delay)
    }
}

/// One tracked deletion, mutated in place across retries.
#[derive(Debug, Clone)]
struct CleanupTask {
    document_id: DocumentId,
    /// Point ids recorded at enqueue time; deletion falls back to a
    /// document-id filter when absent.
    vector_ids: Option<Vec<String>>,
    attempts: u32,
    enqueued_at: DateTime<Utc>,
    last_error: Option<String>,
    /// Earliest moment the next attempt may run.
    not_before: Instant,
}

/// Detail of the task currently being executed.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveCleanup {
    pub document_id: DocumentId,
    /// Attempt number in progress (1-based).
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

/// A task that exhausted its retries.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupFailure {
    pub document_id: DocumentId,
    pub attempts: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Read-only snapshot for the operational status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupMetrics {
    pub queue_depth: usize,
    pub pending_documents: usize,
    pub is_processing: bool,
    pub active_task: Option<ActiveCleanup>,
    pub retry_config: RetryPolicy,
    pub recent_failures: Vec<CleanupFailure>,
}

#[derive(Default)]
struct CleanupState {
    /// FIFO of document ids awaiting an attempt. A document appears at most
    /// once; re-enqueues update the tracked task instead.
    queue: VecDeque<DocumentId>,
    tasks: HashMap<DocumentId, CleanupTask>,
    active: Option<ActiveCleanup>,
    recent_failures: VecDeque<CleanupFailure>,
}

/// Handle to the cleanup worker: enqueue, observe, shut down.
///
/// Cloneable and cheap; `enqueue` is safe from any number of concurrent
/// requests.
#[derive(Clone)]
pub struct CleanupQueue {
    state: Arc<Mutex<CleanupState>>,
    notify: Arc<Notify>,
    policy: RetryPolicy,
    failure_history: usize,
    shutdown: CancellationToken,
}

impl CleanupQueue {
    /// Enqueue deletion of a document's vectors. Fire-and-forget.
    ///
    /// Idempotent per document while a task is tracked: a second enqueue
    /// refreshes the freshness timestamp and upgrades the vector-id hint
    /// rather than creating a duplicate task. After a task succeeds or is
    /// abandoned, a new enqueue starts a fresh one; a later enqueue may
    /// carry different vector ids, so completed work is never skipped.
    pub fn enqueue(&self, document_id: DocumentId, vector_ids: Option<Vec<String>>) {
        {
            let mut state = self.state.lock();
            if let Some(task) = state.tasks.get_mut(&document_id) {
                task.enqueued_at = Utc::now();
                if vector_ids.is_some() {
                    task.vector_ids = vector_ids;
                }
                tracing::debug!(
                    target: "cleanup",
                    document = %document_id,
                    "cleanup already pending; refreshed"
                );
                return;
            }
            state.tasks.insert(
                document_id,
                CleanupTask {
                    document_id,
                    vector_ids,
                    attempts: 0,
                    enqueued_at: Utc::now(),
                    last_error: None,
                    not_before: Instant::now(),
                },
            );
            state.queue.push_back(document_id);
        }
        self.notify.notify_one();
    }

    /// Snapshot the worker's state without blocking it.
    pub fn metrics(&self) -> CleanupMetrics {
        let state = self.state.lock();
        CleanupMetrics {
            queue_depth: state.queue.len(),
            pending_documents: state.tasks.len(),
            is_processing: state.active.is_some(),
            active_task: state.active.clone(),
            retry_config: self.policy,
            recent_failures: state.recent_failures.iter().cloned().collect(),
        }
    }

    /// Stop the worker. Pending tasks are dropped; a task mid-delete
    /// finishes its current attempt.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.notify.notify_one();
    }
}

/// The background worker owning the drain loop.
pub struct CleanupWorker {
    queue: CleanupQueue,
    handle: JoinHandle<()>,
}

impl CleanupWorker {
    /// Spawn the worker onto the current runtime.
    pub fn spawn(index: Arc<dyn VectorIndex>, config: &CleanupConfig) -> Self {
        let queue = CleanupQueue {
            state: Arc::new(Mutex::new(CleanupState::default())),
            notify: Arc::new(Notify::new()),
            policy: RetryPolicy::from_config(config),
            failure_history: config.failure_history,
            shutdown: CancellationToken::new(),
        };
        let handle = tokio::spawn(run_loop(queue.clone(), index));
        Self { queue, handle }
    }

    /// The shared enqueue/metrics handle.
    pub fn queue(&self) -> CleanupQueue {
        self.queue.clone()
    }

    /// Cancel the worker and wait for it to exit.
    pub async fn stop(self) {
        self.queue.shutdown();
        let _ = self.handle.await;
    }
}

/// Sequential drain: at most one delete call in flight, ever. Runs
/// concurrently with search requests but never with itself.
async fn run_loop(queue: CleanupQueue, index: Arc<dyn VectorIndex>) {
    loop {
        if queue.shutdown.is_cancelled() {
            return;
        }
        let next = next_ready_task(&queue);
        let task = match next {
            NextTask::Ready(task) => task,
            NextTask::Sleep(until) => {
                tokio::select! {
                    _ = queue.shutdown.cancelled() => return,
                    _ = queue.notify.notified() => continue,
                    _ = tokio::time::sleep_until(until) => continue,
                }
            }
            NextTask::Idle => {
                tokio::select! {
                    _ = queue.shutdown.cancelled() => return,
                    _ = queue.notify.notified() => continue,
                }
            }
        };

        let attempt = task.attempts + 1;
        {
            let mut state = queue.state.lock();
            state.active = Some(ActiveCleanup {
                document_id: task.document_id,
                attempt,
                enqueued_at: task.enqueued_at,
                last_error: task.last_error.clone(),
            });
        }

        let result = delete_vectors(index.as_ref(), &task).await;

        let mut state = queue.state.lock();
        state.active = None;
        match result {
            Ok(()) => {
                state.tasks.remove(&task.document_id);
                tracing::info!(
                    target: "cleanup",
                    document = %task.document_id,
                    attempt,
                    "vector cleanup complete"
                );
            }
            Err(e) => {
                let error = e.to_string();
                if attempt >= queue.policy.max_attempts {
                    state.tasks.remove(&task.document_id);
                    state.recent_failures.push_back(CleanupFailure {
                        document_id: task.document_id,
                        attempts: attempt,
                        error: error.clone(),
                        failed_at: Utc::now(),
                    });
                    while state.recent_failures.len() > queue.failure_history {
                        state.recent_failures.pop_front();
                    }
                    tracing::error!(
                        target: "cleanup",
                        document = %task.document_id,
                        attempts = attempt,
                        error = %error,
                        "vector cleanup abandoned after retry ceiling"
                    );
                } else {
                    let delay = queue.policy.delay_after(attempt);
                    if let Some(tracked) = state.tasks.get_mut(&task.document_id) {
                        tracked.attempts = attempt;
                        tracked.last_error = Some(error.clone());
                        tracked.not_before = Instant::now() + delay;
                    }
                    state.queue.push_back(task.document_id);
                    tracing::warn!(
                        target: "cleanup",
                        document = %task.document_id,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %error,
                        "vector cleanup failed; retry scheduled"
                    );
                }
            }
        }
    }
}

enum NextTask {
    Ready(CleanupTask),
    Sleep(Instant),
    Idle,
}

/// Pop the first queued task whose backoff delay has elapsed. When every
/// queued task is still backing off, report the earliest wake time.
fn next_ready_task(queue: &CleanupQueue) -> NextTask {
    let mut state = queue.state.lock();
    let now = Instant::now();

    let ready_pos = state.queue.iter().position(|id| {
        state
            .tasks
            .get(id)
            .is_none_or(|task| task.not_before <= now)
    });
    if let Some(pos) = ready_pos {
        let removed = state.queue.remove(pos);
        // A queue entry without a tracked task cannot occur: ids leave the
        // queue and the map together.
        if let Some(task) = removed.and_then(|id| state.tasks.get(&id)) {
            return NextTask::Ready(task.clone());
        }
        return NextTask::Idle;
    }

    state
        .queue
        .iter()
        .filter_map(|id| state.tasks.get(id).map(|t| t.not_before))
        .min()
        .map_or(NextTask::Idle, NextTask::Sleep)
}

async fn delete_vectors(
    index: &dyn VectorIndex,
    task: &CleanupTask,
) -> Result<(), crate::index::IndexError> {
    match &task.vector_ids {
        Some(ids) => index.delete_points(ids).await,
        None => {
            index
                .delete_by_filter(&Filter::eq(DOCUMENT_ID_FIELD, task.document_id))
                .await
        }
    }
}
