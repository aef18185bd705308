//! Background execution of analysis runs.
//!
//! [`AnalysisQueue::submit`] answers as soon as the `processing` record
//! exists and hands the remaining steps to a spawned tokio task. Each run
//! sits behind its own error boundary: a supervisor task awaits the worker's
//! `JoinHandle`, so a returned error *and* a panic both end up as a
//! `failed` record and a [`TaskState::Failed`] entry. Nothing propagates to
//! the request that started the run.
//!
//! Task states are kept in memory and are observable through
//! [`AnalysisQueue::state`]. [`AnalysisQueue::join`] waits for a run to
//! finish and drops its entry. Finished entries nobody joins are evicted
//! oldest first once more than [`MAX_FINISHED_TASKS`] accumulate; the
//! durable outcome always lives on the stored record.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::error;

use site_context_core::normalize::NormalizedUrl;
use site_context_core::SiteResult;

use crate::pipeline::{AnalyzeOutcome, ContextPipeline};

/// Finished task entries retained for [`AnalysisQueue::state`].
pub const MAX_FINISHED_TASKS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Completed,
    Failed(String),
}

struct TaskEntry {
    state: TaskState,
    handle: Option<JoinHandle<TaskState>>,
    finished_at: Option<Instant>,
}

#[derive(Clone)]
pub struct AnalysisQueue {
    pipeline: Arc<ContextPipeline>,
    tasks: Arc<Mutex<HashMap<String, TaskEntry>>>,
}

impl AnalysisQueue {
    pub fn new(pipeline: Arc<ContextPipeline>) -> Self {
        Self {
            pipeline,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn pipeline(&self) -> &Arc<ContextPipeline> {
        &self.pipeline
    }

    /// Start an analysis. Cache hits return immediately without spawning.
    pub async fn submit(&self, raw_url: &str, user_id: Option<&str>) -> SiteResult<AnalyzeOutcome> {
        let outcome = self.pipeline.begin(raw_url, user_id).await?;
        if let AnalyzeOutcome::Started { id, url } = &outcome {
            self.spawn(id.clone(), url.clone());
        }
        Ok(outcome)
    }

    fn spawn(&self, id: String, url: NormalizedUrl) {
        // Registered before spawning so the supervisor always finds its entry.
        self.lock().insert(
            id.clone(),
            TaskEntry {
                state: TaskState::Running,
                handle: None,
                finished_at: None,
            },
        );

        let pipeline = self.pipeline.clone();
        let tasks = self.tasks.clone();
        let key = id.clone();
        let worker_id = id.clone();
        let supervisor = tokio::spawn(async move {
            let worker_pipeline = pipeline.clone();
            let worker = tokio::spawn(async move {
                worker_pipeline.run(&worker_id, &url).await
            });

            let state = match worker.await {
                Ok(Ok(())) => TaskState::Completed,
                Ok(Err(e)) => TaskState::Failed(e.to_string()),
                Err(join_err) => {
                    let message = if join_err.is_panic() {
                        "analysis task panicked".to_string()
                    } else {
                        "analysis task was cancelled".to_string()
                    };
                    error!(context_id = %id, error = %message, "analysis task aborted");
                    if let Err(e) = pipeline.store().fail_with(&id, &message).await {
                        error!(context_id = %id, error = %e, "could not record aborted analysis");
                    }
                    TaskState::Failed(message)
                }
            };

            let mut guard = lock_tasks(&tasks);
            if let Some(entry) = guard.get_mut(&id) {
                entry.state = state.clone();
                entry.finished_at = Some(Instant::now());
            }
            evict_finished(&mut guard, MAX_FINISHED_TASKS);
            drop(guard);
            state
        });

        if let Some(entry) = self.lock().get_mut(&key) {
            entry.handle = Some(supervisor);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TaskEntry>> {
        lock_tasks(&self.tasks)
    }

    /// Current state of the run for `id`, if this process started one.
    pub fn state(&self, id: &str) -> Option<TaskState> {
        self.lock().get(id).map(|entry| entry.state.clone())
    }

    /// Wait for the run for `id` to finish and return its final state.
    ///
    /// The entry is removed once the run is joined, so a later
    /// [`state`](Self::state) for the same id returns `None`.
    pub async fn join(&self, id: &str) -> Option<TaskState> {
        let handle = self.lock().get_mut(id)?.handle.take();
        let Some(handle) = handle else {
            return self.state(id);
        };
        let joined = handle.await;
        let entry = self.lock().remove(id);
        match joined {
            Ok(state) => Some(state),
            Err(_) => entry.map(|entry| entry.state),
        }
    }
}

/// Drop the oldest finished entries until at most `keep` remain.
fn evict_finished(tasks: &mut HashMap<String, TaskEntry>, keep: usize) {
    let mut finished: Vec<(Instant, String)> = tasks
        .iter()
        .filter_map(|(id, entry)| entry.finished_at.map(|at| (at, id.clone())))
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort();
    let excess = finished.len() - keep;
    for (_, id) in finished.into_iter().take(excess) {
        tasks.remove(&id);
    }
}

fn lock_tasks(
    tasks: &Mutex<HashMap<String, TaskEntry>>,
) -> MutexGuard<'_, HashMap<String, TaskEntry>> {
    tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
