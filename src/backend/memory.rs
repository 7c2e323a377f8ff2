//! Scripted in-process backend.
//!
//! Records are keyed by target. Runs pop queued outcomes (a clean empty run
//! when the queue is dry). Saves are recorded and written through to the
//! stored record.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{Backend, BackendError, ProjectContext, RunResult, SessionTarget};
use crate::session::editor::EditorState;

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<String, ProjectContext>,
    saves: Vec<(SessionTarget, EditorState)>,
    runs: Vec<String>,
    run_outcomes: VecDeque<Result<RunResult, String>>,
    save_failure: Option<String>,
    run_latency: Duration,
    load_latency: Duration,
}

/// `Backend` double with scriptable outcomes.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a record for `target`.
    pub fn insert(&self, target: &SessionTarget, context: ProjectContext) {
        self.lock().records.insert(target.path(), context);
    }

    /// Queue the next run outcome. `Err` becomes a 500 from the run endpoint.
    pub fn queue_run(&self, outcome: Result<RunResult, String>) {
        self.lock().run_outcomes.push_back(outcome);
    }

    /// Make saves fail with `reason` (`None` restores).
    pub fn fail_saves(&self, reason: Option<&str>) {
        self.lock().save_failure = reason.map(str::to_string);
    }

    /// Delay every run by `latency`.
    pub fn set_run_latency(&self, latency: Duration) {
        self.lock().run_latency = latency;
    }

    /// Delay every load by `latency`.
    pub fn set_load_latency(&self, latency: Duration) {
        self.lock().load_latency = latency;
    }

    /// Successful saves, oldest first.
    pub fn saves(&self) -> Vec<(SessionTarget, EditorState)> {
        self.lock().saves.clone()
    }

    /// Code submitted to the run endpoint, oldest first.
    pub fn runs(&self) -> Vec<String> {
        self.lock().runs.clone()
    }

    /// Current stored record for `target`.
    pub fn record(&self, target: &SessionTarget) -> Option<ProjectContext> {
        self.lock().records.get(&target.path()).cloned()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn load(&self, target: &SessionTarget) -> Result<ProjectContext, BackendError> {
        let latency = self.lock().load_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.record(target)
            .ok_or_else(|| BackendError::NotFound(target.to_string()))
    }

    async fn save(&self, target: &SessionTarget, state: &EditorState) -> Result<(), BackendError> {
        let mut inner = self.lock();
        if let Some(reason) = inner.save_failure.clone() {
            return Err(BackendError::ApiError {
                status: 503,
                message: reason,
            });
        }
        if let Some(record) = inner.records.get_mut(&target.path()) {
            record.code = state.code.clone();
            record.language = state.language;
        }
        inner.saves.push((target.clone(), state.clone()));
        Ok(())
    }

    async fn run(&self, code: &str) -> Result<RunResult, BackendError> {
        let (latency, outcome) = {
            let mut inner = self.lock();
            inner.runs.push(code.to_string());
            (inner.run_latency, inner.run_outcomes.pop_front())
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match outcome {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(BackendError::ApiError {
                status: 500,
                message,
            }),
            None => Ok(RunResult {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
                timed_out: false,
            }),
        }
    }
}
