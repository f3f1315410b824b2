use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use batchdag::exec::{JobFailure, JobRequest, JobRunner, RunFuture, RunResult};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

type Hook = Arc<dyn Fn(&JobRequest) + Send + Sync>;

#[derive(Default)]
struct FakeState {
    requests: Mutex<Vec<JobRequest>>,
    always_fail: Mutex<HashMap<String, JobFailure>>,
    fail_once: Mutex<HashMap<String, VecDeque<JobFailure>>>,
    hang: Mutex<HashSet<String>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

/// A fake job runner that:
/// - records every request it receives, in order
/// - succeeds unless a failure was scripted for the task id
/// - can sleep, hang until cancelled, or call a hook on each run.
///
/// Clones share state, so one instance can back many tasks.
#[derive(Clone, Default)]
pub struct FakeJobRunner {
    state: Arc<FakeState>,
    delay: Option<Duration>,
    required: Vec<String>,
    hook: Option<Hook>,
}

impl fmt::Debug for FakeJobRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeJobRunner")
            .field("delay", &self.delay)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

impl FakeJobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every run.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_required(mut self, keys: &[&str]) -> Self {
        self.required = keys.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Called with the request before a run decides its result.
    pub fn with_hook(mut self, hook: impl Fn(&JobRequest) + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Every run of `task_id` fails with `failure`.
    pub fn fail_task(&self, task_id: &str, failure: JobFailure) {
        self.state
            .always_fail
            .lock()
            .insert(task_id.to_string(), failure);
    }

    /// The next run of `task_id` fails with `failure`; later runs succeed.
    pub fn fail_once(&self, task_id: &str, failure: JobFailure) {
        self.state
            .fail_once
            .lock()
            .entry(task_id.to_string())
            .or_default()
            .push_back(failure);
    }

    /// Runs of `task_id` never finish on their own; they end as `Abandoned`
    /// once cancelled.
    pub fn hang_task(&self, task_id: &str) {
        self.state.hang.lock().insert(task_id.to_string());
    }

    /// Forget scripted failures, keeping the invocation log.
    pub fn heal(&self) {
        self.state.always_fail.lock().clear();
        self.state.fail_once.lock().clear();
    }

    /// Task ids in invocation order.
    pub fn invocations(&self) -> Vec<String> {
        self.state
            .requests
            .lock()
            .iter()
            .map(|r| r.task_id.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<JobRequest> {
        self.state.requests.lock().clone()
    }

    pub fn count(&self, task_id: &str) -> usize {
        self.state
            .requests
            .lock()
            .iter()
            .filter(|r| r.task_id == task_id)
            .count()
    }

    pub fn clear_invocations(&self) {
        self.state.requests.lock().clear();
    }

    /// Highest number of runs observed in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.state.max_running.load(Ordering::SeqCst)
    }

    fn scripted_failure(&self, task_id: &str) -> Option<JobFailure> {
        if let Some(f) = self.state.always_fail.lock().get(task_id) {
            return Some(f.clone());
        }
        self.state
            .fail_once
            .lock()
            .get_mut(task_id)
            .and_then(|q| q.pop_front())
    }
}

impl JobRunner for FakeJobRunner {
    fn describe(&self) -> String {
        "fake job".to_string()
    }

    fn required_parameters(&self) -> Vec<String> {
        self.required.clone()
    }

    fn run<'a>(&'a self, request: &'a JobRequest, cancel: CancellationToken) -> RunFuture<'a> {
        Box::pin(async move {
            self.state.requests.lock().push(request.clone());
            let now = self.state.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.state.max_running.fetch_max(now, Ordering::SeqCst);

            if let Some(hook) = &self.hook {
                hook(request);
            }

            let hang = self.state.hang.lock().contains(&request.task_id);
            let result = if hang {
                cancel.cancelled().await;
                RunResult::Failure(JobFailure::Abandoned)
            } else {
                if let Some(delay) = self.delay {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            self.state.running.fetch_sub(1, Ordering::SeqCst);
                            return RunResult::Failure(JobFailure::Abandoned);
                        }
                    }
                }
                match self.scripted_failure(&request.task_id) {
                    Some(failure) => RunResult::Failure(failure),
                    None => RunResult::Success,
                }
            };

            self.state.running.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }
}
