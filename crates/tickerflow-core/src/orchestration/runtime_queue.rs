use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{Mutex, Notify, Semaphore};
use tokio::time::{Instant, timeout_at};

use crate::models::{CoreError, CoreErrorKind, ExecutionId, JobType};
use crate::orchestration::OrchestrationResult;

pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;
pub const DEFAULT_RETAINED_SNAPSHOTS: usize = 1024;

pub type JobOperation = Pin<Box<dyn Future<Output = OrchestrationResult<()>> + Send>>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct JobSubmission {
    pub execution_id: ExecutionId,
    pub job_type: JobType,
    pub requested_at: SystemTime,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum QueueStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobSnapshot {
    pub execution_id: ExecutionId,
    pub job_type: JobType,
    pub status: QueueStatus,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
    pub error_message: Option<String>,
}

/// Detached job runner. Jobs beyond the concurrency limit wait `Queued`
/// for a permit; finished snapshots are kept up to the retention limit.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Mutex<QueueState>>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    retained: usize,
}

#[derive(Default)]
struct QueueState {
    jobs: HashMap<ExecutionId, JobSnapshot>,
    completion_notifiers: HashMap<ExecutionId, Arc<Notify>>,
    finished: VecDeque<ExecutionId>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT_JOBS)
    }
}

impl JobQueue {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            inner: Arc::new(Mutex::new(QueueState::default())),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            retained: DEFAULT_RETAINED_SNAPSHOTS,
        }
    }

    pub fn with_retention(mut self, retained: usize) -> Self {
        self.retained = retained.max(1);
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub async fn spawn(
        &self,
        submission: JobSubmission,
        operation: JobOperation,
    ) -> OrchestrationResult<ExecutionId> {
        let execution_id = submission.execution_id;
        let completion_notify = {
            let mut state = self.inner.lock().await;
            if state.jobs.contains_key(&execution_id) {
                return Err(CoreError::new(
                    CoreErrorKind::InvalidInput,
                    format!("execution '{execution_id}' is already queued"),
                )
                .with_execution(execution_id));
            }

            state.jobs.insert(
                execution_id,
                JobSnapshot {
                    execution_id,
                    job_type: submission.job_type,
                    status: QueueStatus::Queued,
                    created_at: submission.requested_at,
                    started_at: None,
                    finished_at: None,
                    error_message: None,
                },
            );
            let completion_notify = Arc::new(Notify::new());
            state
                .completion_notifiers
                .insert(execution_id, completion_notify.clone());
            completion_notify
        };

        let inner = self.inner.clone();
        let permits = self.permits.clone();
        let retained = self.retained;
        tokio::spawn(async move {
            let (status, error_message) = match permits.acquire_owned().await {
                Ok(_permit) => {
                    set_running(&inner, execution_id).await;
                    match operation.await {
                        Ok(()) => (QueueStatus::Completed, None),
                        Err(error) => (QueueStatus::Failed, Some(error.message)),
                    }
                }
                Err(_) => (
                    QueueStatus::Failed,
                    Some("job queue closed before the job could start".to_string()),
                ),
            };

            set_terminal(&inner, execution_id, status, error_message, retained).await;
            completion_notify.notify_waiters();
        });

        Ok(execution_id)
    }

    pub async fn snapshot(&self, execution_id: ExecutionId) -> OrchestrationResult<JobSnapshot> {
        let state = self.inner.lock().await;
        state
            .jobs
            .get(&execution_id)
            .cloned()
            .ok_or_else(|| job_lookup_error(execution_id))
    }

    pub async fn status(&self, execution_id: ExecutionId) -> OrchestrationResult<QueueStatus> {
        Ok(self.snapshot(execution_id).await?.status)
    }

    pub async fn contains(&self, execution_id: ExecutionId) -> bool {
        self.inner.lock().await.jobs.contains_key(&execution_id)
    }

    pub async fn wait_for_terminal(
        &self,
        execution_id: ExecutionId,
        timeout_duration: Option<Duration>,
    ) -> OrchestrationResult<JobSnapshot> {
        let deadline = timeout_duration.map(|duration| Instant::now() + duration);

        loop {
            let notify = {
                let state = self.inner.lock().await;
                let snapshot = state
                    .jobs
                    .get(&execution_id)
                    .ok_or_else(|| job_lookup_error(execution_id))?;
                if snapshot.status.is_terminal() {
                    return Ok(snapshot.clone());
                }
                state
                    .completion_notifiers
                    .get(&execution_id)
                    .cloned()
                    .ok_or_else(|| job_lookup_error(execution_id))?
            };

            // Register interest before re-checking so a completion landing
            // between the two is not missed.
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let snapshot = self.snapshot(execution_id).await?;
            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }

            match deadline {
                Some(deadline) => {
                    timeout_at(deadline, notified).await.map_err(|_| {
                        CoreError::new(
                            CoreErrorKind::Timeout,
                            format!("timed out waiting for execution '{execution_id}' to finish"),
                        )
                        .with_job_type(snapshot.job_type)
                        .with_execution(execution_id)
                    })?;
                }
                None => notified.await,
            }
        }
    }
}

async fn set_running(inner: &Arc<Mutex<QueueState>>, execution_id: ExecutionId) {
    let mut state = inner.lock().await;
    if let Some(job) = state.jobs.get_mut(&execution_id) {
        job.status = QueueStatus::Running;
        job.started_at = Some(SystemTime::now());
    }
}

async fn set_terminal(
    inner: &Arc<Mutex<QueueState>>,
    execution_id: ExecutionId,
    status: QueueStatus,
    error_message: Option<String>,
    retained: usize,
) {
    let mut state = inner.lock().await;
    if let Some(job) = state.jobs.get_mut(&execution_id) {
        job.status = status;
        job.finished_at = Some(SystemTime::now());
        job.error_message = error_message;
    }

    state.finished.push_back(execution_id);
    while state.finished.len() > retained {
        if let Some(evicted) = state.finished.pop_front() {
            state.jobs.remove(&evicted);
            state.completion_notifiers.remove(&evicted);
        }
    }
}

fn job_lookup_error(execution_id: ExecutionId) -> CoreError {
    CoreError::new(
        CoreErrorKind::UnknownExecution,
        format!("execution '{execution_id}' is not tracked by the job queue"),
    )
    .with_execution(execution_id)
}
