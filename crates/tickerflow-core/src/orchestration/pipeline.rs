use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant, SystemTime};

use crate::agents::{AnalysisAgent, StepContext};
use crate::models::{
    CoreError, CoreErrorKind, ExecutionCompletion, ExecutionId, JobParameters, JobResult,
    JobType, StepCompletion, StepPayload, UnitFailure,
};
use crate::orchestration::{
    OrchestrationResult, Outcome, OutcomeMetadata, OutcomeStatus, RetryingExecutor,
    blocking_store_call,
};
use crate::persistence::{ExecutionStore, WriteStatus};

pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_HARD_TIMEOUT: Duration = Duration::from_secs(3600);
pub const DEFAULT_SOFT_TIMEOUT: Duration = Duration::from_secs(3000);

/// Slack the queue grants past the hard timeout before it stops waiting on
/// the orchestrator and finalizes the record itself.
const BACKSTOP_GRACE: Duration = Duration::from_secs(10);

/// Successful step payloads keyed by step name.
pub type StepResults = BTreeMap<String, StepPayload>;

/// Ordered steps for one job type plus the assembly of their payloads into
/// the job's aggregate result.
pub trait JobPipeline: Send + Sync {
    fn job_type(&self) -> JobType;

    fn steps(&self) -> &[Arc<dyn AnalysisAgent>];

    fn validate(&self, parameters: &JobParameters) -> Result<(), CoreError>;

    fn assemble(
        &self,
        parameters: &JobParameters,
        results: &StepResults,
        completed_at: SystemTime,
    ) -> Result<JobResult, CoreError>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExecutionLimits {
    pub step_timeout: Duration,
    pub hard_timeout: Duration,
    pub soft_timeout: Duration,
}

impl ExecutionLimits {
    pub fn backstop(&self) -> Duration {
        self.hard_timeout.saturating_add(BACKSTOP_GRACE)
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            step_timeout: DEFAULT_STEP_TIMEOUT,
            hard_timeout: DEFAULT_HARD_TIMEOUT,
            soft_timeout: DEFAULT_SOFT_TIMEOUT,
        }
    }
}

struct StepRun {
    outcome: Outcome<StepPayload>,
    timed_out: bool,
}

/// Drives one execution through its pipeline, writing every step back to
/// the store before the next one starts.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn ExecutionStore>,
    executor: RetryingExecutor,
    pipelines: Arc<HashMap<JobType, Arc<dyn JobPipeline>>>,
    limits: ExecutionLimits,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        executor: RetryingExecutor,
        pipelines: Vec<Arc<dyn JobPipeline>>,
        limits: ExecutionLimits,
    ) -> OrchestrationResult<Self> {
        let mut registered = HashMap::new();
        for pipeline in pipelines {
            let job_type = pipeline.job_type();
            if registered.insert(job_type, pipeline).is_some() {
                return Err(CoreError::new(
                    CoreErrorKind::Configuration,
                    format!("duplicate pipeline registration for job type '{job_type}'"),
                )
                .with_job_type(job_type));
            }
        }

        Ok(Self {
            store,
            executor,
            pipelines: Arc::new(registered),
            limits,
        })
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }

    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    pub fn pipeline(&self, job_type: JobType) -> Option<&Arc<dyn JobPipeline>> {
        self.pipelines.get(&job_type)
    }

    /// Runs every step of the job type's pipeline in order and finalizes the
    /// execution record. The first failed step aborts the rest.
    pub async fn run(
        &self,
        execution_id: ExecutionId,
        job_type: JobType,
        parameters: JobParameters,
    ) -> OrchestrationResult<JobResult> {
        let Some(pipeline) = self.pipeline(job_type).cloned() else {
            return self
                .fail(
                    execution_id,
                    job_type,
                    CoreErrorKind::InvalidInput,
                    format!("no pipeline registered for job type '{job_type}'"),
                )
                .await;
        };

        tracing::info!(
            execution_id = %execution_id,
            job_type = %job_type,
            steps = pipeline.steps().len(),
            "execution started"
        );

        let clock = Instant::now();
        let mut soft_warned = false;
        let mut results = StepResults::new();

        for agent in pipeline.steps() {
            let step_name = agent.name();
            let elapsed = clock.elapsed();
            if !soft_warned && elapsed >= self.limits.soft_timeout {
                soft_warned = true;
                self.warn_soft_timeout(execution_id, elapsed);
            }

            let remaining = self.limits.hard_timeout.saturating_sub(elapsed);
            if remaining.is_zero() {
                return self
                    .fail(
                        execution_id,
                        job_type,
                        CoreErrorKind::Timeout,
                        format!(
                            "execution exceeded hard timeout of {}s before step '{step_name}'",
                            self.limits.hard_timeout.as_secs()
                        ),
                    )
                    .await;
            }

            self.record_step_start(execution_id, step_name).await;

            let context = StepContext {
                execution_id,
                job_type,
                parameters: parameters.clone(),
                prior: results.clone(),
            };
            let budget = self.limits.step_timeout.min(remaining);
            let StepRun { outcome, timed_out } =
                self.run_step(agent.clone(), context, budget).await;

            self.record_step_completion(execution_id, step_name, outcome.to_step_completion())
                .await;

            let Outcome {
                status, data, error, ..
            } = outcome;
            match (status, data) {
                (OutcomeStatus::Success, Some(payload)) => {
                    results.insert(step_name.to_string(), payload);
                }
                _ => {
                    let kind = if timed_out {
                        CoreErrorKind::Timeout
                    } else {
                        CoreErrorKind::UnitFailure
                    };
                    let message = error.unwrap_or_else(|| format!("step '{step_name}' failed"));
                    return self.fail(execution_id, job_type, kind, message).await;
                }
            }
        }

        if !soft_warned && clock.elapsed() >= self.limits.soft_timeout {
            self.warn_soft_timeout(execution_id, clock.elapsed());
        }

        let result = match pipeline.assemble(&parameters, &results, SystemTime::now()) {
            Ok(result) => result,
            Err(error) => {
                return self
                    .fail(execution_id, job_type, error.kind, error.message)
                    .await;
            }
        };

        self.finalize(
            execution_id,
            ExecutionCompletion::Succeeded(result.clone()),
        )
        .await
        .map_err(|error| error.with_job_type(job_type))?;

        tracing::info!(
            execution_id = %execution_id,
            job_type = %job_type,
            duration_ms = clock.elapsed().as_millis() as u64,
            "execution succeeded"
        );
        Ok(result)
    }

    /// Finalizes an execution the orchestrator could not finish itself. A
    /// no-op when the record is already terminal.
    pub async fn abandon(
        &self,
        execution_id: ExecutionId,
        message: impl Into<String>,
    ) -> OrchestrationResult<WriteStatus> {
        self.finalize(execution_id, ExecutionCompletion::Failed(message.into()))
            .await
    }

    async fn run_step(
        &self,
        agent: Arc<dyn AnalysisAgent>,
        context: StepContext,
        budget: Duration,
    ) -> StepRun {
        let step_name = agent.name();
        let execution_id = context.execution_id;
        let started_at = SystemTime::now();
        let clock = Instant::now();
        let attempts = Arc::new(AtomicU32::new(0));
        let context = Arc::new(context);

        let run = self.executor.run(step_name, |attempt| {
            attempts.store(attempt, Ordering::SeqCst);
            let agent = agent.clone();
            let context = context.clone();
            async move {
                tokio::task::spawn_blocking(move || agent.execute(&context))
                    .await
                    .unwrap_or_else(|join_error| {
                        Err(UnitFailure::transient(format!(
                            "step '{step_name}' worker failed: {join_error}"
                        )))
                    })
            }
        });

        // A timed out attempt keeps running on the blocking pool until it
        // returns; its result is discarded.
        match tokio::time::timeout(budget, run).await {
            Ok(outcome) => StepRun {
                outcome,
                timed_out: false,
            },
            Err(_) => {
                let attempts_made = attempts.load(Ordering::SeqCst).max(1);
                tracing::error!(
                    execution_id = %execution_id,
                    step = step_name,
                    budget_ms = budget.as_millis() as u64,
                    attempts = attempts_made,
                    "step timed out"
                );
                StepRun {
                    outcome: Outcome::failure(
                        format!(
                            "step '{step_name}' timed out after {:.1}s",
                            budget.as_secs_f64()
                        ),
                        OutcomeMetadata {
                            started_at,
                            duration: clock.elapsed(),
                            retries_used: attempts_made - 1,
                        },
                    ),
                    timed_out: true,
                }
            }
        }
    }

    async fn fail(
        &self,
        execution_id: ExecutionId,
        job_type: JobType,
        kind: CoreErrorKind,
        message: String,
    ) -> OrchestrationResult<JobResult> {
        tracing::error!(
            execution_id = %execution_id,
            job_type = %job_type,
            kind = ?kind,
            message = %message,
            "execution failed"
        );
        self.finalize(execution_id, ExecutionCompletion::Failed(message.clone()))
            .await
            .map_err(|error| error.with_job_type(job_type))?;

        Err(CoreError::new(kind, message)
            .with_job_type(job_type)
            .with_execution(execution_id))
    }

    async fn finalize(
        &self,
        execution_id: ExecutionId,
        completion: ExecutionCompletion,
    ) -> OrchestrationResult<WriteStatus> {
        let status = blocking_store_call(&self.store, "complete_execution", move |store| {
            store.complete_execution(execution_id, completion)
        })
        .await
        .map_err(|error| error.with_execution(execution_id))?;

        if status == WriteStatus::Ignored {
            tracing::debug!(
                execution_id = %execution_id,
                "execution already finalized or expired; completion ignored"
            );
        }
        Ok(status)
    }

    async fn record_step_start(&self, execution_id: ExecutionId, step_name: &'static str) {
        let written = blocking_store_call(&self.store, "start_step", move |store| {
            store.start_step(execution_id, step_name)
        })
        .await;
        log_step_write(execution_id, step_name, "start", written);
    }

    async fn record_step_completion(
        &self,
        execution_id: ExecutionId,
        step_name: &'static str,
        completion: StepCompletion,
    ) {
        let written = blocking_store_call(&self.store, "complete_step", move |store| {
            store.complete_step(execution_id, step_name, completion)
        })
        .await;
        log_step_write(execution_id, step_name, "completion", written);
    }

    fn warn_soft_timeout(&self, execution_id: ExecutionId, elapsed: Duration) {
        tracing::warn!(
            execution_id = %execution_id,
            elapsed_secs = elapsed.as_secs(),
            soft_timeout_secs = self.limits.soft_timeout.as_secs(),
            "execution passed its soft time limit"
        );
    }
}

/// Step bookkeeping is telemetry: a failed write is logged and the pipeline
/// keeps going.
fn log_step_write(
    execution_id: ExecutionId,
    step_name: &str,
    phase: &str,
    written: OrchestrationResult<WriteStatus>,
) {
    match written {
        Ok(WriteStatus::Applied) => {
            tracing::debug!(execution_id = %execution_id, step = step_name, phase, "step recorded");
        }
        Ok(WriteStatus::Ignored) => {
            tracing::warn!(
                execution_id = %execution_id,
                step = step_name,
                phase,
                "step write ignored by the execution store"
            );
        }
        Err(error) => {
            tracing::warn!(
                execution_id = %execution_id,
                step = step_name,
                phase,
                error = %error,
                "failed to record step"
            );
        }
    }
}
