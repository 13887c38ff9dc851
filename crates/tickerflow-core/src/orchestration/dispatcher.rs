use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::agents::{AnalyzeStockPipeline, MarketDataSource};
use crate::config::CoreConfig;
use crate::models::{
    CoreError, CoreErrorKind, ExecutionId, ExecutionRecord, ExecutionStatus, JobHandle,
    JobRequest, JobType, JobTypeDescriptor, JobTypeStatus, StepExecution,
};
use crate::orchestration::{
    JobOperation, JobPipeline, JobQueue, JobSubmission, OrchestrationResult, Orchestrator,
    RetryingExecutor, blocking_store_call,
};
use crate::persistence::ExecutionStore;
use crate::registry;

pub const DEFAULT_LIST_LIMIT: usize = 50;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExecutionSteps {
    pub execution_id: ExecutionId,
    pub steps: Vec<StepExecution>,
}

/// Entry point for job submission and status queries. `submit` returns as
/// soon as the record exists; the pipeline runs on the queue.
#[derive(Clone)]
pub struct Dispatcher {
    orchestrator: Orchestrator,
    queue: JobQueue,
}

impl Dispatcher {
    pub fn new(orchestrator: Orchestrator, queue: JobQueue) -> Self {
        Self {
            orchestrator,
            queue,
        }
    }

    pub fn from_config(
        config: &CoreConfig,
        store: Arc<dyn ExecutionStore>,
        source: Arc<dyn MarketDataSource>,
    ) -> OrchestrationResult<Self> {
        let pipelines: Vec<Arc<dyn JobPipeline>> =
            vec![Arc::new(AnalyzeStockPipeline::new(source))];
        let orchestrator = Orchestrator::new(
            store,
            RetryingExecutor::new(config.retry_policy()),
            pipelines,
            config.execution_limits(),
        )?;

        Ok(Self::new(
            orchestrator,
            JobQueue::new(config.max_concurrent_jobs),
        ))
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub async fn submit(&self, request: JobRequest) -> OrchestrationResult<JobHandle> {
        let job_type: JobType = request.job_type.parse()?;
        if registry::descriptor(job_type).status != JobTypeStatus::Active {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("job type '{job_type}' is not available yet"),
            )
            .with_job_type(job_type));
        }
        let pipeline = self.orchestrator.pipeline(job_type).ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("no pipeline registered for job type '{job_type}'"),
            )
            .with_job_type(job_type)
        })?;
        pipeline.validate(&request.parameters)?;

        let parameters = request.parameters;
        let execution_id = {
            let parameters = parameters.clone();
            blocking_store_call(self.orchestrator.store(), "create", move |store| {
                store.create(job_type, &parameters)
            })
            .await
            .map_err(|error| error.with_job_type(job_type))?
        };

        let orchestrator = self.orchestrator.clone();
        let operation: JobOperation = Box::pin(async move {
            let backstop = orchestrator.limits().backstop();
            let run = tokio::spawn({
                let orchestrator = orchestrator.clone();
                async move { orchestrator.run(execution_id, job_type, parameters).await }
            });
            let abort = run.abort_handle();

            let failure = match tokio::time::timeout(backstop, run).await {
                Ok(Ok(Ok(_))) => return Ok(()),
                Ok(Ok(Err(error))) => error,
                Ok(Err(join_error)) => CoreError::new(
                    CoreErrorKind::Internal,
                    format!("execution worker failed: {join_error}"),
                ),
                Err(_) => {
                    abort.abort();
                    CoreError::new(
                        CoreErrorKind::Timeout,
                        format!(
                            "execution exceeded hard timeout of {}s",
                            orchestrator.limits().hard_timeout.as_secs()
                        ),
                    )
                }
            };

            // The orchestrator normally finalizes the record itself; this
            // only lands when it could not.
            if let Err(error) = orchestrator
                .abandon(execution_id, failure.message.clone())
                .await
            {
                tracing::error!(
                    execution_id = %execution_id,
                    error = %error,
                    "failed to finalize abandoned execution"
                );
            }
            Err(failure.with_job_type(job_type).with_execution(execution_id))
        });

        self.queue
            .spawn(
                JobSubmission {
                    execution_id,
                    job_type,
                    requested_at: SystemTime::now(),
                },
                operation,
            )
            .await?;

        tracing::info!(
            execution_id = %execution_id,
            job_type = %job_type,
            "job submitted"
        );
        Ok(JobHandle {
            execution_id,
            job_type,
            status: ExecutionStatus::Running,
            message: format!("Job {job_type} started successfully"),
        })
    }

    pub async fn get(
        &self,
        execution_id: ExecutionId,
    ) -> OrchestrationResult<Option<ExecutionRecord>> {
        blocking_store_call(self.orchestrator.store(), "get", move |store| {
            store.get(execution_id)
        })
        .await
    }

    pub async fn list(&self, limit: usize) -> OrchestrationResult<Vec<ExecutionRecord>> {
        blocking_store_call(self.orchestrator.store(), "list", move |store| store.list(limit)).await
    }

    pub async fn steps(
        &self,
        execution_id: ExecutionId,
    ) -> OrchestrationResult<Option<ExecutionSteps>> {
        Ok(self.get(execution_id).await?.map(|record| ExecutionSteps {
            execution_id: record.execution_id,
            steps: record.steps,
        }))
    }

    pub fn job_types(&self) -> &'static [JobTypeDescriptor] {
        registry::job_types()
    }

    /// Waits until the execution's queued run finishes, then returns the
    /// stored record. Executions this dispatcher did not submit are read
    /// straight from the store.
    pub async fn wait_for_completion(
        &self,
        execution_id: ExecutionId,
        timeout: Option<Duration>,
    ) -> OrchestrationResult<ExecutionRecord> {
        if self.queue.contains(execution_id).await {
            self.queue.wait_for_terminal(execution_id, timeout).await?;
        }

        self.get(execution_id).await?.ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::UnknownExecution,
                format!("execution '{execution_id}' was not found or has expired"),
            )
            .with_execution(execution_id)
        })
    }

    pub async fn purge_expired(&self) -> OrchestrationResult<usize> {
        let purged =
            blocking_store_call(self.orchestrator.store(), "purge_expired", |store| {
                store.purge_expired()
            })
            .await?;
        if purged > 0 {
            tracing::info!(purged, "purged expired execution records");
        }
        Ok(purged)
    }
}
