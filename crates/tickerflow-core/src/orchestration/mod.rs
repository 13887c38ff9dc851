pub mod dispatcher;
pub mod pipeline;
pub mod retry;
pub mod runtime_queue;

pub use dispatcher::{Dispatcher, ExecutionSteps};
pub use pipeline::{ExecutionLimits, JobPipeline, Orchestrator, StepResults};
pub use retry::{Outcome, OutcomeMetadata, OutcomeStatus, RetryPolicy, RetryingExecutor};
pub use runtime_queue::{JobOperation, JobQueue, JobSnapshot, JobSubmission, QueueStatus};

use std::sync::Arc;

use crate::models::{CoreError, CoreErrorKind};
use crate::persistence::{ExecutionStore, PersistenceResult};

pub type OrchestrationResult<T> = Result<T, CoreError>;

/// Runs a synchronous store call on the blocking pool so SQLite I/O never
/// stalls a runtime worker.
pub(crate) async fn blocking_store_call<T, F>(
    store: &Arc<dyn ExecutionStore>,
    operation: &'static str,
    call: F,
) -> OrchestrationResult<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn ExecutionStore) -> PersistenceResult<T> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || call(store.as_ref()))
        .await
        .map_err(|join_error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("execution store '{operation}' join failure: {join_error}"),
            )
        })?
}
