pub mod in_memory;

use std::time::Duration;

use crate::models::{
    CoreError, ExecutionCompletion, ExecutionId, ExecutionRecord, JobParameters, JobType,
    StepCompletion,
};

pub use in_memory::InMemoryExecutionStore;

pub type PersistenceResult<T> = Result<T, CoreError>;

pub const DEFAULT_RECORD_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Result of a mutating store call. `Ignored` covers unknown or expired
/// executions and transitions that were already applied.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteStatus {
    Applied,
    Ignored,
}

impl WriteStatus {
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

pub trait MigrationStore: Send + Sync {
    fn current_version(&self) -> PersistenceResult<i64>;

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()>;
}

/// Keyed store owning the canonical copy of every execution record.
///
/// Every mutation is one read-modify-write serialized per execution id and
/// pushes that record's expiry out to the store TTL. Records past their
/// expiry are invisible to reads and skipped by `list`; `create` reclaims
/// them, so the backing storage stays bounded without an explicit purge.
pub trait ExecutionStore: Send + Sync {
    fn create(
        &self,
        job_type: JobType,
        parameters: &JobParameters,
    ) -> PersistenceResult<ExecutionId>;

    fn get(&self, execution_id: ExecutionId) -> PersistenceResult<Option<ExecutionRecord>>;

    fn list(&self, limit: usize) -> PersistenceResult<Vec<ExecutionRecord>>;

    fn start_step(
        &self,
        execution_id: ExecutionId,
        step_name: &str,
    ) -> PersistenceResult<WriteStatus>;

    fn complete_step(
        &self,
        execution_id: ExecutionId,
        step_name: &str,
        completion: StepCompletion,
    ) -> PersistenceResult<WriteStatus>;

    fn complete_execution(
        &self,
        execution_id: ExecutionId,
        completion: ExecutionCompletion,
    ) -> PersistenceResult<WriteStatus>;

    fn purge_expired(&self) -> PersistenceResult<usize>;
}
