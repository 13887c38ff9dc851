use crate::models::{ExecutionId, JobType};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    Validation,
    InvalidInput,
    UnknownJobType,
    UnknownExecution,
    UnitFailure,
    Timeout,
    StorageFailure,
    Configuration,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub job_type: Option<JobType>,
    pub execution_id: Option<ExecutionId>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            job_type: None,
            execution_id: None,
            kind,
            message: message.into(),
        }
    }

    pub fn with_job_type(mut self, job_type: JobType) -> Self {
        self.job_type = self.job_type.or(Some(job_type));
        self
    }

    pub fn with_execution(mut self, execution_id: ExecutionId) -> Self {
        self.execution_id = self.execution_id.or(Some(execution_id));
        self
    }
}

/// Failure signalled by one attempt of a unit of work.
///
/// Retriable failures are retried by the executor up to its bound;
/// non-retriable ones (invalid job parameters) end the loop at once.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct UnitFailure {
    pub retriable: bool,
    pub message: String,
}

impl UnitFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            retriable: true,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            retriable: false,
            message: message.into(),
        }
    }
}

pub type UnitResult<T> = Result<T, UnitFailure>;
