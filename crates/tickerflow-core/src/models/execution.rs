use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::timestamp::{elapsed_seconds, rfc3339, rfc3339_option};
use crate::models::{JobParameters, JobResult, JobType, StepPayload};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for ExecutionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ExecutionId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim()).map(Self)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl FromStr for ExecutionStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub step_name: String,
    pub status: ExecutionStatus,
    #[serde(with = "rfc3339")]
    pub started_at: SystemTime,
    #[serde(with = "rfc3339_option")]
    pub completed_at: Option<SystemTime>,
    pub duration_seconds: Option<f64>,
    pub retries_used: Option<u32>,
    pub result: Option<StepPayload>,
    pub error: Option<String>,
}

impl StepExecution {
    pub fn running(step_name: impl Into<String>, started_at: SystemTime) -> Self {
        Self {
            step_name: step_name.into(),
            status: ExecutionStatus::Running,
            started_at,
            completed_at: None,
            duration_seconds: None,
            retries_used: None,
            result: None,
            error: None,
        }
    }

    /// Moves a running step to its terminal state. Returns `false` when the
    /// step had already finished.
    pub fn finish(&mut self, completion: StepCompletion, at: SystemTime) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        self.completed_at = Some(at);
        self.duration_seconds = Some(elapsed_seconds(self.started_at, at));
        match completion {
            StepCompletion::Succeeded {
                payload,
                retries_used,
            } => {
                self.status = ExecutionStatus::Success;
                self.retries_used = Some(retries_used);
                self.result = payload;
            }
            StepCompletion::Failed {
                error,
                retries_used,
            } => {
                self.status = ExecutionStatus::Failed;
                self.retries_used = Some(retries_used);
                self.error = Some(error);
            }
        }
        true
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: ExecutionId,
    pub job_type: JobType,
    pub status: ExecutionStatus,
    #[serde(with = "rfc3339")]
    pub started_at: SystemTime,
    #[serde(with = "rfc3339_option")]
    pub completed_at: Option<SystemTime>,
    pub duration_seconds: Option<f64>,
    pub parameters: JobParameters,
    pub steps: Vec<StepExecution>,
    pub result: Option<JobResult>,
    pub error_message: Option<String>,
}

impl ExecutionRecord {
    pub fn new(
        execution_id: ExecutionId,
        job_type: JobType,
        parameters: JobParameters,
        started_at: SystemTime,
    ) -> Self {
        Self {
            execution_id,
            job_type,
            status: ExecutionStatus::Running,
            started_at,
            completed_at: None,
            duration_seconds: None,
            parameters,
            steps: Vec::new(),
            result: None,
            error_message: None,
        }
    }

    pub fn step(&self, step_name: &str) -> Option<&StepExecution> {
        self.steps.iter().rev().find(|step| step.step_name == step_name)
    }

    /// Appends a running step unless the execution already finished or a
    /// step with the same name is still running.
    pub fn begin_step(&mut self, step_name: &str, at: SystemTime) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if self
            .steps
            .iter()
            .any(|step| step.step_name == step_name && step.status == ExecutionStatus::Running)
        {
            return false;
        }
        self.steps.push(StepExecution::running(step_name, at));
        true
    }

    pub fn finish_step(
        &mut self,
        step_name: &str,
        completion: StepCompletion,
        at: SystemTime,
    ) -> bool {
        self.steps
            .iter_mut()
            .rev()
            .find(|step| step.step_name == step_name && step.status == ExecutionStatus::Running)
            .is_some_and(|step| step.finish(completion, at))
    }

    /// Applies the single RUNNING -> terminal transition. A failing
    /// completion also closes any step left running.
    pub fn finish(&mut self, completion: ExecutionCompletion, at: SystemTime) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        self.completed_at = Some(at);
        self.duration_seconds = Some(elapsed_seconds(self.started_at, at));
        match completion {
            ExecutionCompletion::Succeeded(result) => {
                self.status = ExecutionStatus::Success;
                self.result = Some(result);
            }
            ExecutionCompletion::Failed(message) => {
                for step in self
                    .steps
                    .iter_mut()
                    .filter(|step| step.status == ExecutionStatus::Running)
                {
                    step.finish(
                        StepCompletion::Failed {
                            error: format!("execution finished before step completed: {message}"),
                            retries_used: 0,
                        },
                        at,
                    );
                }
                self.status = ExecutionStatus::Failed;
                self.error_message = Some(message);
            }
        }
        true
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StepCompletion {
    Succeeded {
        payload: Option<StepPayload>,
        retries_used: u32,
    },
    Failed {
        error: String,
        retries_used: u32,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExecutionCompletion {
    Succeeded(JobResult),
    Failed(String),
}
