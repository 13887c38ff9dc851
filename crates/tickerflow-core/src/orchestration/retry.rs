use std::future::Future;
use std::time::{Duration, Instant, SystemTime};

use crate::models::{StepCompletion, StepPayload, UnitResult};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Bounded attempts with a constant pause between them. There is no
/// backoff growth.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutcomeStatus {
    Success,
    Failed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OutcomeMetadata {
    pub started_at: SystemTime,
    pub duration: Duration,
    pub retries_used: u32,
}

/// Uniform envelope for one unit of work, whatever its payload type.
#[derive(Clone, Debug, PartialEq)]
pub struct Outcome<T> {
    pub status: OutcomeStatus,
    pub data: Option<T>,
    pub error: Option<String>,
    pub metadata: OutcomeMetadata,
}

impl<T> Outcome<T> {
    pub fn success(data: T, metadata: OutcomeMetadata) -> Self {
        Self {
            status: OutcomeStatus::Success,
            data: Some(data),
            error: None,
            metadata,
        }
    }

    pub fn failure(error: impl Into<String>, metadata: OutcomeMetadata) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            data: None,
            error: Some(error.into()),
            metadata,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

impl Outcome<StepPayload> {
    pub fn to_step_completion(&self) -> StepCompletion {
        match self.status {
            OutcomeStatus::Success => StepCompletion::Succeeded {
                payload: self.data.clone(),
                retries_used: self.metadata.retries_used,
            },
            OutcomeStatus::Failed => StepCompletion::Failed {
                error: self
                    .error
                    .clone()
                    .unwrap_or_else(|| "unit of work failed".to_string()),
                retries_used: self.metadata.retries_used,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RetryingExecutor {
    policy: RetryPolicy,
}

impl RetryingExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Runs `attempt` until it succeeds, signals a non-retriable failure, or
    /// `max_retries` attempts have failed. The attempt number (starting at 1)
    /// is passed to each invocation. Only the last failure message is kept.
    pub async fn run<T, F, Fut>(&self, unit_name: &str, mut attempt: F) -> Outcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = UnitResult<T>>,
    {
        let max_attempts = self.policy.max_retries.max(1);
        let started_at = SystemTime::now();
        let clock = Instant::now();
        let mut attempts_made = 0;
        let mut last_error = String::new();

        for attempt_number in 1..=max_attempts {
            attempts_made = attempt_number;
            tracing::debug!(
                unit = unit_name,
                attempt = attempt_number,
                max_attempts,
                "running unit of work"
            );

            match attempt(attempt_number).await {
                Ok(data) => {
                    let metadata = OutcomeMetadata {
                        started_at,
                        duration: clock.elapsed(),
                        retries_used: attempt_number - 1,
                    };
                    tracing::debug!(
                        unit = unit_name,
                        retries_used = metadata.retries_used,
                        duration_ms = metadata.duration.as_millis() as u64,
                        "unit of work succeeded"
                    );
                    return Outcome::success(data, metadata);
                }
                Err(failure) => {
                    tracing::warn!(
                        unit = unit_name,
                        attempt = attempt_number,
                        retriable = failure.retriable,
                        message = %failure.message,
                        "unit of work attempt failed"
                    );
                    last_error = failure.message;
                    if !failure.retriable {
                        break;
                    }
                    if attempt_number < max_attempts {
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                }
            }
        }

        let metadata = OutcomeMetadata {
            started_at,
            duration: clock.elapsed(),
            retries_used: attempts_made.saturating_sub(1),
        };
        tracing::error!(
            unit = unit_name,
            attempts = attempts_made,
            message = %last_error,
            "unit of work failed"
        );
        Outcome::failure(last_error, metadata)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::{OutcomeStatus, RetryPolicy, RetryingExecutor};
    use crate::models::UnitFailure;

    fn executor(max_retries: u32, delay_ms: u64) -> RetryingExecutor {
        RetryingExecutor::new(RetryPolicy {
            max_retries,
            retry_delay: Duration::from_millis(delay_ms),
        })
    }

    #[tokio::test]
    async fn first_try_success_uses_no_retries() {
        let outcome = executor(3, 1)
            .run("unit", |_| async { Ok::<_, UnitFailure>(42) })
            .await;

        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.data, Some(42));
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.metadata.retries_used, 0);
    }

    #[tokio::test]
    async fn succeeds_on_nth_attempt_and_reports_retries() {
        for succeed_on in 1..=3u32 {
            let calls = Arc::new(AtomicU32::new(0));
            let outcome = executor(3, 1)
                .run("unit", |attempt| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        if attempt < succeed_on {
                            Err(UnitFailure::transient(format!("attempt {attempt} failed")))
                        } else {
                            Ok(attempt)
                        }
                    }
                })
                .await;

            assert_eq!(outcome.status, OutcomeStatus::Success);
            assert_eq!(outcome.metadata.retries_used, succeed_on - 1);
            assert_eq!(calls.load(Ordering::SeqCst), succeed_on);
        }
    }

    #[tokio::test]
    async fn exhausted_retries_surface_only_the_last_message() {
        let calls = Arc::new(AtomicU32::new(0));
        let outcome = executor(3, 1)
            .run("unit", |attempt| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(UnitFailure::transient(format!("boom {attempt}")))
                }
            })
            .await;

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.data, None);
        assert_eq!(outcome.error.as_deref(), Some("boom 3"));
        assert_eq!(outcome.metadata.retries_used, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retriable_failure_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let outcome = executor(5, 1)
            .run("unit", |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(UnitFailure::invalid("missing symbol"))
                }
            })
            .await;

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.metadata.retries_used, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delay_applies_between_attempts_only() {
        let outcome = executor(3, 40)
            .run("unit", |_| async {
                Err::<(), _>(UnitFailure::transient("down"))
            })
            .await;

        let elapsed = outcome.metadata.duration;
        assert!(elapsed >= Duration::from_millis(80), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(120 + 500), "{elapsed:?}");
    }
}
