use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use tickerflow_core::models::{CoreError, CoreErrorKind, ExecutionId, JobType};
use tickerflow_core::orchestration::{
    JobOperation, JobQueue, JobSubmission, OrchestrationResult, QueueStatus,
};

fn submission() -> JobSubmission {
    JobSubmission {
        execution_id: ExecutionId::generate(),
        job_type: JobType::AnalyzeStock,
        requested_at: SystemTime::now(),
    }
}

fn operation<Fut>(future: Fut) -> JobOperation
where
    Fut: Future<Output = OrchestrationResult<()>> + Send + 'static,
{
    Box::pin(future)
}

fn tracked_sleep(current: &Arc<AtomicUsize>, peak: &Arc<AtomicUsize>) -> JobOperation {
    let current = current.clone();
    let peak = peak.clone();
    operation(async move {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;
        current.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    })
}

#[tokio::test]
async fn jobs_beyond_the_limit_wait_for_a_permit() {
    let queue = JobQueue::new(2);
    assert_eq!(queue.max_concurrent(), 2);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(
            queue
                .spawn(submission(), tracked_sleep(&current, &peak))
                .await
                .unwrap(),
        );
    }

    for id in ids {
        let snapshot = queue
            .wait_for_terminal(id, Some(Duration::from_secs(2)))
            .await
            .unwrap();
        assert_eq!(snapshot.status, QueueStatus::Completed);
        assert!(snapshot.started_at.is_some() && snapshot.finished_at.is_some());
    }
    assert_eq!(peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn independent_jobs_run_in_parallel() {
    let queue = JobQueue::new(4);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let first = queue
        .spawn(submission(), tracked_sleep(&current, &peak))
        .await
        .unwrap();
    let second = queue
        .spawn(submission(), tracked_sleep(&current, &peak))
        .await
        .unwrap();

    queue
        .wait_for_terminal(first, Some(Duration::from_secs(1)))
        .await
        .unwrap();
    queue
        .wait_for_terminal(second, Some(Duration::from_secs(1)))
        .await
        .unwrap();

    assert!(peak.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn failing_operation_marks_job_failed_with_message() {
    let queue = JobQueue::default();
    let id = queue
        .spawn(
            submission(),
            operation(async {
                Err(CoreError::new(
                    CoreErrorKind::UnitFailure,
                    "simulated pipeline failure",
                ))
            }),
        )
        .await
        .unwrap();

    let snapshot = queue
        .wait_for_terminal(id, Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(snapshot.status, QueueStatus::Failed);
    assert_eq!(
        snapshot.error_message.as_deref(),
        Some("simulated pipeline failure")
    );
}

#[tokio::test]
async fn waiting_times_out_while_job_is_still_running() {
    let queue = JobQueue::default();
    let id = queue
        .spawn(
            submission(),
            operation(async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(())
            }),
        )
        .await
        .unwrap();

    let error = queue
        .wait_for_terminal(id, Some(Duration::from_millis(20)))
        .await
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::Timeout);
    assert_eq!(error.execution_id, Some(id));

    let snapshot = queue.wait_for_terminal(id, None).await.unwrap();
    assert_eq!(snapshot.status, QueueStatus::Completed);
}

#[tokio::test]
async fn duplicate_and_unknown_ids_are_rejected() {
    let queue = JobQueue::default();
    let job = submission();
    queue.spawn(job, operation(async { Ok(()) })).await.unwrap();

    let duplicate = queue
        .spawn(job, operation(async { Ok(()) }))
        .await
        .unwrap_err();
    assert_eq!(duplicate.kind, CoreErrorKind::InvalidInput);

    let unknown = queue.snapshot(ExecutionId::generate()).await.unwrap_err();
    assert_eq!(unknown.kind, CoreErrorKind::UnknownExecution);
}

#[tokio::test]
async fn finished_snapshots_beyond_retention_are_evicted() {
    let queue = JobQueue::new(1).with_retention(2);

    let mut ids = Vec::new();
    for _ in 0..3 {
        let id = queue
            .spawn(submission(), operation(async { Ok(()) }))
            .await
            .unwrap();
        queue
            .wait_for_terminal(id, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        ids.push(id);
    }

    assert!(!queue.contains(ids[0]).await);
    assert_eq!(queue.status(ids[2]).await.unwrap(), QueueStatus::Completed);
}
