use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tickerflow_core::models::{
    Action, ExecutionCompletion, ExecutionId, ExecutionStatus, JobParameters, JobResult, JobType,
    StepCompletion, StockReport,
};
use tickerflow_core::persistence::{ExecutionStore, InMemoryExecutionStore, WriteStatus};
use tickerflow_core::sqlite::SqliteExecutionStore;

fn test_db_path(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("tickerflow-{test_name}-{nanos}.sqlite3"))
}

fn sqlite_store(test_name: &str, ttl: Duration) -> Arc<dyn ExecutionStore> {
    let store = SqliteExecutionStore::with_ttl(test_db_path(test_name), ttl);
    store.migrate_to_latest().expect("migrations should apply");
    Arc::new(store)
}

fn memory_store(ttl: Duration) -> Arc<dyn ExecutionStore> {
    Arc::new(InMemoryExecutionStore::with_ttl(ttl))
}

fn backends(test_name: &str, ttl: Duration) -> Vec<(&'static str, Arc<dyn ExecutionStore>)> {
    vec![
        ("in_memory", memory_store(ttl)),
        ("sqlite", sqlite_store(test_name, ttl)),
    ]
}

fn parameters() -> JobParameters {
    JobParameters::new().with("symbol", "AAPL")
}

fn succeeded(retries_used: u32) -> StepCompletion {
    StepCompletion::Succeeded {
        payload: None,
        retries_used,
    }
}

fn placeholder_result() -> JobResult {
    serde_json::from_value(serde_json::json!({
        "job_type": "analyze_stock",
        "symbol": "AAPL",
        "analyzed_at": "2026-01-05T14:30:00Z",
        "recommendation": "HOLD",
        "overall_score": 5.5,
        "confidence": 0.8,
        "technical": {
            "latest_close": 190.0,
            "rsi": 55.0,
            "sma_20": 188.0,
            "sma_50": 185.0,
            "macd": "bullish",
            "trend": "uptrend",
            "period_return_pct": 12.5,
            "score": 8.5
        },
        "fundamental": {
            "company_name": "Apple Inc.",
            "sector": "Technology",
            "pe_trailing": 29.0,
            "revenue_growth": 0.05,
            "profit_margin": 0.25,
            "debt_to_equity": 1.5,
            "scores": {
                "valuation": 4.0,
                "profitability": 9.0,
                "growth": 5.5,
                "financial_health": 5.0,
                "overall": 5.9
            },
            "rating": "HOLD",
            "strengths": ["Profitability"],
            "weaknesses": []
        },
        "news_sentiment": {
            "sentiment": "neutral",
            "sentiment_score": 0.0,
            "recent_news_count": 0,
            "headlines": []
        }
    }))
    .expect("fixture should decode")
}

#[test]
fn created_record_starts_running_with_no_steps() {
    for (backend, store) in backends("create", Duration::from_secs(60)) {
        let execution_id = store.create(JobType::AnalyzeStock, &parameters()).unwrap();
        let record = store.get(execution_id).unwrap().expect(backend);

        assert_eq!(record.execution_id, execution_id, "{backend}");
        assert_eq!(record.status, ExecutionStatus::Running, "{backend}");
        assert!(record.steps.is_empty(), "{backend}");
        assert!(record.completed_at.is_none(), "{backend}");
        assert!(record.result.is_none() && record.error_message.is_none(), "{backend}");
        assert_eq!(record.parameters.get_str("symbol"), Some("AAPL"), "{backend}");
    }
}

#[test]
fn unknown_ids_read_as_missing_and_ignore_writes() {
    for (backend, store) in backends("unknown", Duration::from_secs(60)) {
        let unknown = ExecutionId::generate();

        assert!(store.get(unknown).unwrap().is_none(), "{backend}");
        assert_eq!(
            store.start_step(unknown, "technical_agent").unwrap(),
            WriteStatus::Ignored,
            "{backend}"
        );
        assert_eq!(
            store
                .complete_step(unknown, "technical_agent", succeeded(0))
                .unwrap(),
            WriteStatus::Ignored,
            "{backend}"
        );
        assert_eq!(
            store
                .complete_execution(unknown, ExecutionCompletion::Failed("x".to_string()))
                .unwrap(),
            WriteStatus::Ignored,
            "{backend}"
        );
    }
}

#[test]
fn list_returns_newest_first_and_respects_limit() {
    for (backend, store) in backends("list", Duration::from_secs(60)) {
        let ids: Vec<_> = (0..4)
            .map(|_| {
                let id = store.create(JobType::AnalyzeStock, &parameters()).unwrap();
                std::thread::sleep(Duration::from_millis(2));
                id
            })
            .collect();

        let listed: Vec<_> = store
            .list(3)
            .unwrap()
            .into_iter()
            .map(|record| record.execution_id)
            .collect();
        assert_eq!(listed, vec![ids[3], ids[2], ids[1]], "{backend}");
        assert!(store.list(0).unwrap().is_empty(), "{backend}");
    }
}

#[test]
fn steps_are_append_only_and_names_do_not_overlap_while_running() {
    for (backend, store) in backends("steps", Duration::from_secs(60)) {
        let id = store.create(JobType::AnalyzeStock, &parameters()).unwrap();

        assert!(store.start_step(id, "technical_agent").unwrap().is_applied());
        assert_eq!(
            store.start_step(id, "technical_agent").unwrap(),
            WriteStatus::Ignored,
            "{backend}"
        );
        assert!(store.complete_step(id, "technical_agent", succeeded(1)).unwrap().is_applied());
        assert_eq!(
            store.complete_step(id, "technical_agent", succeeded(0)).unwrap(),
            WriteStatus::Ignored,
            "{backend}"
        );
        assert!(store.start_step(id, "fundamental_agent").unwrap().is_applied());

        let record = store.get(id).unwrap().unwrap();
        let names: Vec<_> = record.steps.iter().map(|step| step.step_name.as_str()).collect();
        assert_eq!(names, vec!["technical_agent", "fundamental_agent"], "{backend}");
        assert_eq!(record.steps[0].status, ExecutionStatus::Success, "{backend}");
        assert_eq!(record.steps[0].retries_used, Some(1), "{backend}");
        assert!(record.steps[0].duration_seconds.is_some(), "{backend}");
        assert_eq!(record.steps[1].status, ExecutionStatus::Running, "{backend}");
    }
}

#[test]
fn complete_execution_applies_exactly_once() {
    for (backend, store) in backends("complete-once", Duration::from_secs(60)) {
        let id = store.create(JobType::AnalyzeStock, &parameters()).unwrap();

        let first = store
            .complete_execution(id, ExecutionCompletion::Succeeded(placeholder_result()))
            .unwrap();
        let second = store
            .complete_execution(id, ExecutionCompletion::Failed("late failure".to_string()))
            .unwrap();
        assert_eq!(first, WriteStatus::Applied, "{backend}");
        assert_eq!(second, WriteStatus::Ignored, "{backend}");

        let record = store.get(id).unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Success, "{backend}");
        assert!(record.error_message.is_none(), "{backend}");
        assert!(record.completed_at.is_some(), "{backend}");
        let Some(JobResult::AnalyzeStock(StockReport { recommendation, .. })) = record.result
        else {
            panic!("{backend}: result should be set");
        };
        assert_eq!(recommendation, Action::Hold, "{backend}");

        assert_eq!(
            store.start_step(id, "late_step").unwrap(),
            WriteStatus::Ignored,
            "{backend}"
        );
    }
}

#[test]
fn failed_completion_closes_running_steps() {
    for (backend, store) in backends("close-dangling", Duration::from_secs(60)) {
        let id = store.create(JobType::AnalyzeStock, &parameters()).unwrap();
        store.start_step(id, "news_agent").unwrap();
        store
            .complete_execution(id, ExecutionCompletion::Failed("hard timeout".to_string()))
            .unwrap();

        let record = store.get(id).unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Failed, "{backend}");
        assert_eq!(record.error_message.as_deref(), Some("hard timeout"), "{backend}");
        assert_eq!(record.steps[0].status, ExecutionStatus::Failed, "{backend}");
        assert!(
            record.steps[0]
                .error
                .as_deref()
                .is_some_and(|error| error.contains("hard timeout")),
            "{backend}"
        );
    }
}

#[test]
fn concurrent_step_completions_are_not_lost() {
    let step_names = ["technical_agent", "fundamental_agent", "news_agent", "aggregation_agent"];

    for (backend, store) in backends("concurrent-steps", Duration::from_secs(60)) {
        let id = store.create(JobType::AnalyzeStock, &parameters()).unwrap();
        for name in step_names {
            store.start_step(id, name).unwrap();
        }

        let barrier = Arc::new(Barrier::new(step_names.len()));
        let handles: Vec<_> = step_names
            .iter()
            .map(|name| {
                let store = store.clone();
                let barrier = barrier.clone();
                let name = name.to_string();
                std::thread::spawn(move || {
                    barrier.wait();
                    store.complete_step(id, &name, succeeded(0))
                })
            })
            .collect();
        for handle in handles {
            let status = handle.join().expect("writer thread panicked").unwrap();
            assert_eq!(status, WriteStatus::Applied, "{backend}");
        }

        let record = store.get(id).unwrap().unwrap();
        assert_eq!(record.steps.len(), step_names.len(), "{backend}");
        assert!(
            record
                .steps
                .iter()
                .all(|step| step.status == ExecutionStatus::Success),
            "{backend}: {:?}",
            record.steps
        );
    }
}

#[test]
fn expired_records_disappear_and_purge_removes_them() {
    for (backend, store) in backends("expiry", Duration::from_millis(150)) {
        let expired = store.create(JobType::AnalyzeStock, &parameters()).unwrap();
        std::thread::sleep(Duration::from_millis(250));

        assert!(store.get(expired).unwrap().is_none(), "{backend}");
        assert_eq!(
            store.start_step(expired, "technical_agent").unwrap(),
            WriteStatus::Ignored,
            "{backend}"
        );
        assert!(store.list(10).unwrap().is_empty(), "{backend}");

        assert_eq!(store.purge_expired().unwrap(), 1, "{backend}");
        assert_eq!(store.purge_expired().unwrap(), 0, "{backend}");
    }
}

#[test]
fn create_reclaims_expired_records() {
    for (backend, store) in backends("create-reclaims", Duration::from_millis(150)) {
        for _ in 0..3 {
            store.create(JobType::AnalyzeStock, &parameters()).unwrap();
        }
        std::thread::sleep(Duration::from_millis(250));
        let fresh = store.create(JobType::AnalyzeStock, &parameters()).unwrap();

        let listed: Vec<_> = store
            .list(10)
            .unwrap()
            .into_iter()
            .map(|record| record.execution_id)
            .collect();
        assert_eq!(listed, vec![fresh], "{backend}");
        assert_eq!(store.purge_expired().unwrap(), 0, "{backend}");
    }
}

#[test]
fn sqlite_table_stays_bounded_without_purge() {
    let path = test_db_path("bounded-rows");
    let store = SqliteExecutionStore::with_ttl(&path, Duration::from_millis(5));
    store.migrate_to_latest().unwrap();

    for _ in 0..50 {
        store.create(JobType::AnalyzeStock, &parameters()).unwrap();
    }
    std::thread::sleep(Duration::from_millis(20));
    store.create(JobType::AnalyzeStock, &parameters()).unwrap();

    let connection = rusqlite::Connection::open(&path).unwrap();
    let rows: i64 = connection
        .query_row("SELECT COUNT(*) FROM execution_records", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);

    let _ = std::fs::remove_file(path);
}

#[test]
fn writes_push_expiry_forward() {
    for (backend, store) in backends("ttl-refresh", Duration::from_millis(300)) {
        let id = store.create(JobType::AnalyzeStock, &parameters()).unwrap();

        std::thread::sleep(Duration::from_millis(200));
        assert!(store.start_step(id, "technical_agent").unwrap().is_applied());
        std::thread::sleep(Duration::from_millis(200));

        assert!(store.get(id).unwrap().is_some(), "{backend}");
    }
}
