use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use crate::models::{
    CoreError, CoreErrorKind, ExecutionCompletion, ExecutionId, ExecutionRecord, JobParameters,
    JobType, StepCompletion,
};
use crate::persistence::{DEFAULT_RECORD_TTL, ExecutionStore, PersistenceResult, WriteStatus};

/// Single-process backend. One mutex covers the map and the recency index,
/// and it is only ever held inside synchronous calls.
pub struct InMemoryExecutionStore {
    ttl: Duration,
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    records: HashMap<ExecutionId, StoredRecord>,
    recency: Vec<ExecutionId>,
}

impl StoreState {
    fn reclaim_expired(&mut self, now: SystemTime) -> usize {
        let before = self.records.len();
        self.records.retain(|_, stored| stored.is_live(now));
        let records = &self.records;
        self.recency.retain(|execution_id| records.contains_key(execution_id));
        before - self.records.len()
    }
}

struct StoredRecord {
    record: ExecutionRecord,
    expires_at: SystemTime,
}

impl StoredRecord {
    fn is_live(&self, now: SystemTime) -> bool {
        self.expires_at > now
    }
}

impl Default for InMemoryExecutionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_RECORD_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(StoreState::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock_state(&self) -> PersistenceResult<MutexGuard<'_, StoreState>> {
        self.state.lock().map_err(|_| {
            CoreError::new(CoreErrorKind::Internal, "execution store mutex poisoned")
        })
    }

    fn mutate(
        &self,
        execution_id: ExecutionId,
        apply: impl FnOnce(&mut ExecutionRecord, SystemTime) -> bool,
    ) -> PersistenceResult<WriteStatus> {
        let mut state = self.lock_state()?;
        let now = SystemTime::now();
        let Some(stored) = state
            .records
            .get_mut(&execution_id)
            .filter(|stored| stored.is_live(now))
        else {
            return Ok(WriteStatus::Ignored);
        };

        if !apply(&mut stored.record, now) {
            return Ok(WriteStatus::Ignored);
        }
        stored.expires_at = now + self.ttl;
        Ok(WriteStatus::Applied)
    }
}

impl ExecutionStore for InMemoryExecutionStore {
    fn create(
        &self,
        job_type: JobType,
        parameters: &JobParameters,
    ) -> PersistenceResult<ExecutionId> {
        let mut state = self.lock_state()?;
        let now = SystemTime::now();
        let reclaimed = state.reclaim_expired(now);
        if reclaimed > 0 {
            tracing::debug!(reclaimed, "reclaimed expired execution records");
        }

        let mut execution_id = ExecutionId::generate();
        while state.records.contains_key(&execution_id) {
            execution_id = ExecutionId::generate();
        }

        state.records.insert(
            execution_id,
            StoredRecord {
                record: ExecutionRecord::new(execution_id, job_type, parameters.clone(), now),
                expires_at: now + self.ttl,
            },
        );
        state.recency.push(execution_id);
        Ok(execution_id)
    }

    fn get(&self, execution_id: ExecutionId) -> PersistenceResult<Option<ExecutionRecord>> {
        let state = self.lock_state()?;
        let now = SystemTime::now();
        Ok(state
            .records
            .get(&execution_id)
            .filter(|stored| stored.is_live(now))
            .map(|stored| stored.record.clone()))
    }

    fn list(&self, limit: usize) -> PersistenceResult<Vec<ExecutionRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let state = self.lock_state()?;
        let now = SystemTime::now();
        Ok(state
            .recency
            .iter()
            .rev()
            .filter_map(|execution_id| state.records.get(execution_id))
            .filter(|stored| stored.is_live(now))
            .take(limit)
            .map(|stored| stored.record.clone())
            .collect())
    }

    fn start_step(
        &self,
        execution_id: ExecutionId,
        step_name: &str,
    ) -> PersistenceResult<WriteStatus> {
        self.mutate(execution_id, |record, now| record.begin_step(step_name, now))
    }

    fn complete_step(
        &self,
        execution_id: ExecutionId,
        step_name: &str,
        completion: StepCompletion,
    ) -> PersistenceResult<WriteStatus> {
        self.mutate(execution_id, |record, now| {
            record.finish_step(step_name, completion, now)
        })
    }

    fn complete_execution(
        &self,
        execution_id: ExecutionId,
        completion: ExecutionCompletion,
    ) -> PersistenceResult<WriteStatus> {
        self.mutate(execution_id, |record, now| record.finish(completion, now))
    }

    fn purge_expired(&self) -> PersistenceResult<usize> {
        let mut state = self.lock_state()?;
        Ok(state.reclaim_expired(SystemTime::now()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::InMemoryExecutionStore;
    use crate::models::{ExecutionCompletion, ExecutionStatus, JobParameters, JobType};
    use crate::persistence::{ExecutionStore, WriteStatus};

    #[test]
    fn recency_index_lists_newest_first() {
        let store = InMemoryExecutionStore::new();
        let first = store
            .create(JobType::AnalyzeStock, &JobParameters::new())
            .unwrap();
        let second = store
            .create(JobType::AnalyzeStock, &JobParameters::new())
            .unwrap();

        let listed = store.list(10).unwrap();
        let ids: Vec<_> = listed.iter().map(|record| record.execution_id).collect();
        assert_eq!(ids, vec![second, first]);
        assert_eq!(store.list(1).unwrap().len(), 1);
        assert!(store.list(0).unwrap().is_empty());
    }

    #[test]
    fn expired_records_are_invisible_and_purged() {
        let store = InMemoryExecutionStore::with_ttl(Duration::from_millis(20));
        let execution_id = store
            .create(JobType::AnalyzeStock, &JobParameters::new())
            .unwrap();
        std::thread::sleep(Duration::from_millis(40));

        assert!(store.get(execution_id).unwrap().is_none());
        assert!(store.list(10).unwrap().is_empty());
        assert_eq!(
            store
                .complete_execution(execution_id, ExecutionCompletion::Failed("late".into()))
                .unwrap(),
            WriteStatus::Ignored
        );
        assert_eq!(store.purge_expired().unwrap(), 1);
    }

    #[test]
    fn create_reclaims_expired_entries() {
        let store = InMemoryExecutionStore::with_ttl(Duration::from_millis(5));
        for _ in 0..200 {
            store
                .create(JobType::AnalyzeStock, &JobParameters::new())
                .unwrap();
        }
        std::thread::sleep(Duration::from_millis(20));
        let live = store
            .create(JobType::AnalyzeStock, &JobParameters::new())
            .unwrap();

        let state = store.lock_state().unwrap();
        assert_eq!(state.records.len(), 1);
        assert_eq!(state.recency, vec![live]);
    }

    #[test]
    fn writes_push_expiry_forward() {
        let store = InMemoryExecutionStore::with_ttl(Duration::from_millis(150));
        let execution_id = store
            .create(JobType::AnalyzeStock, &JobParameters::new())
            .unwrap();
        std::thread::sleep(Duration::from_millis(100));
        store.start_step(execution_id, "technical_agent").unwrap();
        std::thread::sleep(Duration::from_millis(100));

        let record = store.get(execution_id).unwrap().expect("record refreshed");
        assert_eq!(record.status, ExecutionStatus::Running);
        assert_eq!(record.steps.len(), 1);
    }
}
