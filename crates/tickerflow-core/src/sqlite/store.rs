use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params};

use crate::models::{
    CoreError, CoreErrorKind, ExecutionCompletion, ExecutionId, ExecutionRecord, JobParameters,
    JobType, StepCompletion,
};
use crate::persistence::{
    DEFAULT_RECORD_TTL, ExecutionStore, MigrationStore, PersistenceResult, WriteStatus,
};
use crate::sqlite::migrations::{SqliteMigration, current_schema_version, migration, migrations};

const MIGRATIONS_TABLE: &str = "tickerflow_schema_migrations";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CREATE_ATTEMPTS: usize = 3;

/// Durable keyed store. Each execution is one row holding the JSON-encoded
/// record; mutations run as `IMMEDIATE` transactions so concurrent writers
/// to the same id are serialized by SQLite's write lock.
pub struct SqliteExecutionStore {
    database_path: PathBuf,
    ttl: Duration,
}

impl SqliteExecutionStore {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self::with_ttl(database_path, DEFAULT_RECORD_TTL)
    }

    pub fn with_ttl(database_path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            database_path: database_path.into(),
            ttl,
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn planned_migrations(&self, from_version: i64) -> Vec<&'static SqliteMigration> {
        migrations()
            .iter()
            .filter(|entry| entry.version > from_version)
            .collect()
    }

    pub fn migrate_to_latest(&self) -> PersistenceResult<()> {
        self.apply_migration(current_schema_version())
    }

    fn with_connection<T>(
        &self,
        operation_name: &str,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        let mut connection = open_connection(&self.database_path)
            .map_err(|error| storage_error(operation_name, error))?;
        operation(&mut connection).map_err(|error| storage_error(operation_name, error))
    }

    fn mutate(
        &self,
        operation_name: &str,
        execution_id: ExecutionId,
        apply: impl FnOnce(&mut ExecutionRecord, SystemTime) -> bool,
    ) -> PersistenceResult<WriteStatus> {
        let ttl = self.ttl;
        self.with_connection(operation_name, |connection| {
            ensure_schema_ready(connection)?;
            let transaction =
                connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = SystemTime::now();
            let now_ms = to_unix_millis(now)?;

            let encoded: Option<String> = transaction
                .query_row(
                    "
SELECT record_json
FROM execution_records
WHERE execution_id = ?1 AND expires_at_ms > ?2
",
                    params![execution_id.to_string(), now_ms],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(encoded) = encoded else {
                return Ok(WriteStatus::Ignored);
            };

            let mut record = decode_record(&encoded)?;
            if !apply(&mut record, now) {
                return Ok(WriteStatus::Ignored);
            }

            transaction.execute(
                "
UPDATE execution_records
SET status = ?2, updated_at_ms = ?3, expires_at_ms = ?4, record_json = ?5
WHERE execution_id = ?1
",
                params![
                    execution_id.to_string(),
                    record.status.as_str(),
                    now_ms,
                    to_unix_millis(now + ttl)?,
                    encode_record(&record)?,
                ],
            )?;
            transaction.commit()?;
            Ok(WriteStatus::Applied)
        })
    }
}

impl MigrationStore for SqliteExecutionStore {
    fn current_version(&self) -> PersistenceResult<i64> {
        self.with_connection("current_version", |connection| {
            ensure_migrations_table(connection)?;
            read_current_version(connection)
        })
    }

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()> {
        if target_version < 0 || target_version > current_schema_version() {
            return Err(storage_error_text(
                "apply_migration",
                format!("invalid migration target version '{target_version}'"),
            ));
        }

        if target_version > 0 && migration(target_version).is_none() {
            return Err(storage_error_text(
                "apply_migration",
                format!("migration version '{target_version}' is not defined"),
            ));
        }

        self.with_connection("apply_migration", |connection| {
            ensure_migrations_table(connection)?;
            let current_version = read_current_version(connection)?;

            if target_version > current_version {
                for version in (current_version + 1)..=target_version {
                    apply_up_migration(connection, defined_migration(version)?)?;
                }
            } else if target_version < current_version {
                for version in ((target_version + 1)..=current_version).rev() {
                    apply_down_migration(connection, defined_migration(version)?)?;
                }
            }

            Ok(())
        })
    }
}

impl ExecutionStore for SqliteExecutionStore {
    fn create(
        &self,
        job_type: JobType,
        parameters: &JobParameters,
    ) -> PersistenceResult<ExecutionId> {
        let ttl = self.ttl;
        self.with_connection("create", |connection| {
            ensure_schema_ready(connection)?;
            let reclaimed = delete_expired(connection, SystemTime::now())?;
            if reclaimed > 0 {
                tracing::debug!(reclaimed, "reclaimed expired execution records");
            }

            let mut attempt = 0;
            loop {
                attempt += 1;
                let now = SystemTime::now();
                let execution_id = ExecutionId::generate();
                let record = ExecutionRecord::new(execution_id, job_type, parameters.clone(), now);
                let inserted = connection.execute(
                    "
INSERT INTO execution_records (
    execution_id, job_type, status, created_at_ms, updated_at_ms, expires_at_ms, record_json
) VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6)
",
                    params![
                        execution_id.to_string(),
                        job_type.as_str(),
                        record.status.as_str(),
                        to_unix_millis(now)?,
                        to_unix_millis(now + ttl)?,
                        encode_record(&record)?,
                    ],
                );

                match inserted {
                    Ok(_) => return Ok(execution_id),
                    Err(rusqlite::Error::SqliteFailure(failure, _))
                        if failure.code == ErrorCode::ConstraintViolation
                            && attempt < MAX_CREATE_ATTEMPTS =>
                    {
                        continue;
                    }
                    Err(error) => return Err(error),
                }
            }
        })
    }

    fn get(&self, execution_id: ExecutionId) -> PersistenceResult<Option<ExecutionRecord>> {
        self.with_connection("get", |connection| {
            ensure_schema_ready(connection)?;
            let encoded: Option<String> = connection
                .query_row(
                    "
SELECT record_json
FROM execution_records
WHERE execution_id = ?1 AND expires_at_ms > ?2
",
                    params![
                        execution_id.to_string(),
                        to_unix_millis(SystemTime::now())?
                    ],
                    |row| row.get(0),
                )
                .optional()?;

            encoded.as_deref().map(decode_record).transpose()
        })
    }

    fn list(&self, limit: usize) -> PersistenceResult<Vec<ExecutionRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.with_connection("list", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT record_json
FROM execution_records
WHERE expires_at_ms > ?1
ORDER BY created_at_ms DESC, rowid DESC
LIMIT ?2
",
            )?;
            let rows = statement.query_map(
                params![to_unix_millis(SystemTime::now())?, to_i64(limit)?],
                |row| row.get::<_, String>(0),
            )?;

            let mut records = Vec::new();
            for encoded in rows {
                records.push(decode_record(&encoded?)?);
            }
            Ok(records)
        })
    }

    fn start_step(
        &self,
        execution_id: ExecutionId,
        step_name: &str,
    ) -> PersistenceResult<WriteStatus> {
        self.mutate("start_step", execution_id, |record, now| {
            record.begin_step(step_name, now)
        })
    }

    fn complete_step(
        &self,
        execution_id: ExecutionId,
        step_name: &str,
        completion: StepCompletion,
    ) -> PersistenceResult<WriteStatus> {
        self.mutate("complete_step", execution_id, |record, now| {
            record.finish_step(step_name, completion, now)
        })
    }

    fn complete_execution(
        &self,
        execution_id: ExecutionId,
        completion: ExecutionCompletion,
    ) -> PersistenceResult<WriteStatus> {
        self.mutate("complete_execution", execution_id, |record, now| {
            record.finish(completion, now)
        })
    }

    fn purge_expired(&self) -> PersistenceResult<usize> {
        self.with_connection("purge_expired", |connection| {
            ensure_schema_ready(connection)?;
            delete_expired(connection, SystemTime::now())
        })
    }
}

fn delete_expired(connection: &Connection, now: SystemTime) -> rusqlite::Result<usize> {
    connection.execute(
        "DELETE FROM execution_records WHERE expires_at_ms <= ?1",
        params![to_unix_millis(now)?],
    )
}

fn open_connection(database_path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
    }
    let connection = Connection::open(database_path)?;
    connection.busy_timeout(BUSY_TIMEOUT)?;
    Ok(connection)
}

fn ensure_migrations_table(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(&format!(
        "
CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at_unix INTEGER NOT NULL
);
"
    ))
}

fn ensure_schema_ready(connection: &Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(connection)?;
    let version = read_current_version(connection)?;
    if version < current_schema_version() {
        return Err(storage_error_sqlite(
            "database schema is not up to date; apply migrations before execution operations",
        ));
    }
    Ok(())
}

fn read_current_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
}

fn defined_migration(version: i64) -> rusqlite::Result<&'static SqliteMigration> {
    migration(version).ok_or_else(|| {
        storage_error_sqlite(&format!("migration version '{version}' is not defined"))
    })
}

fn apply_up_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.up_sql)?;
    transaction.execute(
        &format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at_unix)
             VALUES (?1, ?2, strftime('%s', 'now'))"
        ),
        (migration.version, migration.name),
    )?;
    transaction.commit()?;
    Ok(())
}

fn apply_down_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.down_sql)?;
    transaction.execute(
        &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?1"),
        [migration.version],
    )?;
    transaction.commit()?;
    Ok(())
}

fn encode_record(record: &ExecutionRecord) -> rusqlite::Result<String> {
    serde_json::to_string(record).map_err(|error| {
        storage_error_sqlite(&format!("failed to encode execution record: {error}"))
    })
}

fn decode_record(encoded: &str) -> rusqlite::Result<ExecutionRecord> {
    serde_json::from_str(encoded).map_err(|error| {
        storage_error_sqlite(&format!(
            "failed to decode persisted execution record: {error}"
        ))
    })
}

fn storage_error(operation: &str, error: rusqlite::Error) -> CoreError {
    storage_error_text(operation, error.to_string())
}

fn storage_error_sqlite(message: &str) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(message.to_string())))
}

fn to_unix_millis(value: SystemTime) -> rusqlite::Result<i64> {
    let duration = value.duration_since(UNIX_EPOCH).map_err(|error| {
        storage_error_sqlite(&format!("time before unix epoch is not supported: {error}"))
    })?;
    i64::try_from(duration.as_millis())
        .map_err(|_| storage_error_sqlite("unix timestamp millis exceed i64 range"))
}

fn to_i64(value: usize) -> rusqlite::Result<i64> {
    i64::try_from(value).map_err(|_| storage_error_sqlite("value exceeds i64 range"))
}

fn storage_error_text(operation: &str, message: impl AsRef<str>) -> CoreError {
    CoreError::new(
        CoreErrorKind::StorageFailure,
        format!("sqlite store '{operation}' failed: {}", message.as_ref()),
    )
}
