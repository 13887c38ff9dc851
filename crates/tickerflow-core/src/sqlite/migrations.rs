#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqliteMigration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

const MIGRATION_0001: SqliteMigration = SqliteMigration {
    version: 1,
    name: "initial_execution_records",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS execution_records (
    execution_id TEXT PRIMARY KEY,
    job_type TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL,
    updated_at_ms INTEGER NOT NULL,
    expires_at_ms INTEGER NOT NULL,
    record_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_execution_records_recency
    ON execution_records (created_at_ms DESC);

CREATE INDEX IF NOT EXISTS idx_execution_records_expiry
    ON execution_records (expires_at_ms);
"#,
    down_sql: r#"
DROP INDEX IF EXISTS idx_execution_records_expiry;
DROP INDEX IF EXISTS idx_execution_records_recency;
DROP TABLE IF EXISTS execution_records;
"#,
};

const MIGRATIONS: [SqliteMigration; 1] = [MIGRATION_0001];

pub fn migrations() -> &'static [SqliteMigration] {
    &MIGRATIONS
}

pub fn migration(version: i64) -> Option<&'static SqliteMigration> {
    MIGRATIONS.iter().find(|entry| entry.version == version)
}

pub fn current_schema_version() -> i64 {
    MIGRATIONS.last().map(|entry| entry.version).unwrap_or(0)
}
