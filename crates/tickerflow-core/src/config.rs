use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::models::{CoreError, CoreErrorKind};
use crate::orchestration::{ExecutionLimits, RetryPolicy};
use crate::persistence::{ExecutionStore, InMemoryExecutionStore};
use crate::sqlite::SqliteExecutionStore;

/// Environment variables named `TICKERFLOW_<FIELD>` override file values.
pub const ENV_PREFIX: &str = "TICKERFLOW";

/// Runtime settings. Every field has a default, so an empty TOML file and a
/// missing one mean the same thing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Attempts per step, including the first.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub record_ttl_secs: u64,
    pub task_hard_timeout_secs: u64,
    pub task_soft_timeout_secs: u64,
    pub step_timeout_secs: u64,
    pub max_concurrent_jobs: usize,
    /// SQLite file backing the execution store. Absent means in-memory.
    pub database_path: Option<PathBuf>,
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 2_000,
            record_ttl_secs: 86_400,
            task_hard_timeout_secs: 3_600,
            task_soft_timeout_secs: 3_000,
            step_timeout_secs: 300,
            max_concurrent_jobs: 4,
            database_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl CoreConfig {
    /// Layers the optional TOML file under `TICKERFLOW_*` environment
    /// variables, then validates.
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        Self::load_layered(path, environment())
    }

    fn load_layered(path: Option<&Path>, environment: Environment) -> Result<Self, CoreError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let config = deserialize(builder.add_source(environment))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CoreError> {
        deserialize(Config::builder().add_source(File::from_str(raw, FileFormat::Toml)))
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_retries == 0 {
            return Err(config_error("max_retries must be at least 1"));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(config_error("max_concurrent_jobs must be at least 1"));
        }
        if self.record_ttl_secs == 0 {
            return Err(config_error("record_ttl_secs must be greater than zero"));
        }
        if self.step_timeout_secs == 0 {
            return Err(config_error("step_timeout_secs must be greater than zero"));
        }
        if self.task_soft_timeout_secs >= self.task_hard_timeout_secs {
            return Err(config_error(format!(
                "task_soft_timeout_secs ({}) must be less than task_hard_timeout_secs ({})",
                self.task_soft_timeout_secs, self.task_hard_timeout_secs
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn execution_limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            step_timeout: Duration::from_secs(self.step_timeout_secs),
            hard_timeout: Duration::from_secs(self.task_hard_timeout_secs),
            soft_timeout: Duration::from_secs(self.task_soft_timeout_secs),
        }
    }

    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_secs)
    }

    /// Opens the configured backend, migrating SQLite to the latest schema.
    pub fn open_store(&self) -> Result<Arc<dyn ExecutionStore>, CoreError> {
        match &self.database_path {
            Some(path) => {
                let store = SqliteExecutionStore::with_ttl(path, self.record_ttl());
                store.migrate_to_latest()?;
                tracing::debug!(path = %path.display(), "opened sqlite execution store");
                Ok(Arc::new(store))
            }
            None => Ok(Arc::new(InMemoryExecutionStore::with_ttl(self.record_ttl()))),
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .try_parsing(true)
}

fn deserialize(builder: ConfigBuilder<DefaultState>) -> Result<CoreConfig, CoreError> {
    builder
        .build()
        .and_then(|settings| settings.try_deserialize::<CoreConfig>())
        .map_err(|error| config_error(format!("invalid config: {error}")))
}

fn config_error(message: impl Into<String>) -> CoreError {
    CoreError::new(CoreErrorKind::Configuration, message)
}
