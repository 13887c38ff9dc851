use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tickerflow_core::agents::SampleMarketData;
use tickerflow_core::config::CoreConfig;
use tickerflow_core::logging;
use tickerflow_core::models::{ExecutionId, JobParameters, JobRequest};
use tickerflow_core::orchestration::Dispatcher;
use tickerflow_core::orchestration::dispatcher::DEFAULT_LIST_LIMIT;

const DEFAULT_DATABASE: &str = "tickerflow.db";
const EXIT_NOT_FOUND: u8 = 2;

#[derive(Parser)]
#[command(name = "tickerflow")]
#[command(about = "Run and inspect stock analysis jobs", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database holding execution records
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job and wait for it to finish
    Submit {
        job_type: String,
        /// Job parameter as key=value; repeatable
        #[arg(short = 'p', long = "param", value_parser = parse_parameter)]
        parameters: Vec<(String, String)>,
        /// Give up waiting after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Show one execution record
    Get { execution_id: String },
    /// List recent executions, newest first
    List {
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },
    /// Show the steps of one execution
    Steps { execution_id: String },
    /// List supported job types
    JobTypes,
    /// Drop expired execution records
    Purge,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = CoreConfig::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database_path = Some(database);
    }
    if config.database_path.is_none() {
        config.database_path = Some(PathBuf::from(DEFAULT_DATABASE));
    }
    logging::init(&config.log_level);

    let store = config.open_store()?;
    let dispatcher = Dispatcher::from_config(&config, store, Arc::new(SampleMarketData::new()))?;

    match cli.command {
        Commands::Submit {
            job_type,
            parameters,
            timeout_secs,
        } => {
            let parameters: JobParameters = parameters.into_iter().collect();
            let handle = dispatcher
                .submit(JobRequest::new(job_type, parameters))
                .await?;
            eprintln!("{} ({})", handle.message, handle.execution_id);

            let record = dispatcher
                .wait_for_completion(handle.execution_id, timeout_secs.map(Duration::from_secs))
                .await?;
            print_json(&record)?;
        }
        Commands::Get { execution_id } => {
            let execution_id = parse_execution_id(&execution_id)?;
            match dispatcher.get(execution_id).await? {
                Some(record) => print_json(&record)?,
                None => return Ok(not_found(execution_id)),
            }
        }
        Commands::List { limit } => {
            print_json(&dispatcher.list(limit).await?)?;
        }
        Commands::Steps { execution_id } => {
            let execution_id = parse_execution_id(&execution_id)?;
            match dispatcher.steps(execution_id).await? {
                Some(steps) => print_json(&steps)?,
                None => return Ok(not_found(execution_id)),
            }
        }
        Commands::JobTypes => {
            print_json(&dispatcher.job_types())?;
        }
        Commands::Purge => {
            let purged = dispatcher.purge_expired().await?;
            print_json(&serde_json::json!({ "purged": purged }))?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn parse_parameter(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

fn parse_execution_id(raw: &str) -> anyhow::Result<ExecutionId> {
    raw.parse()
        .with_context(|| format!("'{raw}' is not a valid execution id"))
}

fn not_found(execution_id: ExecutionId) -> ExitCode {
    eprintln!("execution '{execution_id}' was not found or has expired");
    ExitCode::from(EXIT_NOT_FOUND)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
