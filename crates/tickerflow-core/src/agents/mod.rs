pub mod aggregation;
pub mod analyze_stock;
pub mod fundamental;
pub mod news;
pub mod sample;
pub mod source;
pub mod technical;

pub use aggregation::AggregationAgent;
pub use analyze_stock::AnalyzeStockPipeline;
pub use fundamental::FundamentalAgent;
pub use news::NewsAgent;
pub use sample::SampleMarketData;
pub use source::{
    CompanyProfile, HistoryPeriod, KeyRatios, MarketDataSource, NewsItem, PriceHistory,
    SourceError, SourceResult,
};
pub use technical::TechnicalAgent;

use crate::models::{
    AnalysisDepth, AnalyzeStockParameters, ExecutionId, JobParameters, JobType, StepPayload,
    UnitFailure, UnitResult,
};
use crate::orchestration::StepResults;

/// Everything a work unit sees for one attempt. Built fresh for every step
/// from the orchestrator's own bookkeeping, never from a cached store read.
#[derive(Clone, Debug, PartialEq)]
pub struct StepContext {
    pub execution_id: ExecutionId,
    pub job_type: JobType,
    pub parameters: JobParameters,
    pub prior: StepResults,
}

impl StepContext {
    pub fn stock_parameters(&self) -> UnitResult<AnalyzeStockParameters> {
        AnalyzeStockParameters::parse(&self.parameters)
            .map_err(|error| UnitFailure::invalid(error.message))
    }

    pub fn prior_payload(&self, step_name: &str) -> Option<&StepPayload> {
        self.prior.get(step_name)
    }
}

/// A named, safely retriable unit of work. Implementations may block on I/O;
/// the orchestrator runs them on the blocking pool.
pub trait AnalysisAgent: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    fn execute(&self, context: &StepContext) -> UnitResult<StepPayload>;
}

pub(crate) fn history_period(depth: AnalysisDepth) -> HistoryPeriod {
    match depth {
        AnalysisDepth::Quick => HistoryPeriod::ThreeMonths,
        AnalysisDepth::Deep => HistoryPeriod::OneYear,
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub(crate) fn clamp_score(score: f64) -> f64 {
    round_to(score.clamp(0.0, 10.0), 1)
}
