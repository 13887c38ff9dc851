use std::sync::Arc;
use std::time::SystemTime;

use crate::agents::{
    AggregationAgent, AnalysisAgent, FundamentalAgent, MarketDataSource, NewsAgent,
    TechnicalAgent,
};
use crate::models::{
    AnalyzeStockParameters, CoreError, CoreErrorKind, JobParameters, JobResult, JobType,
    StepPayload, StockReport,
};
use crate::orchestration::{JobPipeline, StepResults};

/// Technical, fundamental, and news analysis followed by aggregation.
pub struct AnalyzeStockPipeline {
    steps: Vec<Arc<dyn AnalysisAgent>>,
}

impl AnalyzeStockPipeline {
    pub fn new(source: Arc<dyn MarketDataSource>) -> Self {
        Self {
            steps: vec![
                Arc::new(TechnicalAgent::new(source.clone())),
                Arc::new(FundamentalAgent::new(source.clone())),
                Arc::new(NewsAgent::new(source)),
                Arc::new(AggregationAgent::new()),
            ],
        }
    }
}

impl JobPipeline for AnalyzeStockPipeline {
    fn job_type(&self) -> JobType {
        JobType::AnalyzeStock
    }

    fn steps(&self) -> &[Arc<dyn AnalysisAgent>] {
        &self.steps
    }

    fn validate(&self, parameters: &JobParameters) -> Result<(), CoreError> {
        AnalyzeStockParameters::parse(parameters).map(|_| ())
    }

    fn assemble(
        &self,
        parameters: &JobParameters,
        results: &StepResults,
        completed_at: SystemTime,
    ) -> Result<JobResult, CoreError> {
        let parameters = AnalyzeStockParameters::parse(parameters)?;
        let technical = required(results, TechnicalAgent::NAME, StepPayload::as_technical)?;
        let fundamental =
            required(results, FundamentalAgent::NAME, StepPayload::as_fundamental)?;
        let news_sentiment = required(results, NewsAgent::NAME, StepPayload::as_news)?;
        let recommendation =
            required(results, AggregationAgent::NAME, StepPayload::as_aggregation)?;

        Ok(JobResult::AnalyzeStock(StockReport {
            symbol: parameters.symbol,
            analyzed_at: completed_at,
            recommendation: recommendation.recommendation,
            overall_score: recommendation.overall_score,
            confidence: recommendation.confidence,
            technical: technical.clone(),
            fundamental: fundamental.clone(),
            news_sentiment: news_sentiment.clone(),
        }))
    }
}

fn required<'a, T>(
    results: &'a StepResults,
    step_name: &str,
    extract: fn(&'a StepPayload) -> Option<&'a T>,
) -> Result<&'a T, CoreError> {
    results.get(step_name).and_then(extract).ok_or_else(|| {
        CoreError::new(
            CoreErrorKind::Internal,
            format!("step '{step_name}' finished without a usable result"),
        )
        .with_job_type(JobType::AnalyzeStock)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::AnalyzeStockPipeline;
    use crate::agents::SampleMarketData;
    use crate::orchestration::JobPipeline;

    #[test]
    fn steps_run_in_dependency_order() {
        let pipeline = AnalyzeStockPipeline::new(Arc::new(SampleMarketData::new()));
        let names: Vec<_> = pipeline.steps().iter().map(|step| step.name()).collect();

        assert_eq!(
            names,
            vec![
                "technical_agent",
                "fundamental_agent",
                "news_agent",
                "aggregation_agent"
            ]
        );
    }
}
