use crate::agents::{
    AnalysisAgent, FundamentalAgent, NewsAgent, StepContext, TechnicalAgent, round_to,
};
use crate::models::{
    Action, FundamentalAnalysis, NewsSentiment, Recommendation, StepPayload, TechnicalSignals,
    UnitFailure, UnitResult,
};

const TECHNICAL_WEIGHT: f64 = 0.35;
const FUNDAMENTAL_WEIGHT: f64 = 0.40;
const NEWS_WEIGHT: f64 = 0.25;

const BUY_THRESHOLD: f64 = 6.5;
const SELL_THRESHOLD: f64 = 4.0;

const MIN_CONFIDENCE: f64 = 0.3;
const MAX_CONFIDENCE: f64 = 0.95;

/// Combines the prior steps into one recommendation. Reads only what the
/// orchestrator passed along; never touches a data source.
#[derive(Clone, Copy, Debug, Default)]
pub struct AggregationAgent;

impl AggregationAgent {
    pub const NAME: &'static str = "aggregation_agent";

    pub fn new() -> Self {
        Self
    }
}

impl AnalysisAgent for AggregationAgent {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Weighted recommendation from technical, fundamental, and news signals"
    }

    fn execute(&self, context: &StepContext) -> UnitResult<StepPayload> {
        let technical = context
            .prior_payload(TechnicalAgent::NAME)
            .and_then(StepPayload::as_technical)
            .ok_or_else(|| missing_input(TechnicalAgent::NAME))?;
        let fundamental = context
            .prior_payload(FundamentalAgent::NAME)
            .and_then(StepPayload::as_fundamental)
            .ok_or_else(|| missing_input(FundamentalAgent::NAME))?;
        let news = context
            .prior_payload(NewsAgent::NAME)
            .and_then(StepPayload::as_news)
            .ok_or_else(|| missing_input(NewsAgent::NAME))?;

        Ok(StepPayload::Aggregation(recommend(
            technical,
            fundamental,
            news,
        )))
    }
}

pub fn recommend(
    technical: &TechnicalSignals,
    fundamental: &FundamentalAnalysis,
    news: &NewsSentiment,
) -> Recommendation {
    let components = [
        technical.score,
        fundamental.scores.overall,
        news_score(news.sentiment_score),
    ];
    let overall = components[0] * TECHNICAL_WEIGHT
        + components[1] * FUNDAMENTAL_WEIGHT
        + components[2] * NEWS_WEIGHT;
    let overall_score = round_to(overall, 2);

    let recommendation = if overall_score >= BUY_THRESHOLD {
        Action::Buy
    } else if overall_score <= SELL_THRESHOLD {
        Action::Sell
    } else {
        Action::Hold
    };

    Recommendation {
        overall_score,
        recommendation,
        confidence: confidence(&components),
    }
}

/// Maps sentiment in -1..=1 onto the 0..=10 score scale.
fn news_score(sentiment_score: f64) -> f64 {
    (sentiment_score.clamp(-1.0, 1.0) + 1.0) * 5.0
}

/// Agreement between the component scores: identical scores give the
/// ceiling, widely spread ones fall toward the floor.
fn confidence(components: &[f64]) -> f64 {
    let mean = components.iter().sum::<f64>() / components.len() as f64;
    let variance = components
        .iter()
        .map(|score| (score - mean).powi(2))
        .sum::<f64>()
        / components.len() as f64;

    round_to(
        (1.0 - variance.sqrt() / 5.0).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE),
        2,
    )
}

fn missing_input(step_name: &str) -> UnitFailure {
    UnitFailure::transient(format!(
        "aggregation requires a result from '{step_name}' but none was provided"
    ))
}
