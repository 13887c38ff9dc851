use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::models::timestamp::rfc3339;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepPayload {
    Technical(TechnicalSignals),
    Fundamental(FundamentalAnalysis),
    News(NewsSentiment),
    Aggregation(Recommendation),
}

impl StepPayload {
    pub fn as_technical(&self) -> Option<&TechnicalSignals> {
        match self {
            Self::Technical(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_fundamental(&self) -> Option<&FundamentalAnalysis> {
        match self {
            Self::Fundamental(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_news(&self) -> Option<&NewsSentiment> {
        match self {
            Self::News(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_aggregation(&self) -> Option<&Recommendation> {
        match self {
            Self::Aggregation(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Uptrend,
    Sideways,
    Downtrend,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentumSignal {
    Bullish,
    Neutral,
    Bearish,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSignals {
    pub latest_close: f64,
    pub rsi: f64,
    pub sma_20: f64,
    pub sma_50: Option<f64>,
    pub macd: MomentumSignal,
    pub trend: Trend,
    pub period_return_pct: f64,
    pub score: f64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rating {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FundamentalScores {
    pub valuation: f64,
    pub profitability: f64,
    pub growth: f64,
    pub financial_health: f64,
    pub overall: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FundamentalAnalysis {
    pub company_name: Option<String>,
    pub sector: Option<String>,
    pub pe_trailing: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub profit_margin: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub scores: FundamentalScores,
    pub rating: Rating,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewsSentiment {
    pub sentiment: SentimentLabel,
    pub sentiment_score: f64,
    pub recent_news_count: usize,
    pub headlines: Vec<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Buy,
    Hold,
    Sell,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub overall_score: f64,
    pub recommendation: Action,
    pub confidence: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job_type", rename_all = "snake_case")]
pub enum JobResult {
    AnalyzeStock(StockReport),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockReport {
    pub symbol: String,
    #[serde(with = "rfc3339")]
    pub analyzed_at: SystemTime,
    pub recommendation: Action,
    pub overall_score: f64,
    pub confidence: f64,
    pub technical: TechnicalSignals,
    pub fundamental: FundamentalAnalysis,
    pub news_sentiment: NewsSentiment,
}
