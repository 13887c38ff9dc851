use std::sync::Arc;

use crate::agents::{AnalysisAgent, MarketDataSource, NewsItem, StepContext, round_to};
use crate::models::{AnalysisDepth, NewsSentiment, SentimentLabel, StepPayload, UnitResult};

const QUICK_HEADLINE_LIMIT: usize = 5;
const DEEP_HEADLINE_LIMIT: usize = 20;
const LABEL_THRESHOLD: f64 = 0.15;

const POSITIVE_TERMS: &[&str] = &[
    "beat", "beats", "surge", "surges", "record", "growth", "upgrade", "upgraded", "strong",
    "gain", "gains", "rally", "profit", "raises", "outperform", "expands", "buyback",
];
const NEGATIVE_TERMS: &[&str] = &[
    "miss", "misses", "plunge", "plunges", "lawsuit", "downgrade", "downgraded", "weak",
    "loss", "losses", "decline", "declines", "cut", "cuts", "probe", "recall", "falls",
];

pub struct NewsAgent {
    source: Arc<dyn MarketDataSource>,
}

impl NewsAgent {
    pub const NAME: &'static str = "news_agent";

    pub fn new(source: Arc<dyn MarketDataSource>) -> Self {
        Self { source }
    }
}

impl AnalysisAgent for NewsAgent {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Headline sentiment over recent company news"
    }

    fn execute(&self, context: &StepContext) -> UnitResult<StepPayload> {
        let parameters = context.stock_parameters()?;
        let limit = match parameters.depth {
            AnalysisDepth::Quick => QUICK_HEADLINE_LIMIT,
            AnalysisDepth::Deep => DEEP_HEADLINE_LIMIT,
        };
        let items = self.source.news(&parameters.symbol, limit)?;

        Ok(StepPayload::News(summarize_headlines(&items)))
    }
}

pub fn summarize_headlines(items: &[NewsItem]) -> NewsSentiment {
    let scored: Vec<f64> = items
        .iter()
        .filter_map(|item| headline_polarity(&item.title))
        .collect();
    let sentiment_score = if scored.is_empty() {
        0.0
    } else {
        scored.iter().sum::<f64>() / scored.len() as f64
    };

    let sentiment = if sentiment_score > LABEL_THRESHOLD {
        SentimentLabel::Positive
    } else if sentiment_score < -LABEL_THRESHOLD {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    };

    NewsSentiment {
        sentiment,
        sentiment_score: round_to(sentiment_score, 2),
        recent_news_count: items.len(),
        headlines: items.iter().map(|item| item.title.clone()).collect(),
    }
}

/// Polarity in -1..=1, or `None` when the headline carries no lexicon term.
fn headline_polarity(title: &str) -> Option<f64> {
    let (positive, negative) = title
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_ascii_lowercase)
        .fold((0u32, 0u32), |(positive, negative), word| {
            if POSITIVE_TERMS.contains(&word.as_str()) {
                (positive + 1, negative)
            } else if NEGATIVE_TERMS.contains(&word.as_str()) {
                (positive, negative + 1)
            } else {
                (positive, negative)
            }
        });

    let total = positive + negative;
    (total > 0).then(|| (f64::from(positive) - f64::from(negative)) / f64::from(total))
}
