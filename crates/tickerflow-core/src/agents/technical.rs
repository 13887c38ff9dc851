use std::sync::Arc;

use crate::agents::{
    AnalysisAgent, MarketDataSource, StepContext, clamp_score, history_period, round_to,
};
use crate::models::{
    MomentumSignal, StepPayload, TechnicalSignals, Trend, UnitFailure, UnitResult,
};

const RSI_PERIOD: usize = 14;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MIN_HISTORY: usize = MACD_SLOW + 1;

pub struct TechnicalAgent {
    source: Arc<dyn MarketDataSource>,
}

impl TechnicalAgent {
    pub const NAME: &'static str = "technical_agent";

    pub fn new(source: Arc<dyn MarketDataSource>) -> Self {
        Self { source }
    }
}

impl AnalysisAgent for TechnicalAgent {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Momentum, trend, and moving-average signals from daily closes"
    }

    fn execute(&self, context: &StepContext) -> UnitResult<StepPayload> {
        let parameters = context.stock_parameters()?;
        let history = self
            .source
            .price_history(&parameters.symbol, history_period(parameters.depth))?;

        analyze_closes(&history.closes).map(StepPayload::Technical)
    }
}

pub fn analyze_closes(closes: &[f64]) -> UnitResult<TechnicalSignals> {
    if closes.len() < MIN_HISTORY {
        return Err(UnitFailure::transient(format!(
            "technical analysis needs at least {MIN_HISTORY} closes, got {}",
            closes.len()
        )));
    }
    if closes.iter().any(|close| !close.is_finite() || *close <= 0.0) {
        return Err(UnitFailure::transient(
            "price history contains non-positive or non-finite closes",
        ));
    }

    let latest_close = closes[closes.len() - 1];
    let rsi = relative_strength_index(closes, RSI_PERIOD);
    let sma_20 = simple_moving_average(closes, 20);
    let sma_50 = (closes.len() >= 50).then(|| simple_moving_average(closes, 50));
    let macd_line = exponential_moving_average(closes, MACD_FAST)
        - exponential_moving_average(closes, MACD_SLOW);
    let macd = if macd_line > 0.0 {
        MomentumSignal::Bullish
    } else if macd_line < 0.0 {
        MomentumSignal::Bearish
    } else {
        MomentumSignal::Neutral
    };

    let long_average = sma_50.unwrap_or(sma_20);
    let trend = if latest_close > sma_20 && sma_20 >= long_average {
        Trend::Uptrend
    } else if latest_close < sma_20 && sma_20 <= long_average {
        Trend::Downtrend
    } else {
        Trend::Sideways
    };

    let period_return_pct = (latest_close / closes[0] - 1.0) * 100.0;

    Ok(TechnicalSignals {
        latest_close: round_to(latest_close, 2),
        rsi: round_to(rsi, 1),
        sma_20: round_to(sma_20, 2),
        sma_50: sma_50.map(|value| round_to(value, 2)),
        macd,
        trend,
        period_return_pct: round_to(period_return_pct, 2),
        score: score_signals(rsi, macd, trend),
    })
}

fn score_signals(rsi: f64, macd: MomentumSignal, trend: Trend) -> f64 {
    let mut score: f64 = 5.0;

    score += match trend {
        Trend::Uptrend => 2.0,
        Trend::Sideways => 0.0,
        Trend::Downtrend => -2.0,
    };
    score += match macd {
        MomentumSignal::Bullish => 1.0,
        MomentumSignal::Neutral => 0.0,
        MomentumSignal::Bearish => -1.0,
    };
    // Oversold reads as upside, overbought as downside.
    if rsi < 30.0 {
        score += 1.5;
    } else if rsi > 70.0 {
        score -= 1.5;
    } else if (40.0..=60.0).contains(&rsi) {
        score += 0.5;
    }

    clamp_score(score)
}

fn simple_moving_average(closes: &[f64], period: usize) -> f64 {
    let window = &closes[closes.len() - period..];
    window.iter().sum::<f64>() / period as f64
}

fn exponential_moving_average(closes: &[f64], period: usize) -> f64 {
    let smoothing = 2.0 / (period as f64 + 1.0);
    closes[1..]
        .iter()
        .fold(closes[0], |ema, close| close * smoothing + ema * (1.0 - smoothing))
}

fn relative_strength_index(closes: &[f64], period: usize) -> f64 {
    let window = &closes[closes.len() - period - 1..];
    let (gains, losses) = window
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .fold((0.0, 0.0), |(gains, losses), change| {
            if change >= 0.0 {
                (gains + change, losses)
            } else {
                (gains, losses - change)
            }
        });

    if losses == 0.0 {
        return if gains == 0.0 { 50.0 } else { 100.0 };
    }
    let relative_strength = gains / losses;
    100.0 - 100.0 / (1.0 + relative_strength)
}

#[cfg(test)]
mod tests {
    use super::{analyze_closes, relative_strength_index};
    use crate::models::{MomentumSignal, Trend};

    #[test]
    fn steadily_rising_closes_read_as_uptrend() {
        let closes: Vec<f64> = (0..60).map(|day| 100.0 + day as f64).collect();
        let signals = analyze_closes(&closes).unwrap();

        assert_eq!(signals.trend, Trend::Uptrend);
        assert_eq!(signals.macd, MomentumSignal::Bullish);
        assert_eq!(signals.rsi, 100.0);
        assert_eq!(signals.latest_close, 159.0);
        assert!(signals.sma_50.is_some());
    }

    #[test]
    fn falling_closes_read_as_downtrend() {
        let closes: Vec<f64> = (0..40).map(|day| 200.0 - day as f64).collect();
        let signals = analyze_closes(&closes).unwrap();

        assert_eq!(signals.trend, Trend::Downtrend);
        assert_eq!(signals.macd, MomentumSignal::Bearish);
        assert!(signals.sma_50.is_none());
        assert!(signals.score < 5.0);
    }

    #[test]
    fn short_history_fails_with_close_count() {
        let error = analyze_closes(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(error.retriable);
        assert!(error.message.contains("got 3"));
    }

    #[test]
    fn flat_closes_have_neutral_rsi() {
        assert_eq!(relative_strength_index(&[10.0; 20], 14), 50.0);
    }
}
