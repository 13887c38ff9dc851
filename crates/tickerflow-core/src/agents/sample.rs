use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::agents::{
    CompanyProfile, HistoryPeriod, KeyRatios, MarketDataSource, NewsItem, PriceHistory,
    SourceError, SourceResult,
};

const SECTORS: &[(&str, &str)] = &[
    ("Technology", "Software"),
    ("Healthcare", "Biotechnology"),
    ("Financial Services", "Banks"),
    ("Consumer Cyclical", "Retail"),
    ("Industrials", "Aerospace & Defense"),
    ("Energy", "Oil & Gas"),
];

const HEADLINE_TEMPLATES: &[&str] = &[
    "{symbol} beats quarterly estimates on strong demand",
    "{symbol} shares rally after analyst upgrade",
    "{symbol} announces record revenue growth",
    "{symbol} to present at industry conference",
    "{symbol} names new chief financial officer",
    "{symbol} misses revenue expectations",
    "{symbol} faces lawsuit over product recall",
    "{symbol} shares plunge on weak guidance",
    "{symbol} downgrade follows margin decline",
    "{symbol} expands buyback program",
];

/// Deterministic offline market data. Every value is derived from the
/// symbol, so repeated calls and repeated runs agree.
#[derive(Clone, Debug, Default)]
pub struct SampleMarketData {
    unknown_symbols: HashSet<String>,
}

impl SampleMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a symbol the source should answer with `SymbolNotFound`.
    pub fn with_unknown_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.unknown_symbols.insert(symbol.into().to_uppercase());
        self
    }

    fn rng_for(&self, symbol: &str, stream: u64) -> SourceResult<StdRng> {
        if self.unknown_symbols.contains(&symbol.to_uppercase()) {
            return Err(SourceError::SymbolNotFound(symbol.to_string()));
        }
        Ok(StdRng::seed_from_u64(symbol_seed(symbol) ^ stream))
    }
}

impl MarketDataSource for SampleMarketData {
    fn company_profile(&self, symbol: &str) -> SourceResult<CompanyProfile> {
        let mut rng = self.rng_for(symbol, 0x01)?;
        let (sector, industry) = SECTORS[rng.random_range(0..SECTORS.len())];

        Ok(CompanyProfile {
            name: format!("{} Holdings", symbol.to_uppercase()),
            sector: Some(sector.to_string()),
            industry: Some(industry.to_string()),
            market_cap: Some(rng.random_range(1.0..901.0_f64).round() * 1.0e9),
        })
    }

    fn key_ratios(&self, symbol: &str) -> SourceResult<KeyRatios> {
        let mut rng = self.rng_for(symbol, 0x02)?;

        Ok(KeyRatios {
            pe_trailing: Some(ratio(&mut rng, -5.0..60.0)),
            peg_ratio: Some(ratio(&mut rng, 0.3..3.5)),
            price_to_book: Some(ratio(&mut rng, 0.5..15.0)),
            profit_margin: Some(ratio(&mut rng, -0.1..0.35)),
            operating_margin: Some(ratio(&mut rng, -0.05..0.4)),
            roe: Some(ratio(&mut rng, -0.15..0.4)),
            revenue_growth: Some(ratio(&mut rng, -0.1..0.4)),
            earnings_growth: Some(ratio(&mut rng, -0.3..0.5)),
            current_ratio: Some(ratio(&mut rng, 0.6..3.0)),
            debt_to_equity: Some(ratio(&mut rng, 0.05..2.5)),
            quick_ratio: Some(ratio(&mut rng, 0.3..2.5)),
        })
    }

    fn price_history(&self, symbol: &str, period: HistoryPeriod) -> SourceResult<PriceHistory> {
        let seed = symbol_seed(symbol);
        let mut rng = self.rng_for(symbol, 0x03)?;
        let drift = ratio(&mut rng, -0.002..0.003);
        let mut price = 20.0 + (seed % 480) as f64;

        let closes = (0..period.trading_days())
            .map(|_| {
                let noise = ratio(&mut rng, -0.02..0.02);
                price = (price * (1.0 + drift + noise)).max(0.5);
                (price * 100.0).round() / 100.0
            })
            .collect();

        Ok(PriceHistory { closes })
    }

    fn news(&self, symbol: &str, limit: usize) -> SourceResult<Vec<NewsItem>> {
        let mut rng = self.rng_for(symbol, 0x04)?;
        let upper = symbol.to_uppercase();
        let count = limit.min(rng.random_range(3..11));

        Ok((0..count)
            .map(|_| NewsItem {
                title: HEADLINE_TEMPLATES[rng.random_range(0..HEADLINE_TEMPLATES.len())]
                    .replace("{symbol}", &upper),
                publisher: Some("Sample Wire".to_string()),
            })
            .collect())
    }
}

fn symbol_seed(symbol: &str) -> u64 {
    // FNV-1a
    symbol
        .to_uppercase()
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
        })
}

/// Draws from `range`, rounded to three decimals like a quoted ratio.
fn ratio(rng: &mut StdRng, range: std::ops::Range<f64>) -> f64 {
    (rng.random_range(range) * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::SampleMarketData;
    use crate::agents::{HistoryPeriod, MarketDataSource, SourceError};

    #[test]
    fn same_symbol_yields_same_data() {
        let source = SampleMarketData::new();

        assert_eq!(
            source.price_history("AAPL", HistoryPeriod::OneYear).unwrap(),
            source.price_history("aapl", HistoryPeriod::OneYear).unwrap()
        );
        assert_eq!(
            source.key_ratios("AAPL").unwrap(),
            source.key_ratios("AAPL").unwrap()
        );
        assert_ne!(
            source.key_ratios("AAPL").unwrap(),
            source.key_ratios("MSFT").unwrap()
        );
    }

    #[test]
    fn history_length_follows_period() {
        let source = SampleMarketData::new();

        let quick = source.price_history("NVDA", HistoryPeriod::ThreeMonths).unwrap();
        let deep = source.price_history("NVDA", HistoryPeriod::OneYear).unwrap();
        assert_eq!(quick.closes.len(), 63);
        assert_eq!(deep.closes.len(), 252);
        assert!(deep.closes.iter().all(|close| *close > 0.0));
        assert_eq!(deep.latest_close(), deep.closes.last().copied());
    }

    #[test]
    fn news_respects_limit() {
        let source = SampleMarketData::new();
        let items = source.news("TSLA", 2).unwrap();

        assert!(items.len() <= 2);
        assert!(items.iter().all(|item| item.title.contains("TSLA")));
    }

    #[test]
    fn unknown_symbols_are_reported() {
        let source = SampleMarketData::new().with_unknown_symbol("nope");

        assert_eq!(
            source.company_profile("NOPE").unwrap_err(),
            SourceError::SymbolNotFound("NOPE".to_string())
        );
    }
}
