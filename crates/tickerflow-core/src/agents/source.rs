use crate::models::UnitFailure;

pub type SourceResult<T> = Result<T, SourceError>;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum SourceError {
    #[error("symbol '{0}' was not found by the market data source")]
    SymbolNotFound(String),
    #[error("market data source unavailable: {0}")]
    Unavailable(String),
    #[error("market data request timed out: {0}")]
    Timeout(String),
}

/// Every source failure is retried; a symbol the source does not know yet may
/// resolve on a later call.
impl From<SourceError> for UnitFailure {
    fn from(error: SourceError) -> Self {
        UnitFailure::transient(error.to_string())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum HistoryPeriod {
    ThreeMonths,
    OneYear,
}

impl HistoryPeriod {
    pub fn trading_days(self) -> usize {
        match self {
            Self::ThreeMonths => 63,
            Self::OneYear => 252,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompanyProfile {
    pub name: String,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
}

/// Ratios are fractions (0.25 == 25%) except the multiples.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KeyRatios {
    pub pe_trailing: Option<f64>,
    pub peg_ratio: Option<f64>,
    pub price_to_book: Option<f64>,
    pub profit_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub roe: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub earnings_growth: Option<f64>,
    pub current_ratio: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub quick_ratio: Option<f64>,
}

/// Daily closes, oldest first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PriceHistory {
    pub closes: Vec<f64>,
}

impl PriceHistory {
    pub fn latest_close(&self) -> Option<f64> {
        self.closes.last().copied()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NewsItem {
    pub title: String,
    pub publisher: Option<String>,
}

/// Opaque financial data collaborator. Calls may block and may fail; every
/// method must be safe to call again after a failure.
pub trait MarketDataSource: Send + Sync {
    fn company_profile(&self, symbol: &str) -> SourceResult<CompanyProfile>;

    fn key_ratios(&self, symbol: &str) -> SourceResult<KeyRatios>;

    fn price_history(&self, symbol: &str, period: HistoryPeriod) -> SourceResult<PriceHistory>;

    fn news(&self, symbol: &str, limit: usize) -> SourceResult<Vec<NewsItem>>;
}
