use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{CoreError, CoreErrorKind, ExecutionId, ExecutionStatus};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    #[serde(alias = "analyze")]
    AnalyzeStock,
    CompareStocks,
    MarketScan,
}

impl JobType {
    pub const ALL: [JobType; 3] = [Self::AnalyzeStock, Self::CompareStocks, Self::MarketScan];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AnalyzeStock => "analyze_stock",
            Self::CompareStocks => "compare_stocks",
            Self::MarketScan => "market_scan",
        }
    }
}

impl Display for JobType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "analyze_stock" | "analyze" => Ok(Self::AnalyzeStock),
            "compare_stocks" => Ok(Self::CompareStocks),
            "market_scan" => Ok(Self::MarketScan),
            other => Err(CoreError::new(
                CoreErrorKind::UnknownJobType,
                format!("unknown job type '{other}'"),
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobTypeStatus {
    Active,
    ComingSoon,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct JobTypeDescriptor {
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub description: &'static str,
    pub parameters: &'static [ParameterSpec],
    pub status: JobTypeStatus,
}

/// Opaque key-value input handed to a job. Never mutated after submission.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobParameters(BTreeMap<String, Value>);

impl JobParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for JobParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDepth {
    Quick,
    Deep,
}

/// Validated view of the `analyze_stock` parameters.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AnalyzeStockParameters {
    pub symbol: String,
    pub depth: AnalysisDepth,
}

impl AnalyzeStockParameters {
    pub fn parse(parameters: &JobParameters) -> Result<Self, CoreError> {
        let symbol = match parameters.get("symbol") {
            Some(Value::String(raw)) if !raw.trim().is_empty() => raw.trim().to_uppercase(),
            Some(Value::String(_)) | None | Some(Value::Null) => {
                return Err(validation_error("missing required parameter: symbol"));
            }
            Some(_) => return Err(validation_error("parameter 'symbol' must be a string")),
        };

        if !symbol
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '^' | '='))
        {
            return Err(validation_error(format!(
                "parameter 'symbol' contains unsupported characters: '{symbol}'"
            )));
        }

        let depth = match parameters.get_str("analysis_depth") {
            None => AnalysisDepth::Deep,
            Some("deep") => AnalysisDepth::Deep,
            Some("quick") => AnalysisDepth::Quick,
            Some(other) => {
                return Err(validation_error(format!(
                    "parameter 'analysis_depth' must be 'quick' or 'deep', got '{other}'"
                )));
            }
        };

        Ok(Self { symbol, depth })
    }
}

fn validation_error(message: impl Into<String>) -> CoreError {
    CoreError::new(CoreErrorKind::Validation, message).with_job_type(JobType::AnalyzeStock)
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_type: String,
    #[serde(default)]
    pub parameters: JobParameters,
}

impl JobRequest {
    pub fn new(job_type: impl Into<String>, parameters: JobParameters) -> Self {
        Self {
            job_type: job_type.into(),
            parameters,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct JobHandle {
    pub execution_id: ExecutionId,
    pub job_type: JobType,
    pub status: ExecutionStatus,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::{AnalysisDepth, AnalyzeStockParameters, JobParameters, JobType};
    use crate::models::CoreErrorKind;

    #[test]
    fn analyze_alias_resolves_to_analyze_stock() {
        assert_eq!("analyze".parse::<JobType>().unwrap(), JobType::AnalyzeStock);
        assert_eq!(
            "forecast_universe".parse::<JobType>().unwrap_err().kind,
            CoreErrorKind::UnknownJobType
        );
    }

    #[test]
    fn symbol_is_required_and_normalized() {
        let missing = AnalyzeStockParameters::parse(&JobParameters::new()).unwrap_err();
        assert_eq!(missing.kind, CoreErrorKind::Validation);

        let parsed =
            AnalyzeStockParameters::parse(&JobParameters::new().with("symbol", " aapl ")).unwrap();
        assert_eq!(parsed.symbol, "AAPL");
        assert_eq!(parsed.depth, AnalysisDepth::Deep);
    }

    #[test]
    fn unknown_depth_is_rejected() {
        let parameters = JobParameters::new()
            .with("symbol", "MSFT")
            .with("analysis_depth", "extreme");
        let error = AnalyzeStockParameters::parse(&parameters).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::Validation);
        assert!(error.message.contains("analysis_depth"));
    }
}
