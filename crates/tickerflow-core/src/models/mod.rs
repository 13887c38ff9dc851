pub mod error;
pub mod execution;
pub mod job;
pub mod payload;
pub mod timestamp;

pub use error::{CoreError, CoreErrorKind, UnitFailure, UnitResult};
pub use execution::{
    ExecutionCompletion, ExecutionId, ExecutionRecord, ExecutionStatus, StepCompletion,
    StepExecution,
};
pub use job::{
    AnalysisDepth, AnalyzeStockParameters, JobHandle, JobParameters, JobRequest, JobType,
    JobTypeDescriptor, JobTypeStatus, ParameterSpec,
};
pub use payload::{
    Action, FundamentalAnalysis, FundamentalScores, JobResult, MomentumSignal, NewsSentiment,
    Rating, Recommendation, SentimentLabel, StepPayload, StockReport, TechnicalSignals, Trend,
};
