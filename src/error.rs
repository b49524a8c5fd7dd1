//! Error taxonomy for the ranking pipeline.
//!
//! Recoverable errors (`FetchError`, `ExtractionError`, `AdmissionStorageError`,
//! `ScoreError`, `GenerationError`) are captured at the stage that produced them and
//! recorded as run warnings. `ScoringInfraError` and `PipelineError::Fatal` end a run.

use crate::model::Stage;
use thiserror::Error;

/// One feed could not be fetched or parsed. Never aborts the batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("source `{source_id}`: {cause}")]
pub struct FetchError {
    pub source_id: String,
    pub cause: String,
}

impl FetchError {
    pub fn new(source_id: impl Into<String>, cause: impl ToString) -> Self {
        Self {
            source_id: source_id.into(),
            cause: cause.to_string(),
        }
    }
}

/// Main-content extraction failed for one candidate URL.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("extraction failed for {url}: {cause}")]
pub struct ExtractionError {
    pub url: String,
    pub cause: String,
}

impl ExtractionError {
    pub fn new(url: impl Into<String>, cause: impl ToString) -> Self {
        Self {
            url: url.into(),
            cause: cause.to_string(),
        }
    }
}

/// Errors raised by a `Repository` implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl StorageError {
    /// Errors worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io(_))
    }
}

/// Storage kept failing while admitting one candidate; the candidate is rejected.
#[derive(Debug, Error)]
#[error("admission storage error for {url} after {attempts} attempt(s): {cause}")]
pub struct AdmissionStorageError {
    pub url: String,
    pub attempts: u32,
    #[source]
    pub cause: StorageError,
}

/// Misconfiguration of the scoring stage. Fatal for the run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScoringInfraError {
    #[error("scorer weight `{name}` must be finite and >= 0 (got {value})")]
    InvalidWeight { name: &'static str, value: f64 },
    #[error("all scorer weights are zero")]
    ZeroWeights,
    #[error("recency half-life must be finite and > 0 hours (got {0})")]
    InvalidHalfLife(f64),
    #[error("novelty cap must be >= 1")]
    InvalidNoveltyCap,
    #[error("selection min_score must be finite (got {0})")]
    InvalidMinScore(f64),
}

/// A single scorer failed on a single article; the neutral default is used instead.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScoreError {
    #[error("{factor} produced a non-finite value")]
    NonFinite { factor: &'static str },
}

/// The downstream narration step failed. The run ends PARTIAL.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generator API key is not set (env `{0}`)")]
    MissingApiKey(String),
    #[error("generator request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("generator returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generator returned an empty response")]
    EmptyResponse,
    #[error("nothing to narrate")]
    EmptySelection,
}

/// Why a stage ended the run.
#[derive(Debug, Error)]
pub enum StageFailure {
    #[error("zero candidates across {sources} source(s)")]
    NoCandidates {
        sources: usize,
        failures: Vec<FetchError>,
    },
    #[error("no enabled sources configured")]
    NoSources,
    #[error(transparent)]
    ScoringInfra(#[from] ScoringInfraError),
    #[error("scoring worker failed: {0}")]
    ScoringWorker(String),
    #[error("zero admitted articles survived to selection")]
    NoArticles,
    #[error("run timed out after {elapsed_secs}s")]
    Timeout { elapsed_secs: u64 },
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("run {run_id} failed at {stage}: {cause}")]
    Fatal {
        run_id: u64,
        stage: Stage,
        #[source]
        cause: StageFailure,
    },
    #[error("run {0} not found")]
    RunNotFound(u64),
    #[error("run {run_id} already finished with status {status}")]
    Terminal {
        run_id: u64,
        status: crate::model::RunStatus,
    },
    #[error("run {run_id}: illegal transition {from} -> {to}")]
    InvalidTransition {
        run_id: u64,
        from: crate::model::RunStatus,
        to: crate::model::RunStatus,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PipelineError {
    pub fn run_id(&self) -> Option<u64> {
        match self {
            Self::Fatal { run_id, .. }
            | Self::Terminal { run_id, .. }
            | Self::InvalidTransition { run_id, .. } => Some(*run_id),
            Self::RunNotFound(id) => Some(*id),
            Self::Storage(_) => None,
        }
    }
}
