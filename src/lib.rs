// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod admission;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod generate;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod scoring;
pub mod select;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::admission::{AdmissionLedger, AdmissionResult, DuplicateKind, RejectReason};
pub use crate::config::{load_config_default, load_config_from, PipelineConfig};
pub use crate::error::{GenerationError, PipelineError, StageFailure};
pub use crate::generate::{Generator, GeneratorKind, MockGenerator};
pub use crate::model::{Article, Candidate, Run, RunArticle, RunStatus, SelectedArticle, Source};
pub use crate::pipeline::{Orchestrator, RunRequest, RunResult};
pub use crate::store::{MemoryRepository, Repository};

use chrono::NaiveDate;

/// Run the pipeline once for `date`.
///
/// ```ignore
/// let result = newsrank::run(&orchestrator, date, 12, 150, 20).await?;
/// for s in &result.selected {
///     println!("{} {:.2} {}", s.run_article.rank.unwrap_or(0), s.run_article.score.total, s.article.title);
/// }
/// ```
pub async fn run(
    orchestrator: &Orchestrator,
    date: NaiveDate,
    target_minutes: u32,
    max_candidates: usize,
    max_selected: usize,
) -> Result<RunResult, PipelineError> {
    orchestrator
        .run(RunRequest::new(date, target_minutes, max_candidates, max_selected))
        .await
}
