// src/pipeline/mod.rs
//! Run orchestrator: drives one run through
//! `CREATED → INGESTING → ADMITTING → SCORING → SELECTING → GENERATING → COMPLETED`.
//!
//! The persisted status is always the next stage to execute. Each stage's output is
//! checkpointed on the run before the status moves on, so resuming is one rule: load the
//! run and execute from its status onward. Recoverable problems become run warnings;
//! fatal ones persist the run as FAILED and come back as [`PipelineError::Fatal`].

mod stages;

use chrono::{DateTime, NaiveDate, Utc};
use metrics::{counter, gauge, histogram};
use std::sync::Arc;
use tokio::time::Instant;

use crate::artifacts;
use crate::config::{PipelineConfig, RunDefaults};
use crate::error::{PipelineError, StageFailure};
use crate::generate::{Generator, Narration};
use crate::ingest::types::{ContentExtractor, FeedSource};
use crate::model::{
    NewRun, Run, RunArtifacts, RunCounters, RunId, RunStatus, SelectedArticle, Stage,
    StageTiming, StageWarning,
};
use crate::scoring::ScoredArticle;
use crate::store::Repository;

/// Parameters of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRequest {
    pub run_date: NaiveDate,
    pub target_minutes: u32,
    pub max_candidates: usize,
    pub max_selected: usize,
}

impl RunRequest {
    pub fn new(
        run_date: NaiveDate,
        target_minutes: u32,
        max_candidates: usize,
        max_selected: usize,
    ) -> Self {
        Self {
            run_date,
            target_minutes,
            max_candidates,
            max_selected,
        }
    }

    /// Request for `run_date` using the configured run defaults.
    pub fn with_defaults(run_date: NaiveDate, defaults: &RunDefaults) -> Self {
        Self::new(
            run_date,
            defaults.target_minutes,
            defaults.max_candidates,
            defaults.max_selected,
        )
    }
}

/// What a finished (COMPLETED or PARTIAL) run hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub run_id: RunId,
    pub run_date: NaiveDate,
    pub status: RunStatus,
    pub selected: Vec<SelectedArticle>,
    pub narration: Option<Narration>,
    pub artifacts: RunArtifacts,
    pub counters: RunCounters,
    pub warnings: Vec<StageWarning>,
}

/// Stage outputs carried in memory within one invocation. Anything missing after a
/// resume is reloaded from the repository.
#[derive(Debug, Default)]
struct Carry {
    scored: Option<Vec<ScoredArticle>>,
    selected: Option<Vec<SelectedArticle>>,
    narration: Option<Narration>,
}

pub struct Orchestrator {
    cfg: PipelineConfig,
    repo: Arc<dyn Repository>,
    feed: Arc<dyn FeedSource>,
    extractor: Arc<dyn ContentExtractor>,
    generator: Arc<dyn Generator>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("feed", &self.feed.name())
            .field("generator", &self.generator.name())
            .finish_non_exhaustive()
    }
}

/// What a stage asks the driver to do next.
enum Next {
    Advance(RunStatus),
    Finish(RunStatus),
}

impl Orchestrator {
    pub fn new(
        cfg: PipelineConfig,
        repo: Arc<dyn Repository>,
        feed: Arc<dyn FeedSource>,
        extractor: Arc<dyn ContentExtractor>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            cfg,
            repo,
            feed,
            extractor,
            generator,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    /// Create a new run and drive it to a terminal status.
    pub async fn run(&self, req: RunRequest) -> Result<RunResult, PipelineError> {
        crate::metrics::ensure_metrics_described();
        let run = self
            .repo
            .create_run(NewRun {
                run_date: req.run_date,
                target_minutes: req.target_minutes,
                max_candidates: req.max_candidates,
                max_selected: req.max_selected,
                started_at: Utc::now(),
            })
            .await?;
        tracing::info!(
            target: "pipeline",
            run_id = run.id,
            date = %run.run_date,
            target_minutes = run.target_minutes,
            max_candidates = run.max_candidates,
            max_selected = run.max_selected,
            "run created"
        );
        self.drive(run).await
    }

    /// Continue a non-terminal run from its last checkpoint.
    pub async fn resume(&self, run_id: RunId) -> Result<RunResult, PipelineError> {
        crate::metrics::ensure_metrics_described();
        let run = self
            .repo
            .get_run(run_id)
            .await?
            .ok_or(PipelineError::RunNotFound(run_id))?;
        if run.status.is_terminal() {
            return Err(PipelineError::Terminal {
                run_id,
                status: run.status,
            });
        }
        tracing::info!(target: "pipeline", run_id, status = %run.status, "resuming run");
        self.drive(run).await
    }

    async fn drive(&self, mut run: Run) -> Result<RunResult, PipelineError> {
        let clock = Instant::now();
        let timeout = self.cfg.run.timeout_secs.map(std::time::Duration::from_secs);
        let mut carry = Carry::default();

        if run.status == RunStatus::Created {
            self.advance(&mut run, RunStatus::Ingesting).await?;
        }

        while let Some(stage) = run.status.stage() {
            if let Some(limit) = timeout {
                let elapsed = clock.elapsed();
                if elapsed >= limit {
                    let elapsed_secs = elapsed.as_secs();
                    if stage == Stage::Generating {
                        // ranked selection already persisted
                        warn(&mut run, stage, format!("run timed out after {elapsed_secs}s before narration"));
                        self.finish(&mut run, RunStatus::Partial).await?;
                        break;
                    }
                    return self
                        .fail(&mut run, stage, StageFailure::Timeout { elapsed_secs })
                        .await;
                }
            }

            let started_at = Utc::now();
            let t0 = Instant::now();
            tracing::info!(target: "pipeline", run_id = run.id, %stage, "stage started");
            let outcome = match stage {
                Stage::Ingesting => self.ingest(&mut run).await,
                Stage::Admitting => self.admit(&mut run).await,
                Stage::Scoring => self.score(&mut run, &mut carry).await,
                Stage::Selecting => self.select(&mut run, &mut carry).await,
                Stage::Generating => self.generate(&mut run, &mut carry).await,
            };
            record_timing(&mut run, stage, started_at, t0);

            match outcome {
                Ok(Next::Advance(next)) => self.advance(&mut run, next).await?,
                Ok(Next::Finish(status)) => {
                    self.finish(&mut run, status).await?;
                    break;
                }
                Err(cause) => return self.fail(&mut run, stage, cause).await,
            }
        }

        let selected = match carry.selected.take() {
            Some(s) => s,
            None => self.load_selection(run.id).await?,
        };
        Ok(RunResult {
            run_id: run.id,
            run_date: run.run_date,
            status: run.status,
            selected,
            narration: carry.narration.take(),
            artifacts: run.artifacts.clone(),
            counters: run.counters.clone(),
            warnings: run.warnings.clone(),
        })
    }

    /// Move to the next stage and persist the checkpoint.
    async fn advance(&self, run: &mut Run, next: RunStatus) -> Result<(), PipelineError> {
        if !run.status.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                run_id: run.id,
                from: run.status,
                to: next,
            });
        }
        tracing::debug!(target: "pipeline", run_id = run.id, from = %run.status, to = %next, "checkpoint");
        run.status = next;
        self.repo.save_run(run).await?;
        Ok(())
    }

    /// Enter a terminal status, write the stats artifact and persist.
    async fn finish(&self, run: &mut Run, status: RunStatus) -> Result<(), PipelineError> {
        if !run.status.can_transition_to(status) {
            return Err(PipelineError::InvalidTransition {
                run_id: run.id,
                from: run.status,
                to: status,
            });
        }
        run.status = status;
        run.finished_at = Some(Utc::now());
        self.write_stats(run);
        self.repo.save_run(run).await?;
        record_finished(run);
        tracing::info!(
            target: "pipeline",
            run_id = run.id,
            status = %run.status,
            selected = run.counters.selected,
            warnings = run.warnings.len(),
            "run finished"
        );
        Ok(())
    }

    async fn fail(
        &self,
        run: &mut Run,
        stage: Stage,
        cause: StageFailure,
    ) -> Result<RunResult, PipelineError> {
        tracing::error!(target: "pipeline", run_id = run.id, %stage, error = %cause, "run failed");
        run.status = RunStatus::Failed;
        run.finished_at = Some(Utc::now());
        run.failure = Some(format!("{stage}: {cause}"));
        run.pending_candidates.clear();
        self.write_stats(run);
        if let Err(e) = self.repo.save_run(run).await {
            tracing::error!(target: "pipeline", run_id = run.id, error = %e, "could not persist failed run");
        }
        record_finished(run);
        Err(PipelineError::Fatal {
            run_id: run.id,
            stage,
            cause,
        })
    }

    fn write_stats(&self, run: &mut Run) {
        let dir = artifacts::run_dir(&self.cfg.run.artifacts_dir, run);
        let path = dir.join(artifacts::STATS_FILE);
        run.artifacts.stats = Some(path.display().to_string());
        if let Err(e) = artifacts::write_stats(&dir, run) {
            run.artifacts.stats = None;
            tracing::warn!(target: "pipeline", run_id = run.id, error = %e, "stats artifact not written");
        }
    }
}

fn warn(run: &mut Run, stage: Stage, message: String) {
    tracing::warn!(target: "pipeline", run_id = run.id, %stage, %message, "stage warning");
    run.warnings.push(StageWarning { stage, message });
}

fn record_timing(run: &mut Run, stage: Stage, started_at: DateTime<Utc>, t0: Instant) {
    let duration_ms = t0.elapsed().as_millis() as u64;
    histogram!("newsrank_stage_ms", "stage" => stage.as_str()).record(duration_ms as f64);
    run.timings.insert(
        stage,
        StageTiming {
            started_at,
            finished_at: Utc::now(),
            duration_ms,
        },
    );
}

fn record_finished(run: &Run) {
    counter!("newsrank_runs_total", "status" => run.status.to_string()).increment(1);
    gauge!("newsrank_last_run_ts").set(Utc::now().timestamp() as f64);
}
