// src/pipeline/stages.rs
//! The five stage bodies. Each mutates only the in-memory run (counters, warnings,
//! checkpoint fields); the driver persists after it returns.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use super::{warn, Carry, Next, Orchestrator};
use crate::admission::AdmissionLedger;
use crate::artifacts;
use crate::error::{StageFailure, StorageError};
use crate::ingest::ingest_sources;
use crate::model::{Run, RunArticle, RunId, RunStatus, SelectedArticle, Stage};
use crate::scoring::{HistoryWindow, RunContext, ScoredArticle, ScoringEngine, SourceWeights};
use crate::select::{select, Diversity};

impl Orchestrator {
    pub(super) async fn ingest(&self, run: &mut Run) -> Result<Next, StageFailure> {
        let sources = self.cfg.enabled_sources();
        if sources.is_empty() {
            return Err(StageFailure::NoSources);
        }
        for s in &sources {
            if let Err(e) = self.repo.upsert_source(s).await {
                warn(run, Stage::Ingesting, format!("source `{}` not recorded: {e}", s.id));
            }
        }

        let report = ingest_sources(
            &sources,
            Arc::clone(&self.feed),
            Arc::clone(&self.extractor),
            run.max_candidates,
            self.cfg.run.ingest_concurrency,
        )
        .await;

        let c = &mut run.counters;
        c.sources_attempted = report.sources_attempted as u64;
        c.sources_failed = report.source_failures.len() as u64;
        c.ingested = report.candidates.len() as u64;
        c.extraction_failed = report.extraction_failures.len() as u64;
        for e in &report.source_failures {
            warn(run, Stage::Ingesting, e.to_string());
        }
        for e in &report.extraction_failures {
            warn(run, Stage::Ingesting, e.to_string());
        }

        if report.candidates.is_empty() {
            return Err(StageFailure::NoCandidates {
                sources: report.sources_attempted,
                failures: report.source_failures,
            });
        }
        run.pending_candidates = report.candidates;
        Ok(Next::Advance(RunStatus::Admitting))
    }

    pub(super) async fn admit(&self, run: &mut Run) -> Result<Next, StageFailure> {
        let now = Utc::now();
        let ledger = match AdmissionLedger::load(Arc::clone(&self.repo), self.cfg.admission, now).await {
            Ok(l) => l,
            Err(e) => {
                warn(run, Stage::Admitting, format!("title history unavailable: {e}"));
                AdmissionLedger::new(Arc::clone(&self.repo), self.cfg.admission)
            }
        };
        let ledger = Arc::new(ledger);
        let report = ledger
            .admit_all(&run.pending_candidates, now, self.cfg.run.ingest_concurrency)
            .await;

        let c = &mut run.counters;
        c.admitted_new = report.admitted_new;
        c.rejected_duplicate = report.duplicates;
        c.rejected_low_quality = report.low_quality;
        c.rejected_invalid = report.invalid;
        c.rejected_storage = report.storage_failures;
        for w in report.warnings {
            warn(run, Stage::Admitting, w);
        }

        run.admitted = report.pool;
        run.pending_candidates.clear();
        Ok(Next::Advance(RunStatus::Scoring))
    }

    pub(super) async fn score(&self, run: &mut Run, carry: &mut Carry) -> Result<Next, StageFailure> {
        let engine = Arc::new(ScoringEngine::from_config(&self.cfg)?);
        let articles = self.repo.get_articles(&run.admitted).await?;
        let history = self.load_history(run.id).await?;
        tracing::debug!(target: "scoring", run_id = run.id, prior_runs = history.run_count(), "history window loaded");

        let ctx = Arc::new(RunContext {
            reference_time: run.started_at,
            history,
            source_weights: SourceWeights::from_sources(&self.cfg.sources),
        });
        let scored = engine
            .score_pool(articles, ctx, self.cfg.run.scoring_concurrency)
            .await?;

        run.counters.scored = scored.len() as u64;
        run.counters.scorer_fallbacks = scored.iter().map(|s| s.errors.len() as u64).sum();
        for s in &scored {
            for e in &s.errors {
                warn(run, Stage::Scoring, format!("article {}: {e}", s.article.id));
            }
        }

        let rows = scored
            .iter()
            .map(|s| RunArticle {
                run_id: run.id,
                article_id: s.article.id,
                score: s.score.clone(),
                rank: None,
            })
            .collect();
        self.repo.replace_run_articles(run.id, rows).await?;
        carry.scored = Some(scored);
        Ok(Next::Advance(RunStatus::Selecting))
    }

    pub(super) async fn select(&self, run: &mut Run, carry: &mut Carry) -> Result<Next, StageFailure> {
        let pool = match carry.scored.take() {
            Some(p) => p,
            None => self.load_scored(run.id).await?,
        };
        if pool.is_empty() {
            return Err(StageFailure::NoArticles);
        }

        let diversity = self.cfg.selection.category_quota.as_ref().map(|quota| Diversity {
            quota: quota.clone(),
            categories: self
                .cfg
                .sources
                .iter()
                .filter(|s| !s.category.is_empty())
                .map(|s| (s.id.clone(), s.category.clone()))
                .collect(),
        });
        let selected = select(
            run.id,
            &pool,
            run.max_selected,
            self.cfg.selection.min_score,
            diversity.as_ref(),
        );

        let ranks: HashMap<u64, u32> = selected
            .iter()
            .filter_map(|s| s.run_article.rank.map(|r| (s.article.id, r)))
            .collect();
        let rows = pool
            .iter()
            .map(|s| RunArticle {
                run_id: run.id,
                article_id: s.article.id,
                score: s.score.clone(),
                rank: ranks.get(&s.article.id).copied(),
            })
            .collect();
        self.repo.replace_run_articles(run.id, rows).await?;

        if selected.is_empty() {
            if let Some(min) = self.cfg.selection.min_score {
                warn(run, Stage::Selecting, format!("no article reached min_score {min}"));
            }
        }
        run.counters.selected = selected.len() as u64;
        metrics::counter!("newsrank_selected_total").increment(selected.len() as u64);
        tracing::info!(target: "pipeline", run_id = run.id, pool = pool.len(), selected = selected.len(), "selection done");

        let dir = artifacts::run_dir(&self.cfg.run.artifacts_dir, run);
        match artifacts::write_selection(&dir, run, &selected) {
            Ok(p) => run.artifacts.selection = Some(p.display().to_string()),
            Err(e) => warn(run, Stage::Selecting, format!("selection artifact not written: {e:#}")),
        }
        carry.selected = Some(selected);
        Ok(Next::Advance(RunStatus::Generating))
    }

    pub(super) async fn generate(&self, run: &mut Run, carry: &mut Carry) -> Result<Next, StageFailure> {
        let selected = match carry.selected.take() {
            Some(s) => s,
            None => self.load_selection(run.id).await?,
        };
        let result = self
            .generator
            .generate(&selected, run.target_minutes, run.run_date)
            .await;
        carry.selected = Some(selected);

        let narration = match result {
            Ok(n) => n,
            Err(e) => {
                warn(run, Stage::Generating, format!("{} generator failed: {e}", self.generator.name()));
                return Ok(Next::Finish(RunStatus::Partial));
            }
        };
        let dir = artifacts::run_dir(&self.cfg.run.artifacts_dir, run);
        let status = match artifacts::write_narration(&dir, run, &narration) {
            Ok(p) => {
                run.artifacts.narration = Some(p.display().to_string());
                RunStatus::Completed
            }
            Err(e) => {
                warn(run, Stage::Generating, format!("narration artifact not written: {e:#}"));
                RunStatus::Partial
            }
        };
        carry.narration = Some(narration);
        Ok(Next::Finish(status))
    }

    /// Fingerprints scored by the most recent finished (COMPLETED or PARTIAL) runs before `run_id`.
    async fn load_history(&self, run_id: RunId) -> Result<HistoryWindow, StorageError> {
        let mut window = HistoryWindow::new();
        let lookback = self.cfg.novelty.lookback_runs;
        if lookback == 0 {
            return Ok(window);
        }
        let prior = self.repo.runs_before(run_id, usize::MAX).await?;
        for r in prior
            .into_iter()
            .filter(|r| matches!(r.status, RunStatus::Completed | RunStatus::Partial))
            .take(lookback)
        {
            let ids: Vec<u64> = self
                .repo
                .run_articles(r.id)
                .await?
                .into_iter()
                .map(|ra| ra.article_id)
                .collect();
            let articles = self.repo.get_articles(&ids).await?;
            window.push_run(r.id, articles.into_iter().map(|a| a.fingerprint));
        }
        Ok(window)
    }

    /// Rebuild the scored pool from persisted rows, in row order.
    async fn load_scored(&self, run_id: RunId) -> Result<Vec<ScoredArticle>, StorageError> {
        let rows = self.repo.run_articles(run_id).await?;
        let ids: Vec<u64> = rows.iter().map(|r| r.article_id).collect();
        let mut articles: HashMap<u64, _> = self
            .repo
            .get_articles(&ids)
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();
        Ok(rows
            .into_iter()
            .filter_map(|r| {
                articles.remove(&r.article_id).map(|article| ScoredArticle {
                    article,
                    score: r.score,
                    errors: Vec::new(),
                })
            })
            .collect())
    }

    /// Ranked rows of a run joined with their articles, in rank order.
    pub(super) async fn load_selection(&self, run_id: RunId) -> Result<Vec<SelectedArticle>, StorageError> {
        let mut rows: Vec<RunArticle> = self
            .repo
            .run_articles(run_id)
            .await?
            .into_iter()
            .filter(|r| r.rank.is_some())
            .collect();
        rows.sort_by_key(|r| r.rank);
        let ids: Vec<u64> = rows.iter().map(|r| r.article_id).collect();
        let mut articles: HashMap<u64, _> = self
            .repo
            .get_articles(&ids)
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();
        Ok(rows
            .into_iter()
            .filter_map(|r| {
                articles.remove(&r.article_id).map(|article| SelectedArticle {
                    article,
                    run_article: r,
                })
            })
            .collect())
    }
}
