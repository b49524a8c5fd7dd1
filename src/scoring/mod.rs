// src/scoring/mod.rs
//! Scoring engine: four independent scorers, a combiner, and a bounded parallel pool.
//!
//! Scorers never touch storage. Everything cross-run they need (reference time, history
//! window of prior fingerprints, source weight table) arrives in an immutable [`RunContext`].
//! A scorer failing on one article falls back to its neutral value and is reported; the
//! only fatal conditions are invalid configuration and a crashed worker.

pub mod combine;
pub mod history;
pub mod scorers;
pub mod source_weights;

pub use combine::combine;
pub use history::HistoryWindow;
pub use scorers::Scorer;
pub use source_weights::SourceWeights;

use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::{ScoreError, ScoringInfraError, StageFailure};
use crate::model::{Article, FactorScore, ScoreBreakdown};
use scorers::{NoveltyScorer, RecencyScorer, SourceScorer, TopicScorer};

/// Read-only inputs shared by every scorer during one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub reference_time: DateTime<Utc>,
    pub history: HistoryWindow,
    pub source_weights: SourceWeights,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredArticle {
    pub article: Article,
    pub score: ScoreBreakdown,
    /// Scorer failures replaced by neutral defaults.
    pub errors: Vec<ScoreError>,
}

#[derive(Debug, Clone)]
pub struct ScoringEngine {
    scorers: Vec<(Scorer, f64)>,
}

impl ScoringEngine {
    /// Validate scoring parameters and build the scorer set in declaration order.
    pub fn from_config(cfg: &PipelineConfig) -> Result<Self, ScoringInfraError> {
        cfg.validate()?;
        let sum = cfg.weights.sum();
        if (sum - 1.0).abs() > 1e-3 {
            tracing::warn!(target: "scoring", sum, "scorer weights do not sum to 1");
        }
        let w = cfg.weights;
        Ok(Self {
            scorers: vec![
                (Scorer::Recency(RecencyScorer::new(&cfg.recency)), w.recency),
                (Scorer::Source(SourceScorer), w.source),
                (Scorer::Topic(TopicScorer::new(&cfg.topic)), w.topic),
                (Scorer::Novelty(NoveltyScorer::new(&cfg.novelty)), w.novelty),
            ],
        })
    }

    /// Score one article with every factor.
    pub fn score(&self, article: &Article, ctx: &RunContext) -> (ScoreBreakdown, Vec<ScoreError>) {
        let mut errors = Vec::new();
        let factors = self
            .scorers
            .iter()
            .map(|(scorer, weight)| {
                let (value, reason, fallback) = match scorer.score(article, ctx) {
                    Ok((v, r)) => (v, r, false),
                    Err(e) => {
                        let v = scorer.neutral();
                        let reason = format!("{} unavailable (neutral {v:.2})", scorer.factor());
                        errors.push(e);
                        (v, reason, true)
                    }
                };
                FactorScore {
                    factor: scorer.factor(),
                    value,
                    weight: *weight,
                    contribution: value * weight,
                    reason,
                    fallback,
                }
            })
            .collect();
        (combine(factors), errors)
    }

    /// Score a pool on up to `concurrency` blocking workers.
    ///
    /// Returns only after every worker finished; output order equals input order.
    pub async fn score_pool(
        self: &Arc<Self>,
        articles: Vec<Article>,
        ctx: Arc<RunContext>,
        concurrency: usize,
    ) -> Result<Vec<ScoredArticle>, StageFailure> {
        crate::metrics::ensure_metrics_described();
        if articles.is_empty() {
            return Ok(Vec::new());
        }
        let chunk = articles.len().div_ceil(concurrency.max(1));

        let mut handles = Vec::new();
        let mut rest = articles;
        while !rest.is_empty() {
            let tail = rest.split_off(chunk.min(rest.len()));
            let batch = std::mem::replace(&mut rest, tail);
            let engine = Arc::clone(self);
            let ctx = Arc::clone(&ctx);
            handles.push(tokio::task::spawn_blocking(move || {
                batch
                    .into_iter()
                    .map(|article| {
                        let (score, errors) = engine.score(&article, &ctx);
                        ScoredArticle {
                            article,
                            score,
                            errors,
                        }
                    })
                    .collect::<Vec<_>>()
            }));
        }

        let mut out = Vec::new();
        for h in handles {
            let scored = h
                .await
                .map_err(|e| StageFailure::ScoringWorker(e.to_string()))?;
            out.extend(scored);
        }

        let fallbacks: usize = out.iter().map(|s| s.errors.len()).sum();
        for s in out.iter().filter(|s| !s.errors.is_empty()) {
            for e in &s.errors {
                tracing::warn!(target: "scoring", article = s.article.id, error = %e, "scorer fell back to neutral");
            }
        }
        counter!("newsrank_scored_total").increment(out.len() as u64);
        counter!("newsrank_scorer_fallbacks_total").increment(fallbacks as u64);
        tracing::info!(target: "scoring", scored = out.len(), fallbacks, "scoring pass finished");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(id: u64, hours_ago: i64) -> Article {
        let now = Utc.with_ymd_and_hms(2025, 10, 14, 12, 0, 0).unwrap();
        Article {
            id,
            canonical_url: format!("https://a.example/{id}"),
            title: format!("story {id}"),
            excerpt: String::new(),
            fingerprint: format!("fp{id}"),
            outlet: None,
            published_at: Some(now - chrono::Duration::hours(hours_ago)),
            source_id: "s".into(),
            first_seen_at: now,
            last_seen_at: now,
        }
    }

    fn ctx() -> Arc<RunContext> {
        Arc::new(RunContext {
            reference_time: Utc.with_ymd_and_hms(2025, 10, 14, 12, 0, 0).unwrap(),
            history: HistoryWindow::new(),
            source_weights: SourceWeights::default(),
        })
    }

    #[test]
    fn invalid_config_is_infra_error() {
        let mut cfg = PipelineConfig::default();
        cfg.novelty.cap = 0;
        assert_eq!(
            ScoringEngine::from_config(&cfg).unwrap_err(),
            ScoringInfraError::InvalidNoveltyCap
        );
    }

    #[test]
    fn breakdown_lists_factors_in_declaration_order() {
        let engine = ScoringEngine::from_config(&PipelineConfig::default()).unwrap();
        let (b, errors) = engine.score(&article(1, 0), &ctx());
        assert!(errors.is_empty());
        let names: Vec<_> = b.factors.iter().map(|f| f.factor.as_str()).collect();
        assert_eq!(names, ["recency", "source", "topic", "novelty"]);
        // 0.3*1 + 0.2*0.5 + 0.3*0.5 + 0.2*1
        assert!((b.total - 0.75).abs() < 1e-9);
    }

    #[test]
    fn failing_scorer_uses_neutral_default() {
        let mut engine = ScoringEngine::from_config(&PipelineConfig::default()).unwrap();
        engine.scorers[0].0 = Scorer::Recency(RecencyScorer {
            half_life_hours: f64::NAN,
            unknown_value: 0.25,
        });
        let (b, errors) = engine.score(&article(1, 3), &ctx());
        assert_eq!(errors, vec![ScoreError::NonFinite { factor: "recency" }]);
        assert!(b.factors[0].fallback);
        assert_eq!(b.factors[0].value, scorers::NEUTRAL_RECENCY);
    }

    #[tokio::test]
    async fn pool_preserves_input_order() {
        let engine = Arc::new(ScoringEngine::from_config(&PipelineConfig::default()).unwrap());
        let articles: Vec<_> = (1..=10).map(|i| article(i, i as i64)).collect();
        let scored = engine.score_pool(articles, ctx(), 3).await.unwrap();
        let ids: Vec<_> = scored.iter().map(|s| s.article.id).collect();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
    }
}
