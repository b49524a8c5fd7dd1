//! model.rs: records that flow through one run and the durable rows a run leaves behind.
//!
//! Candidate → Article → (RunArticle, rank) → generator input.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type ArticleId = u64;
pub type RunId = u64;

/// A feed item before admission. Lives for one run only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub title: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Extracted body text; `None` when extraction failed or was not attempted.
    pub text: Option<String>,
    pub source_id: String,
}

/// Durable record of one distinct piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub canonical_url: String,
    pub title: String,
    /// Normalized leading body text (kept for topic scoring and narration).
    pub excerpt: String,
    /// Hex SHA-256 over normalized title + leading body.
    pub fingerprint: String,
    pub outlet: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub source_id: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Article fields known before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    pub canonical_url: String,
    pub title: String,
    pub excerpt: String,
    pub fingerprint: String,
    pub outlet: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub source_id: String,
    pub seen_at: DateTime<Utc>,
}

impl NewArticle {
    pub fn into_article(self, id: ArticleId) -> Article {
        Article {
            id,
            canonical_url: self.canonical_url,
            title: self.title,
            excerpt: self.excerpt,
            fingerprint: self.fingerprint,
            outlet: self.outlet,
            published_at: self.published_at,
            source_id: self.source_id,
            first_seen_at: self.seen_at,
            last_seen_at: self.seen_at,
        }
    }
}

/// Feed configuration. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_source_weight")]
    pub weight: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_source_weight() -> f64 {
    1.0
}

fn default_enabled() -> bool {
    true
}

/// Near-duplicate grouping under one canonical article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub canonical_id: ArticleId,
    pub member_urls: Vec<String>,
}

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingesting,
    Admitting,
    Scoring,
    Selecting,
    Generating,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Ingesting,
        Stage::Admitting,
        Stage::Scoring,
        Stage::Selecting,
        Stage::Generating,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Ingesting => "ingesting",
            Stage::Admitting => "admitting",
            Stage::Scoring => "scoring",
            Stage::Selecting => "selecting",
            Stage::Generating => "generating",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run lifecycle.
///
/// `Created → Ingesting → Admitting → Scoring → Selecting → Generating → Completed`,
/// plus absorbing `Failed` (from any non-terminal status) and `Partial` (a ranked
/// selection exists but no narration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Created,
    Ingesting,
    Admitting,
    Scoring,
    Selecting,
    Generating,
    Completed,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Partial | Self::Failed)
    }

    /// Stage executed while in this status.
    pub fn stage(self) -> Option<Stage> {
        match self {
            Self::Ingesting => Some(Stage::Ingesting),
            Self::Admitting => Some(Stage::Admitting),
            Self::Scoring => Some(Stage::Scoring),
            Self::Selecting => Some(Stage::Selecting),
            Self::Generating => Some(Stage::Generating),
            _ => None,
        }
    }

    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        match (self, next) {
            (s, _) if s.is_terminal() => false,
            (_, Failed) => true,
            (Created, Ingesting)
            | (Ingesting, Admitting)
            | (Admitting, Scoring)
            | (Scoring, Selecting)
            | (Selecting, Generating)
            | (Generating, Completed) => true,
            (Selecting, Partial) | (Generating, Partial) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::Ingesting => "INGESTING",
            Self::Admitting => "ADMITTING",
            Self::Scoring => "SCORING",
            Self::Selecting => "SELECTING",
            Self::Generating => "GENERATING",
            Self::Completed => "COMPLETED",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Counters reported for every run, degraded or not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub sources_attempted: u64,
    pub sources_failed: u64,
    pub ingested: u64,
    pub extraction_failed: u64,
    pub admitted_new: u64,
    pub rejected_duplicate: u64,
    pub rejected_low_quality: u64,
    pub rejected_invalid: u64,
    pub rejected_storage: u64,
    pub scored: u64,
    pub scorer_fallbacks: u64,
    pub selected: u64,
}

/// A recoverable problem captured at a stage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageWarning {
    pub stage: Stage,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunArtifacts {
    pub selection: Option<String>,
    pub narration: Option<String>,
    pub stats: Option<String>,
}

/// One pipeline execution. Mutated only by the orchestrator; frozen once terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub run_date: NaiveDate,
    pub target_minutes: u32,
    pub max_candidates: usize,
    pub max_selected: usize,
    pub status: RunStatus,
    pub counters: RunCounters,
    pub warnings: Vec<StageWarning>,
    pub timings: BTreeMap<Stage, StageTiming>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failure: Option<String>,
    pub artifacts: RunArtifacts,
    /// Checkpointed ingestion output, consumed by admission.
    #[serde(default)]
    pub pending_candidates: Vec<Candidate>,
    /// Checkpointed admission output, consumed by scoring.
    #[serde(default)]
    pub admitted: Vec<ArticleId>,
}

/// Parameters of a new run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewRun {
    pub run_date: NaiveDate,
    pub target_minutes: u32,
    pub max_candidates: usize,
    pub max_selected: usize,
    pub started_at: DateTime<Utc>,
}

impl NewRun {
    pub fn into_run(self, id: RunId) -> Run {
        Run {
            id,
            run_date: self.run_date,
            target_minutes: self.target_minutes,
            max_candidates: self.max_candidates,
            max_selected: self.max_selected,
            status: RunStatus::Created,
            counters: RunCounters::default(),
            warnings: Vec::new(),
            timings: BTreeMap::new(),
            started_at: self.started_at,
            finished_at: None,
            failure: None,
            artifacts: RunArtifacts::default(),
            pending_candidates: Vec::new(),
            admitted: Vec::new(),
        }
    }
}

/// Scoring factors in declaration order (also the explanation tie-break order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    Recency,
    Source,
    Topic,
    Novelty,
}

impl Factor {
    pub const ALL: [Factor; 4] = [Factor::Recency, Factor::Source, Factor::Topic, Factor::Novelty];

    pub fn as_str(self) -> &'static str {
        match self {
            Factor::Recency => "recency",
            Factor::Source => "source",
            Factor::Topic => "topic",
            Factor::Novelty => "novelty",
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-factor sub-score with its explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorScore {
    pub factor: Factor,
    pub value: f64,
    pub weight: f64,
    pub contribution: f64,
    pub reason: String,
    /// True when the scorer failed and its neutral default was used.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

/// Composite score of one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub total: f64,
    pub factors: Vec<FactorScore>,
    /// Factor reasons ordered by descending contribution.
    pub explanation: String,
}

/// Result of scoring one article within one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArticle {
    pub run_id: RunId,
    pub article_id: ArticleId,
    pub score: ScoreBreakdown,
    /// 1-based rank; present only if selected.
    pub rank: Option<u32>,
}

/// One selected article as handed to the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedArticle {
    pub article: Article,
    pub run_article: RunArticle,
}
