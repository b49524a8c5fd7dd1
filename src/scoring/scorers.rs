// src/scoring/scorers.rs
//! The four scoring factors. Each is a pure function of one article and the read-only
//! run context, returning a value in [0,1] and a one-line reason.

use crate::config::{NoveltyConfig, RecencyConfig, TopicConfig};
use crate::error::ScoreError;
use crate::ingest::normalize::tokens;
use crate::model::{Article, Factor};
use crate::scoring::source_weights::clamp01;
use crate::scoring::RunContext;

pub const NEUTRAL_RECENCY: f64 = 0.5;
pub const NEUTRAL_SOURCE: f64 = 0.5;
pub const NEUTRAL_NOVELTY: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RecencyScorer {
    pub half_life_hours: f64,
    pub unknown_value: f64,
}

impl RecencyScorer {
    pub fn new(cfg: &RecencyConfig) -> Self {
        Self {
            half_life_hours: cfg.half_life_hours,
            // strictly inside (0,1): never excluded, never better than brand new
            unknown_value: cfg.unknown_publish_value.clamp(0.01, 0.99),
        }
    }

    fn score(&self, a: &Article, ctx: &RunContext) -> (f64, String) {
        let Some(published) = a.published_at else {
            return (
                self.unknown_value,
                format!("publish time unknown (recency {:.2})", self.unknown_value),
            );
        };
        let age_ms = (ctx.reference_time - published).num_milliseconds().max(0);
        let age_hours = age_ms as f64 / 3_600_000.0;
        let value = (-std::f64::consts::LN_2 * age_hours / self.half_life_hours).exp();
        (
            value,
            format!("published {age_hours:.1}h ago (recency {value:.2})"),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceScorer;

impl SourceScorer {
    fn score(&self, a: &Article, ctx: &RunContext) -> (f64, String) {
        let label = a.outlet.as_deref().unwrap_or(&a.source_id);
        match ctx.source_weights.weight_for(&a.source_id) {
            Some(w) => (w, format!("source {label} trust {w:.2}")),
            None => (
                NEUTRAL_SOURCE,
                format!("source {label} unrated (neutral {NEUTRAL_SOURCE:.2})"),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicScorer {
    boost: Vec<Keyword>,
    suppress: Vec<Keyword>,
    baseline: f64,
    boost_step: f64,
    suppress_step: f64,
    title_weight: u32,
}

/// A keyword as a token sequence, matched on token boundaries.
#[derive(Debug, Clone, PartialEq)]
struct Keyword {
    label: String,
    needle: String,
}

impl Keyword {
    fn parse(raw: &str) -> Option<Self> {
        let toks = tokens(raw);
        if toks.is_empty() {
            return None;
        }
        let joined = toks.join(" ");
        Some(Self {
            needle: format!(" {joined} "),
            label: joined,
        })
    }
}

/// Token stream padded with spaces so `contains(" kw ")` respects boundaries.
fn haystack(s: &str) -> String {
    format!(" {} ", tokens(s).join(" "))
}

impl TopicScorer {
    pub fn new(cfg: &TopicConfig) -> Self {
        Self {
            boost: cfg.boost_keywords.iter().filter_map(|k| Keyword::parse(k)).collect(),
            suppress: cfg
                .suppress_keywords
                .iter()
                .filter_map(|k| Keyword::parse(k))
                .collect(),
            baseline: clamp01(cfg.baseline),
            boost_step: cfg.boost_step,
            suppress_step: cfg.suppress_step,
            title_weight: cfg.title_weight,
        }
    }

    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    fn hits<'k>(&self, keywords: &'k [Keyword], title: &str, body: &str) -> (u32, Vec<&'k str>) {
        let mut total = 0;
        let mut matched = Vec::new();
        for kw in keywords {
            let mut n = 0;
            if title.contains(&kw.needle) {
                n += self.title_weight;
            }
            if body.contains(&kw.needle) {
                n += 1;
            }
            if n > 0 {
                total += n;
                matched.push(kw.label.as_str());
            }
        }
        (total, matched)
    }

    fn score(&self, a: &Article, _ctx: &RunContext) -> (f64, String) {
        let title = haystack(&a.title);
        let body = haystack(&a.excerpt);
        let (boost_hits, boosted) = self.hits(&self.boost, &title, &body);
        let (suppress_hits, suppressed) = self.hits(&self.suppress, &title, &body);

        let raw = self.baseline + self.boost_step * boost_hits as f64
            - self.suppress_step * suppress_hits as f64;
        let value = clamp01(raw);

        let reason = match (boosted.is_empty(), suppressed.is_empty()) {
            (true, true) => format!("no topic keywords (topic {value:.2})"),
            (false, true) => format!("topic match: {} (topic {value:.2})", boosted.join(", ")),
            (true, false) => format!("suppressed: {} (topic {value:.2})", suppressed.join(", ")),
            (false, false) => format!(
                "topic match: {}; suppressed: {} (topic {value:.2})",
                boosted.join(", "),
                suppressed.join(", ")
            ),
        };
        (value, reason)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoveltyScorer {
    pub cap: u32,
}

impl NoveltyScorer {
    pub fn new(cfg: &NoveltyConfig) -> Self {
        Self { cap: cfg.cap.max(1) }
    }

    fn score(&self, a: &Article, ctx: &RunContext) -> (f64, String) {
        let seen = ctx.history.appearances(&a.fingerprint);
        let value = 1.0 - (seen as f64 / self.cap as f64).min(1.0);
        let reason = if seen == 0 {
            "not seen in recent runs".to_string()
        } else {
            format!(
                "seen in {seen} of last {} run(s) (novelty {value:.2})",
                ctx.history.run_count()
            )
        };
        (value, reason)
    }
}

/// Closed set of scoring factors behind one capability.
#[derive(Debug, Clone, PartialEq)]
pub enum Scorer {
    Recency(RecencyScorer),
    Source(SourceScorer),
    Topic(TopicScorer),
    Novelty(NoveltyScorer),
}

impl Scorer {
    pub fn factor(&self) -> Factor {
        match self {
            Self::Recency(_) => Factor::Recency,
            Self::Source(_) => Factor::Source,
            Self::Topic(_) => Factor::Topic,
            Self::Novelty(_) => Factor::Novelty,
        }
    }

    /// Value used when this scorer fails on an article.
    pub fn neutral(&self) -> f64 {
        match self {
            Self::Recency(_) => NEUTRAL_RECENCY,
            Self::Source(_) => NEUTRAL_SOURCE,
            Self::Topic(t) => t.baseline(),
            Self::Novelty(_) => NEUTRAL_NOVELTY,
        }
    }

    pub fn score(&self, a: &Article, ctx: &RunContext) -> Result<(f64, String), ScoreError> {
        let (value, reason) = match self {
            Self::Recency(s) => s.score(a, ctx),
            Self::Source(s) => s.score(a, ctx),
            Self::Topic(s) => s.score(a, ctx),
            Self::Novelty(s) => s.score(a, ctx),
        };
        if !value.is_finite() {
            return Err(ScoreError::NonFinite {
                factor: self.factor().as_str(),
            });
        }
        Ok((value.clamp(0.0, 1.0), reason))
    }
}
