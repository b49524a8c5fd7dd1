// src/config.rs
//! Pipeline configuration: scorer weights, recency/novelty/topic parameters, admission
//! thresholds, selection quota, run defaults, generator and sources.
//!
//! Loading order:
//! 1) $NEWSRANK_CONFIG_PATH (must exist)
//! 2) config/newsrank.toml
//! 3) config/newsrank.json
//! 4) built-in defaults

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ScoringInfraError;
use crate::model::Source;

pub const ENV_CONFIG_PATH: &str = "NEWSRANK_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/newsrank.toml";
pub const DEFAULT_JSON_PATH: &str = "config/newsrank.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub weights: Weights,
    pub recency: RecencyConfig,
    pub novelty: NoveltyConfig,
    pub topic: TopicConfig,
    pub admission: AdmissionConfig,
    pub selection: SelectionConfig,
    pub run: RunDefaults,
    pub generator: GeneratorConfig,
    pub sources: Vec<Source>,
}

/// Combiner weights. Expected (not enforced) to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub recency: f64,
    pub source: f64,
    pub topic: f64,
    pub novelty: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            recency: 0.3,
            source: 0.2,
            topic: 0.3,
            novelty: 0.2,
        }
    }
}

impl Weights {
    pub fn sum(&self) -> f64 {
        self.recency + self.source + self.topic + self.novelty
    }

    fn named(&self) -> [(&'static str, f64); 4] {
        [
            ("recency", self.recency),
            ("source", self.source),
            ("topic", self.topic),
            ("novelty", self.novelty),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecencyConfig {
    pub half_life_hours: f64,
    /// Value used when the publish time is unknown. Kept inside (0, 1).
    pub unknown_publish_value: f64,
}

impl Default for RecencyConfig {
    fn default() -> Self {
        Self {
            half_life_hours: 48.0,
            unknown_publish_value: 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoveltyConfig {
    /// How many prior runs form the history window.
    pub lookback_runs: usize,
    /// Prior appearances at which novelty reaches zero.
    pub cap: u32,
}

impl Default for NoveltyConfig {
    fn default() -> Self {
        Self {
            lookback_runs: 4,
            cap: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub boost_keywords: Vec<String>,
    pub suppress_keywords: Vec<String>,
    pub baseline: f64,
    pub boost_step: f64,
    pub suppress_step: f64,
    /// Title hits count this many times.
    pub title_weight: u32,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            boost_keywords: Vec::new(),
            suppress_keywords: Vec::new(),
            baseline: 0.5,
            boost_step: 0.1,
            suppress_step: 0.2,
            title_weight: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    pub min_body_chars: usize,
    pub fingerprint_lookback_days: i64,
    pub fingerprint_body_chars: usize,
    pub near_duplicate_titles: bool,
    pub title_similarity_threshold: f64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            min_body_chars: 200,
            fingerprint_lookback_days: 30,
            fingerprint_body_chars: 2000,
            near_duplicate_titles: true,
            title_similarity_threshold: 0.85,
            max_retries: 3,
            retry_base_delay_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Max selected items per source category. Absent means no diversity constraint.
    pub category_quota: Option<BTreeMap<String, usize>>,
    /// Articles scoring below this total are never selected.
    pub min_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunDefaults {
    pub target_minutes: u32,
    pub max_candidates: usize,
    pub max_selected: usize,
    pub ingest_concurrency: usize,
    pub scoring_concurrency: usize,
    pub timeout_secs: Option<u64>,
    pub artifacts_dir: PathBuf,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            target_minutes: 12,
            max_candidates: 150,
            max_selected: 20,
            ingest_concurrency: 8,
            scoring_concurrency: 8,
            timeout_secs: None,
            artifacts_dir: PathBuf::from("runs"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorProvider {
    Mock,
    OpenAi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub provider: GeneratorProvider,
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: GeneratorProvider::Mock,
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

impl PipelineConfig {
    /// Checks the parameters the scoring stage cannot run without.
    pub fn validate(&self) -> Result<(), ScoringInfraError> {
        for (name, value) in self.weights.named() {
            if !value.is_finite() || value < 0.0 {
                return Err(ScoringInfraError::InvalidWeight { name, value });
            }
        }
        if self.weights.sum() <= 0.0 {
            return Err(ScoringInfraError::ZeroWeights);
        }
        let hl = self.recency.half_life_hours;
        if !hl.is_finite() || hl <= 0.0 {
            return Err(ScoringInfraError::InvalidHalfLife(hl));
        }
        if self.novelty.cap == 0 {
            return Err(ScoringInfraError::InvalidNoveltyCap);
        }
        if let Some(min) = self.selection.min_score.filter(|m| !m.is_finite()) {
            return Err(ScoringInfraError::InvalidMinScore(min));
        }
        Ok(())
    }

    pub fn enabled_sources(&self) -> Vec<Source> {
        self.sources.iter().filter(|s| s.enabled).cloned().collect()
    }
}

/// Load configuration from an explicit path. Supports TOML or JSON.
pub fn load_config_from(path: &Path) -> Result<PipelineConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
        .with_context(|| format!("parsing config {}", path.display()))
}

/// Load configuration using env var + fallbacks (see module docs).
pub fn load_config_default() -> Result<PipelineConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        } else {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from(DEFAULT_TOML_PATH);
    if toml_p.exists() {
        return load_config_from(&toml_p);
    }
    let json_p = PathBuf::from(DEFAULT_JSON_PATH);
    if json_p.exists() {
        return load_config_from(&json_p);
    }
    Ok(PipelineConfig::default())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<PipelineConfig> {
    if hint_ext == "json" {
        return Ok(serde_json::from_str(s)?);
    }
    match toml::from_str::<PipelineConfig>(s) {
        Ok(cfg) => Ok(cfg),
        Err(toml_err) => {
            if hint_ext == "toml" {
                return Err(toml_err.into());
            }
            serde_json::from_str(s).map_err(|_| anyhow!("unsupported config format: {toml_err}"))
        }
    }
}
