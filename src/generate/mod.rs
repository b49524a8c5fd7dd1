// src/generate/mod.rs
//! Narration generation: turns the ranked selection into prose of a target length.
//!
//! One capability ([`Generator`]) with a closed set of providers ([`GeneratorKind`]),
//! picked from configuration when the run starts.

pub mod openai;

pub use openai::OpenAiGenerator;

use chrono::NaiveDate;
use once_cell::sync::OnceCell;
use regex::Regex;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::config::{GeneratorConfig, GeneratorProvider};
use crate::error::GenerationError;
use crate::model::SelectedArticle;

/// Spoken words per minute used for length targets and estimates.
pub const WORDS_PER_MINUTE: u32 = 160;

#[derive(Debug, Clone, PartialEq)]
pub struct Narration {
    pub text: String,
    pub words: usize,
    pub estimated_minutes: f64,
}

impl Narration {
    pub fn new(text: String) -> Self {
        let words = word_count(&text);
        Self {
            text,
            words,
            estimated_minutes: words as f64 / WORDS_PER_MINUTE as f64,
        }
    }
}

pub fn word_count(text: &str) -> usize {
    static RE_WORD: OnceCell<Regex> = OnceCell::new();
    RE_WORD
        .get_or_init(|| Regex::new(r"\b\w+\b").unwrap())
        .find_iter(text)
        .count()
}

#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        selection: &[SelectedArticle],
        target_minutes: u32,
        run_date: NaiveDate,
    ) -> Result<Narration, GenerationError>;
    fn name(&self) -> &'static str;
}

/// Configured generator provider.
#[derive(Debug)]
pub enum GeneratorKind {
    Mock(MockGenerator),
    OpenAi(OpenAiGenerator),
}

impl GeneratorKind {
    pub fn from_config(cfg: &GeneratorConfig) -> Result<Self, GenerationError> {
        Ok(match cfg.provider {
            GeneratorProvider::Mock => Self::Mock(MockGenerator),
            GeneratorProvider::OpenAi => Self::OpenAi(OpenAiGenerator::from_config(cfg)?),
        })
    }

    pub fn into_shared(self) -> Arc<dyn Generator> {
        Arc::new(self)
    }
}

#[async_trait::async_trait]
impl Generator for GeneratorKind {
    async fn generate(
        &self,
        selection: &[SelectedArticle],
        target_minutes: u32,
        run_date: NaiveDate,
    ) -> Result<Narration, GenerationError> {
        match self {
            Self::Mock(g) => g.generate(selection, target_minutes, run_date).await,
            Self::OpenAi(g) => g.generate(selection, target_minutes, run_date).await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Mock(g) => g.name(),
            Self::OpenAi(g) => g.name(),
        }
    }
}

/// Markdown show notes of a selection; the prompt input for model-backed generators.
pub fn show_notes(selection: &[SelectedArticle], run_date: NaiveDate) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Date: {run_date}");
    let _ = writeln!(out, "Total Articles: {}", selection.len());
    for s in selection {
        let a = &s.article;
        let outlet = a.outlet.as_deref().unwrap_or(&a.source_id);
        let published = a
            .published_at
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "undated".to_string());
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "## {}. {} ({outlet}, {published})",
            s.run_article.rank.unwrap_or_default(),
            a.title
        );
        let lead: String = a.excerpt.chars().take(600).collect();
        if !lead.is_empty() {
            let _ = writeln!(out, "{lead}");
        }
        let _ = writeln!(out, "Why: {}", s.run_article.score.explanation);
    }
    out
}

/// Deterministic narration for tests and offline runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockGenerator;

#[async_trait::async_trait]
impl Generator for MockGenerator {
    async fn generate(
        &self,
        selection: &[SelectedArticle],
        target_minutes: u32,
        run_date: NaiveDate,
    ) -> Result<Narration, GenerationError> {
        if selection.is_empty() {
            return Err(GenerationError::EmptySelection);
        }
        let mut text = String::new();
        let _ = writeln!(text, "Welcome to your news briefing for {run_date}.");
        let _ = writeln!(
            text,
            "Today we cover {} stories in about {target_minutes} minutes.",
            selection.len()
        );
        for s in selection {
            let a = &s.article;
            let outlet = a.outlet.as_deref().unwrap_or(&a.source_id);
            let _ = writeln!(text);
            let _ = writeln!(
                text,
                "Story {}: {}, from {outlet}.",
                s.run_article.rank.unwrap_or_default(),
                a.title
            );
        }
        let _ = writeln!(text);
        let _ = writeln!(text, "That's all for today.");
        Ok(Narration::new(text))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
