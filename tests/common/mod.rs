// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use newsrank::error::{FetchError, GenerationError};
use newsrank::generate::{Generator, Narration};
use newsrank::ingest::types::{FeedSource, NoExtraction};
use newsrank::{
    Candidate, MemoryRepository, Orchestrator, PipelineConfig, Repository, SelectedArticle, Source,
};

pub fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 14).unwrap()
}

pub fn source(id: &str, category: &str) -> Source {
    Source {
        id: id.into(),
        name: id.to_uppercase(),
        url: format!("https://{id}.example/rss"),
        category: category.into(),
        weight: 0.8,
        enabled: true,
    }
}

pub fn body(seed: &str) -> String {
    format!("{seed} ").repeat(12)
}

pub fn candidate(source_id: &str, n: usize, hours_ago: i64) -> Candidate {
    Candidate {
        title: format!("{source_id} reports development number {n} today"),
        url: format!("https://{source_id}.example/story/{n}?utm_source=rss"),
        published_at: Some(Utc::now() - Duration::hours(hours_ago)),
        text: Some(body(&format!("{source_id} story {n} body"))),
        source_id: source_id.into(),
    }
}

/// Feed serving fixed candidates per source id; ids listed in `down` fail.
pub struct StaticFeed {
    pub items: HashMap<String, Vec<Candidate>>,
    pub down: Vec<String>,
    pub calls: AtomicUsize,
}

impl StaticFeed {
    pub fn new(sources: &[Source], per_source: usize) -> Self {
        let items = sources
            .iter()
            .map(|s| {
                let v = (0..per_source)
                    .map(|n| candidate(&s.id, n, n as i64 + 1))
                    .collect();
                (s.id.clone(), v)
            })
            .collect();
        Self {
            items,
            down: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_down(mut self, ids: &[&str]) -> Self {
        self.down = ids.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[async_trait]
impl FeedSource for StaticFeed {
    async fn fetch(&self, source: &Source) -> Result<Vec<Candidate>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.contains(&source.id) {
            return Err(FetchError::new(&source.id, "connection refused"));
        }
        Ok(self.items.get(&source.id).cloned().unwrap_or_default())
    }
    fn name(&self) -> &'static str {
        "static"
    }
}

/// Generator that always fails like an unreachable API.
pub struct DownGenerator;

#[async_trait]
impl Generator for DownGenerator {
    async fn generate(
        &self,
        _selection: &[SelectedArticle],
        _target_minutes: u32,
        _run_date: NaiveDate,
    ) -> Result<Narration, GenerationError> {
        Err(GenerationError::Status {
            status: 503,
            body: "service unavailable".into(),
        })
    }
    fn name(&self) -> &'static str {
        "down"
    }
}

pub fn config(sources: Vec<Source>, artifacts: &Path) -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.sources = sources;
    cfg.admission.min_body_chars = 20;
    cfg.admission.retry_base_delay_ms = 1;
    cfg.run.artifacts_dir = artifacts.to_path_buf();
    cfg
}

pub fn orchestrator(
    cfg: PipelineConfig,
    repo: Arc<MemoryRepository>,
    feed: Arc<StaticFeed>,
    generator: Arc<dyn Generator>,
) -> Orchestrator {
    let repo: Arc<dyn Repository> = repo;
    Orchestrator::new(cfg, repo, feed, Arc::new(NoExtraction), generator)
}
