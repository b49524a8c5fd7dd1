//! newsrank: binary entrypoint.
//! Loads config, wires the RSS feed, HTML extractor, repository and generator, then
//! executes (or resumes) one run and prints a JSON summary.
//!
//! Environment:
//! - `NEWSRANK_CONFIG_PATH`   config file (see `config.rs` for fallbacks)
//! - `NEWSRANK_STATE_PATH`    repository file, default `data/newsrank.json`
//! - `NEWSRANK_RUN_DATE`      `YYYY-MM-DD`, default today (UTC)
//! - `NEWSRANK_RESUME_RUN_ID` resume this run instead of starting a new one
//! - `NEWSRANK_LOG_JSON=1`    JSON log lines

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use newsrank::artifacts;
use newsrank::generate::GeneratorKind;
use newsrank::ingest::extract::HttpExtractor;
use newsrank::ingest::providers::RssFeed;
use newsrank::{load_config_default, MemoryRepository, Orchestrator, PipelineError, RunRequest};

const DEFAULT_STATE_PATH: &str = "data/newsrank.json";

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("newsrank=info,warn"));
    let json = std::env::var("NEWSRANK_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();
    let prometheus = newsrank::metrics::install_prometheus()?;

    let cfg = load_config_default()?;
    let state_path = std::env::var("NEWSRANK_STATE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_STATE_PATH));
    let repo = Arc::new(
        MemoryRepository::open(&state_path)
            .with_context(|| format!("opening state {}", state_path.display()))?,
    );

    let feed = Arc::new(RssFeed::http(Duration::from_secs(10))?);
    let extractor = Arc::new(HttpExtractor::new(Duration::from_secs(10))?);
    let generator = GeneratorKind::from_config(&cfg.generator)
        .context("building generator")?
        .into_shared();
    let artifacts_dir = cfg.run.artifacts_dir.clone();
    let defaults = cfg.run.clone();
    let orchestrator = Orchestrator::new(cfg, repo, feed, extractor, generator);

    let outcome = match std::env::var("NEWSRANK_RESUME_RUN_ID") {
        Ok(id) => {
            let id: u64 = id.parse().context("NEWSRANK_RESUME_RUN_ID must be a run id")?;
            orchestrator.resume(id).await
        }
        Err(_) => {
            let date = match std::env::var("NEWSRANK_RUN_DATE") {
                Ok(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                    .with_context(|| format!("NEWSRANK_RUN_DATE `{s}` is not YYYY-MM-DD"))?,
                Err(_) => Utc::now().date_naive(),
            };
            orchestrator
                .run(RunRequest::with_defaults(date, &defaults))
                .await
        }
    };

    let (summary, run_id) = match &outcome {
        Ok(r) => (
            serde_json::json!({
                "run_id": r.run_id,
                "status": r.status,
                "counters": r.counters,
                "warnings": r.warnings,
                "artifacts": r.artifacts,
                "selected": r.selected.iter().map(|s| serde_json::json!({
                    "rank": s.run_article.rank,
                    "score": s.run_article.score.total,
                    "title": s.article.title,
                    "url": s.article.canonical_url,
                    "why": s.run_article.score.explanation,
                })).collect::<Vec<_>>(),
            }),
            Some(r.run_id),
        ),
        Err(e) => (
            serde_json::json!({ "status": "FAILED", "error": e.to_string() }),
            e.run_id(),
        ),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(id) = run_id {
        if let Some(run) = orchestrator.repository().get_run(id).await? {
            let path = artifacts::run_dir(&artifacts_dir, &run).join("metrics.prom");
            if let Err(e) = std::fs::write(&path, prometheus.render()) {
                tracing::warn!(error = %e, path = %path.display(), "metrics snapshot not written");
            }
        }
    }

    match outcome {
        Ok(_) => Ok(()),
        Err(e @ PipelineError::Fatal { .. }) => Err(e.into()),
        Err(e) => Err(anyhow::Error::new(e).context("pipeline did not run")),
    }
}
