// src/artifacts.rs
//! Files a run leaves on disk under `<artifacts_dir>/<run_date>/run-<id>/`:
//! `selection.json`, `narration.md` (only when generation succeeded), `pipeline_stats.json`.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::generate::Narration;
use crate::model::{Run, RunCounters, RunStatus, SelectedArticle, StageTiming, StageWarning};

pub const SELECTION_FILE: &str = "selection.json";
pub const NARRATION_FILE: &str = "narration.md";
pub const STATS_FILE: &str = "pipeline_stats.json";

pub fn run_dir(base: &Path, run: &Run) -> PathBuf {
    base.join(run.run_date.to_string())
        .join(format!("run-{}", run.id))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

#[derive(Serialize)]
struct SelectionEntry<'a> {
    rank: u32,
    article_id: u64,
    title: &'a str,
    url: &'a str,
    outlet: Option<&'a str>,
    published_at: Option<String>,
    score: &'a crate::model::ScoreBreakdown,
}

#[derive(Serialize)]
struct SelectionFile<'a> {
    run_id: u64,
    run_date: String,
    target_minutes: u32,
    items: Vec<SelectionEntry<'a>>,
}

pub fn write_selection(dir: &Path, run: &Run, selection: &[SelectedArticle]) -> Result<PathBuf> {
    let file = SelectionFile {
        run_id: run.id,
        run_date: run.run_date.to_string(),
        target_minutes: run.target_minutes,
        items: selection
            .iter()
            .map(|s| SelectionEntry {
                rank: s.run_article.rank.unwrap_or_default(),
                article_id: s.article.id,
                title: &s.article.title,
                url: &s.article.canonical_url,
                outlet: s.article.outlet.as_deref(),
                published_at: s.article.published_at.map(|t| t.to_rfc3339()),
                score: &s.run_article.score,
            })
            .collect(),
    };
    let path = dir.join(SELECTION_FILE);
    write_atomic(&path, &serde_json::to_vec_pretty(&file)?)?;
    Ok(path)
}

pub fn write_narration(dir: &Path, run: &Run, narration: &Narration) -> Result<PathBuf> {
    let body = format!(
        "# News briefing {}\n\n<!-- {} words, ~{:.1} min (target {} min) -->\n\n{}\n",
        run.run_date,
        narration.words,
        narration.estimated_minutes,
        run.target_minutes,
        narration.text.trim_end()
    );
    let path = dir.join(NARRATION_FILE);
    write_atomic(&path, body.as_bytes())?;
    Ok(path)
}

#[derive(Serialize)]
struct StatsFile<'a> {
    run_id: u64,
    run_date: String,
    status: RunStatus,
    counters: &'a RunCounters,
    warnings: &'a [StageWarning],
    timings: &'a std::collections::BTreeMap<crate::model::Stage, StageTiming>,
    started_at: String,
    finished_at: Option<String>,
    failure: Option<&'a str>,
}

pub fn write_stats(dir: &Path, run: &Run) -> Result<PathBuf> {
    let file = StatsFile {
        run_id: run.id,
        run_date: run.run_date.to_string(),
        status: run.status,
        counters: &run.counters,
        warnings: &run.warnings,
        timings: &run.timings,
        started_at: run.started_at.to_rfc3339(),
        finished_at: run.finished_at.map(|t| t.to_rfc3339()),
        failure: run.failure.as_deref(),
    };
    let path = dir.join(STATS_FILE);
    write_atomic(&path, &serde_json::to_vec_pretty(&file)?)?;
    Ok(path)
}
