// src/ingest/mod.rs
pub mod extract;
pub mod normalize;
pub mod providers;
pub mod types;

pub use normalize::{canonical_url, fingerprint, fold_text, normalize_text, outlet_of};

use crate::error::{ExtractionError, FetchError};
use crate::ingest::types::{ContentExtractor, FeedSource};
use crate::model::{Candidate, Source};
use metrics::counter;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Everything one ingestion pass produced, including what went wrong.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub candidates: Vec<Candidate>,
    pub sources_attempted: usize,
    pub source_failures: Vec<FetchError>,
    pub extraction_failures: Vec<ExtractionError>,
}

#[derive(Debug)]
enum SourceOutcome {
    Fetched {
        candidates: Vec<Candidate>,
        extraction_failures: Vec<ExtractionError>,
    },
    Failed(FetchError),
}

/// Items kept per source: the candidate budget split evenly, at least one.
pub fn per_source_limit(max_candidates: usize, sources: usize) -> usize {
    (max_candidates / sources.max(1)).max(1)
}

/// Fetch every source on a bounded worker pool and extract missing bodies.
///
/// A failing source is recorded and skipped; candidates come back in source order
/// regardless of completion order, truncated to `max_candidates`.
pub async fn ingest_sources(
    sources: &[Source],
    feed: Arc<dyn FeedSource>,
    extractor: Arc<dyn ContentExtractor>,
    max_candidates: usize,
    concurrency: usize,
) -> IngestReport {
    crate::metrics::ensure_metrics_described();

    let per_source = per_source_limit(max_candidates, sources.len());
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let collected: Arc<Mutex<Vec<(usize, SourceOutcome)>>> =
        Arc::new(Mutex::new(Vec::with_capacity(sources.len())));

    let mut workers = JoinSet::new();
    for (idx, source) in sources.iter().cloned().enumerate() {
        let feed = Arc::clone(&feed);
        let extractor = Arc::clone(&extractor);
        let permits = Arc::clone(&permits);
        let collected = Arc::clone(&collected);
        workers.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let outcome = ingest_one(&source, feed.as_ref(), extractor.as_ref(), per_source).await;
            if let Ok(mut out) = collected.lock() {
                out.push((idx, outcome));
            }
        });
    }
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            tracing::warn!(target: "ingest", error = %e, "ingest worker aborted");
        }
    }

    let mut outcomes = match collected.lock() {
        Ok(mut guard) => std::mem::take(&mut *guard),
        Err(_) => Vec::new(),
    };
    outcomes.sort_by_key(|(idx, _)| *idx);

    let mut report = IngestReport {
        sources_attempted: sources.len(),
        ..IngestReport::default()
    };
    let mut seen = vec![false; sources.len()];
    for (idx, outcome) in outcomes {
        seen[idx] = true;
        match outcome {
            SourceOutcome::Fetched {
                mut candidates,
                mut extraction_failures,
            } => {
                report.candidates.append(&mut candidates);
                report.extraction_failures.append(&mut extraction_failures);
            }
            SourceOutcome::Failed(e) => report.source_failures.push(e),
        }
    }
    for (idx, _) in seen.iter().enumerate().filter(|(_, s)| !**s) {
        report
            .source_failures
            .push(FetchError::new(&sources[idx].id, "ingest worker did not finish"));
    }
    report.candidates.truncate(max_candidates);

    counter!("newsrank_candidates_total").increment(report.candidates.len() as u64);
    counter!("newsrank_source_errors_total").increment(report.source_failures.len() as u64);
    counter!("newsrank_extraction_errors_total")
        .increment(report.extraction_failures.len() as u64);

    tracing::info!(
        target: "ingest",
        sources = report.sources_attempted,
        failed = report.source_failures.len(),
        candidates = report.candidates.len(),
        extraction_failed = report.extraction_failures.len(),
        "ingest pass finished"
    );
    report
}

async fn ingest_one(
    source: &Source,
    feed: &dyn FeedSource,
    extractor: &dyn ContentExtractor,
    limit: usize,
) -> SourceOutcome {
    let items = match feed.fetch(source).await {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(target: "ingest", source = %source.id, provider = feed.name(), error = %e, "source fetch failed");
            return SourceOutcome::Failed(e);
        }
    };

    let mut candidates = Vec::with_capacity(items.len().min(limit));
    let mut extraction_failures = Vec::new();
    for mut c in items.into_iter().take(limit) {
        c.source_id = source.id.clone();
        c.title = normalize_text(&c.title);
        c.text = c.text.as_deref().map(normalize_text).filter(|t| !t.is_empty());
        if c.text.is_none() {
            match extractor.extract(&c.url).await {
                Ok(body) => {
                    let body = normalize_text(&body);
                    c.text = (!body.is_empty()).then_some(body);
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", source = %source.id, error = %e, "extraction failed");
                    extraction_failures.push(e);
                }
            }
        }
        candidates.push(c);
    }
    SourceOutcome::Fetched {
        candidates,
        extraction_failures,
    }
}
