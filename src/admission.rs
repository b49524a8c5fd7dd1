// src/admission.rs
//! Article admission ledger: the gate between ingested candidates and scoring.
//!
//! Per candidate:
//! 1) canonicalize the URL,
//! 2) fingerprint folded title + leading body,
//! 3) reject empty or short bodies,
//! 4) known canonical URL ⇒ duplicate,
//! 5) known fingerprint within the lookback window ⇒ duplicate,
//! 6) optional near-duplicate title check (token-set overlap coefficient),
//! 7) otherwise insert and report NEW.
//!
//! Steps 1 to 3 are pure and run on the worker pool. Steps 4 to 7 run one candidate at a
//! time under the title lock, in candidate order for a batch, so the same input always
//! yields the same canonical article. Steps 4 and 5 are decided by the repository's
//! atomic insert-or-conflict as well. Transient storage errors are retried with
//! exponential backoff plus jitter; exhausted retries reject only that candidate.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use rand::{rng, Rng};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinSet;

use crate::config::AdmissionConfig;
use crate::error::{AdmissionStorageError, StorageError};
use crate::ingest::normalize::tokens;
use crate::ingest::{canonical_url, fingerprint, outlet_of};
use crate::model::{Article, ArticleId, Candidate, NewArticle};
use crate::store::{ConflictKey, InsertOutcome, Repository};

const MAX_RETRY_DELAY: StdDuration = StdDuration::from_secs(2);
/// Titles with this many tokens or fewer never count as near-duplicates.
const MIN_TITLE_TOKENS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKind {
    Url,
    Fingerprint,
    SimilarTitle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    EmptyBody,
    BodyTooShort { chars: usize, min: usize },
    InvalidUrl(String),
    Storage(String),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyBody => f.write_str("empty body"),
            Self::BodyTooShort { chars, min } => write!(f, "body too short ({chars} < {min} chars)"),
            Self::InvalidUrl(e) => write!(f, "invalid url: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionResult {
    New(Article),
    Duplicate {
        existing: ArticleId,
        kind: DuplicateKind,
    },
    Rejected(RejectReason),
}

impl AdmissionResult {
    fn label(&self) -> &'static str {
        match self {
            Self::New(_) => "new",
            Self::Duplicate { .. } => "duplicate",
            Self::Rejected(RejectReason::EmptyBody | RejectReason::BodyTooShort { .. }) => {
                "low_quality"
            }
            Self::Rejected(RejectReason::InvalidUrl(_)) => "invalid",
            Self::Rejected(RejectReason::Storage(_)) => "storage",
        }
    }
}

/// Outcome of admitting one batch of candidates.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AdmissionReport {
    /// Article ids that enter scoring: NEW articles and the canonical member of each
    /// duplicate, deduplicated, in candidate order.
    pub pool: Vec<ArticleId>,
    pub admitted_new: u64,
    pub duplicates: u64,
    pub low_quality: u64,
    pub invalid: u64,
    pub storage_failures: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
struct KnownTitle {
    id: ArticleId,
    tokens: BTreeSet<String>,
}

/// A candidate that passed the pure checks and is ready to be committed.
#[derive(Debug)]
struct Prepared {
    url: String,
    tokens: BTreeSet<String>,
    article: NewArticle,
}

pub struct AdmissionLedger {
    repo: Arc<dyn Repository>,
    cfg: AdmissionConfig,
    /// Held across the title check, the insert and the push of the new title.
    titles: AsyncMutex<Vec<KnownTitle>>,
}

impl std::fmt::Debug for AdmissionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionLedger")
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

/// Overlap coefficient `|A∩B| / min(|A|,|B|)` of two token sets.
pub fn title_overlap(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / smaller as f64
}

fn title_tokens(title: &str) -> BTreeSet<String> {
    tokens(title).into_iter().collect()
}

impl AdmissionLedger {
    /// Ledger with an empty title memory.
    pub fn new(repo: Arc<dyn Repository>, cfg: AdmissionConfig) -> Self {
        Self {
            repo,
            cfg,
            titles: AsyncMutex::new(Vec::new()),
        }
    }

    /// Build a ledger whose title memory covers articles first seen inside the lookback window.
    pub async fn load(
        repo: Arc<dyn Repository>,
        cfg: AdmissionConfig,
        now: DateTime<Utc>,
    ) -> Result<Self, StorageError> {
        let titles = if cfg.near_duplicate_titles && cfg.title_similarity_threshold > 0.0 {
            let since = now - Duration::days(cfg.fingerprint_lookback_days);
            repo.articles_since(since)
                .await?
                .into_iter()
                .map(|a| KnownTitle {
                    id: a.id,
                    tokens: title_tokens(&a.title),
                })
                .collect()
        } else {
            Vec::new()
        };
        Ok(Self {
            repo,
            cfg,
            titles: AsyncMutex::new(titles),
        })
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.cfg
    }

    /// Decide NEW / DUPLICATE / REJECTED for one candidate, persisting NEW articles.
    pub async fn admit(&self, candidate: &Candidate, now: DateTime<Utc>) -> AdmissionResult {
        let result = match self.prepare(candidate, now) {
            Ok(prepared) => self.commit(prepared, now).await,
            Err(reason) => AdmissionResult::Rejected(reason),
        };
        observe(candidate, &result);
        result
    }

    fn prepare(&self, candidate: &Candidate, now: DateTime<Utc>) -> Result<Prepared, RejectReason> {
        let url = canonical_url(&candidate.url).map_err(|e| RejectReason::InvalidUrl(e.0))?;
        let body = candidate.text.as_deref().unwrap_or("").trim();
        let chars = body.chars().count();
        if chars == 0 {
            return Err(RejectReason::EmptyBody);
        }
        if chars < self.cfg.min_body_chars {
            return Err(RejectReason::BodyTooShort {
                chars,
                min: self.cfg.min_body_chars,
            });
        }
        let article = NewArticle {
            outlet: outlet_of(&url),
            canonical_url: url.clone(),
            title: candidate.title.clone(),
            excerpt: body.chars().take(self.cfg.fingerprint_body_chars).collect(),
            fingerprint: fingerprint(&candidate.title, body, self.cfg.fingerprint_body_chars),
            published_at: candidate.published_at,
            source_id: candidate.source_id.clone(),
            seen_at: now,
        };
        Ok(Prepared {
            url,
            tokens: title_tokens(&candidate.title),
            article,
        })
    }

    async fn commit(&self, prepared: Prepared, now: DateTime<Utc>) -> AdmissionResult {
        let Prepared {
            url,
            tokens,
            article,
        } = prepared;
        let repo = self.repo.as_ref();
        let since = now - Duration::days(self.cfg.fingerprint_lookback_days);
        let mut titles = self.titles.lock().await;

        // Cheap URL check so an exact repeat is reported as a URL duplicate before the
        // title heuristic runs; the insert below still enforces uniqueness.
        match self.retrying(&url, || repo.find_by_url(&url)).await {
            Ok(Some(existing)) => {
                drop(titles);
                return self
                    .record_duplicate(existing.id, DuplicateKind::Url, &url, now)
                    .await;
            }
            Ok(None) => {}
            Err(e) => return self.storage_rejection(e),
        }

        if let Some(existing) = self.similar_title(&titles, &tokens) {
            drop(titles);
            return self
                .record_duplicate(existing, DuplicateKind::SimilarTitle, &url, now)
                .await;
        }

        let outcome = self
            .retrying(&url, || repo.insert_article(article.clone(), since))
            .await;
        match outcome {
            Ok(InsertOutcome::Inserted(article)) => {
                titles.push(KnownTitle {
                    id: article.id,
                    tokens,
                });
                AdmissionResult::New(article)
            }
            Ok(InsertOutcome::Conflict { existing, key }) => {
                drop(titles);
                let kind = match key {
                    ConflictKey::Url => DuplicateKind::Url,
                    ConflictKey::Fingerprint => DuplicateKind::Fingerprint,
                };
                self.record_duplicate(existing, kind, &url, now).await
            }
            Err(e) => self.storage_rejection(e),
        }
    }

    fn similar_title(&self, titles: &[KnownTitle], tokens: &BTreeSet<String>) -> Option<ArticleId> {
        if !self.cfg.near_duplicate_titles
            || self.cfg.title_similarity_threshold <= 0.0
            || tokens.len() <= MIN_TITLE_TOKENS
        {
            return None;
        }
        titles
            .iter()
            .filter(|k| k.tokens.len() > MIN_TITLE_TOKENS)
            .find(|k| title_overlap(tokens, &k.tokens) >= self.cfg.title_similarity_threshold)
            .map(|k| k.id)
    }

    /// Bump `last_seen_at` and remember the alternate URL. Failures here are logged only;
    /// the duplicate decision already stands.
    async fn record_duplicate(
        &self,
        existing: ArticleId,
        kind: DuplicateKind,
        url: &str,
        now: DateTime<Utc>,
    ) -> AdmissionResult {
        if let Err(e) = self.repo.touch_article(existing, now).await {
            tracing::warn!(target: "admission", existing, error = %e, "last-seen bump failed");
        }
        if kind != DuplicateKind::Url {
            if let Err(e) = self.repo.add_cluster_member(existing, url).await {
                tracing::warn!(target: "admission", existing, error = %e, "cluster update failed");
            }
        }
        AdmissionResult::Duplicate { existing, kind }
    }

    fn storage_rejection(&self, e: AdmissionStorageError) -> AdmissionResult {
        tracing::warn!(target: "admission", url = %e.url, attempts = e.attempts, error = %e.cause, "candidate rejected on storage error");
        AdmissionResult::Rejected(RejectReason::Storage(e.to_string()))
    }

    /// Run a storage call, retrying transient errors with
    /// `min(base * 2^(attempt-1), 2s) + jitter(0..=base)`.
    async fn retrying<T, F, Fut>(&self, url: &str, mut op: F) -> Result<T, AdmissionStorageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let base = StdDuration::from_millis(self.cfg.retry_base_delay_ms);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt <= self.cfg.max_retries => {
                    let exp = base.saturating_mul(1u32 << (attempt - 1).min(16));
                    let jitter_ms: u64 = rng().random_range(0..=self.cfg.retry_base_delay_ms);
                    let delay = exp.min(MAX_RETRY_DELAY) + StdDuration::from_millis(jitter_ms);
                    tracing::warn!(target: "admission", url, attempt, max = self.cfg.max_retries, ?delay, error = %e, "storage call failed; backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(cause) => {
                    return Err(AdmissionStorageError {
                        url: url.to_string(),
                        attempts: attempt,
                        cause,
                    })
                }
            }
        }
    }

    /// Admit a batch. URL canonicalization, body checks and fingerprinting run on a
    /// bounded worker pool; storage decisions are then committed in candidate order.
    /// Never fails as a whole: every problem is folded into the report.
    pub async fn admit_all(
        self: &Arc<Self>,
        candidates: &[Candidate],
        now: DateTime<Utc>,
        concurrency: usize,
    ) -> AdmissionReport {
        crate::metrics::ensure_metrics_described();

        let permits = Arc::new(Semaphore::new(concurrency.max(1)));
        let collected: Arc<Mutex<Vec<(usize, Result<Prepared, RejectReason>)>>> =
            Arc::new(Mutex::new(Vec::with_capacity(candidates.len())));

        let mut workers = JoinSet::new();
        for (idx, candidate) in candidates.iter().cloned().enumerate() {
            let ledger = Arc::clone(self);
            let permits = Arc::clone(&permits);
            let collected = Arc::clone(&collected);
            workers.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                let prepared = ledger.prepare(&candidate, now);
                if let Ok(mut out) = collected.lock() {
                    out.push((idx, prepared));
                }
            });
        }
        let mut report = AdmissionReport::default();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(target: "admission", error = %e, "admission worker aborted");
                report.storage_failures += 1;
                report.warnings.push(format!("admission worker aborted: {e}"));
            }
        }

        let mut prepared = match collected.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => Vec::new(),
        };
        prepared.sort_by_key(|(idx, _)| *idx);

        let mut results = Vec::with_capacity(prepared.len());
        for (idx, p) in prepared {
            let result = match p {
                Ok(p) => self.commit(p, now).await,
                Err(reason) => AdmissionResult::Rejected(reason),
            };
            observe(&candidates[idx], &result);
            results.push((idx, result));
        }

        let mut in_pool = BTreeSet::new();
        for (idx, result) in results {
            let joined = match result {
                AdmissionResult::New(a) => {
                    report.admitted_new += 1;
                    Some(a.id)
                }
                AdmissionResult::Duplicate { existing, .. } => {
                    report.duplicates += 1;
                    Some(existing)
                }
                AdmissionResult::Rejected(reason) => {
                    match reason {
                        RejectReason::EmptyBody | RejectReason::BodyTooShort { .. } => {
                            report.low_quality += 1
                        }
                        RejectReason::InvalidUrl(_) => report.invalid += 1,
                        RejectReason::Storage(ref cause) => {
                            report.storage_failures += 1;
                            report
                                .warnings
                                .push(format!("{} rejected: {cause}", candidates[idx].url));
                        }
                    }
                    None
                }
            };
            if let Some(id) = joined {
                if in_pool.insert(id) {
                    report.pool.push(id);
                }
            }
        }

        tracing::info!(
            target: "admission",
            candidates = candidates.len(),
            new = report.admitted_new,
            duplicate = report.duplicates,
            low_quality = report.low_quality,
            invalid = report.invalid,
            storage = report.storage_failures,
            pool = report.pool.len(),
            "admission pass finished"
        );
        report
    }
}

fn observe(candidate: &Candidate, result: &AdmissionResult) {
    counter!("newsrank_admitted_total", "outcome" => result.label()).increment(1);
    match result {
        AdmissionResult::New(a) => {
            tracing::debug!(target: "admission", id = a.id, source = %a.source_id, fp = %&a.fingerprint[..12], "admitted");
        }
        AdmissionResult::Duplicate { existing, kind } => {
            tracing::debug!(target: "admission", existing, ?kind, url = %candidate.url, "duplicate");
        }
        AdmissionResult::Rejected(reason) => {
            tracing::debug!(target: "admission", url = %candidate.url, %reason, "rejected");
        }
    }
}
