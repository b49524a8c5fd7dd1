//! In-memory repository with optional JSON file persistence.
//!
//! Every mutation happens under one lock, which makes `insert_article` atomic. When a
//! file path is set, a mutation is applied to a copy of the state, the copy is written
//! (tmp file + rename) and only then replaces the live state, so a failed write changes
//! nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use super::{ConflictKey, InsertOutcome, Repository};
use crate::error::StorageError;
use crate::model::{Article, ArticleId, Cluster, NewArticle, NewRun, Run, RunArticle, RunId, Source};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct State {
    next_article_id: ArticleId,
    next_run_id: RunId,
    articles: BTreeMap<ArticleId, Article>,
    sources: BTreeMap<String, Source>,
    runs: BTreeMap<RunId, Run>,
    run_articles: BTreeMap<RunId, Vec<RunArticle>>,
    clusters: BTreeMap<ArticleId, Cluster>,
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    inner: Mutex<State>,
    path: Option<PathBuf>,
    insert_faults: AtomicU32,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or create) a repository persisted at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let state = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => State::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            inner: Mutex::new(state),
            path: Some(path),
            insert_faults: AtomicU32::new(0),
        })
    }

    /// Make the next `n` article inserts fail with `Unavailable`.
    pub fn fail_next_inserts(&self, n: u32) {
        self.insert_faults.store(n, Ordering::SeqCst);
    }

    fn take_fault(&self) -> bool {
        self.insert_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn flush(&self, state: &State) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn with_state<T>(
        &self,
        mutate: bool,
        f: impl FnOnce(&mut State) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| StorageError::Unavailable("repository lock poisoned".into()))?;
        if !mutate || self.path.is_none() {
            return f(&mut state);
        }
        let mut next = state.clone();
        let out = f(&mut next)?;
        self.flush(&next)?;
        *state = next;
        Ok(out)
    }
}

fn ensure_open(state: &State, run_id: RunId) -> Result<(), StorageError> {
    match state.runs.get(&run_id) {
        None => Err(StorageError::NotFound(format!("run {run_id}"))),
        Some(r) if r.status.is_terminal() => Err(StorageError::Conflict(format!(
            "run {run_id} is {} and immutable",
            r.status
        ))),
        Some(_) => Ok(()),
    }
}

#[async_trait::async_trait]
impl Repository for MemoryRepository {
    async fn insert_article(
        &self,
        article: NewArticle,
        fingerprint_since: DateTime<Utc>,
    ) -> Result<InsertOutcome, StorageError> {
        if self.take_fault() {
            return Err(StorageError::Unavailable("injected insert fault".into()));
        }
        self.with_state(true, |s| {
            if let Some(existing) = s
                .articles
                .values()
                .find(|a| a.canonical_url == article.canonical_url)
            {
                return Ok(InsertOutcome::Conflict {
                    existing: existing.id,
                    key: ConflictKey::Url,
                });
            }
            if let Some(existing) = s.articles.values().find(|a| {
                a.fingerprint == article.fingerprint && a.first_seen_at >= fingerprint_since
            }) {
                return Ok(InsertOutcome::Conflict {
                    existing: existing.id,
                    key: ConflictKey::Fingerprint,
                });
            }
            s.next_article_id += 1;
            let stored = article.into_article(s.next_article_id);
            s.articles.insert(stored.id, stored.clone());
            Ok(InsertOutcome::Inserted(stored))
        })
    }

    async fn get_article(&self, id: ArticleId) -> Result<Option<Article>, StorageError> {
        self.with_state(false, |s| Ok(s.articles.get(&id).cloned()))
    }

    async fn get_articles(&self, ids: &[ArticleId]) -> Result<Vec<Article>, StorageError> {
        self.with_state(false, |s| {
            Ok(ids.iter().filter_map(|id| s.articles.get(id).cloned()).collect())
        })
    }

    async fn find_by_url(&self, canonical_url: &str) -> Result<Option<Article>, StorageError> {
        self.with_state(false, |s| {
            Ok(s.articles
                .values()
                .find(|a| a.canonical_url == canonical_url)
                .cloned())
        })
    }

    async fn articles_since(&self, since: DateTime<Utc>) -> Result<Vec<Article>, StorageError> {
        self.with_state(false, |s| {
            Ok(s.articles
                .values()
                .filter(|a| a.first_seen_at >= since)
                .cloned()
                .collect())
        })
    }

    async fn touch_article(
        &self,
        id: ArticleId,
        seen_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.with_state(true, |s| {
            let a = s
                .articles
                .get_mut(&id)
                .ok_or_else(|| StorageError::NotFound(format!("article {id}")))?;
            if seen_at > a.last_seen_at {
                a.last_seen_at = seen_at;
            }
            Ok(())
        })
    }

    async fn add_cluster_member(
        &self,
        canonical_id: ArticleId,
        member_url: &str,
    ) -> Result<(), StorageError> {
        self.with_state(true, |s| {
            if !s.articles.contains_key(&canonical_id) {
                return Err(StorageError::NotFound(format!("article {canonical_id}")));
            }
            let cluster = s.clusters.entry(canonical_id).or_insert_with(|| Cluster {
                canonical_id,
                member_urls: Vec::new(),
            });
            if !cluster.member_urls.iter().any(|u| u == member_url) {
                cluster.member_urls.push(member_url.to_string());
            }
            Ok(())
        })
    }

    async fn cluster_members(&self, canonical_id: ArticleId) -> Result<Vec<String>, StorageError> {
        self.with_state(false, |s| {
            Ok(s.clusters
                .get(&canonical_id)
                .map(|c| c.member_urls.clone())
                .unwrap_or_default())
        })
    }

    async fn upsert_source(&self, source: &Source) -> Result<(), StorageError> {
        self.with_state(true, |s| {
            s.sources.insert(source.id.clone(), source.clone());
            Ok(())
        })
    }

    async fn sources(&self) -> Result<Vec<Source>, StorageError> {
        self.with_state(false, |s| Ok(s.sources.values().cloned().collect()))
    }

    async fn create_run(&self, run: NewRun) -> Result<Run, StorageError> {
        self.with_state(true, |s| {
            s.next_run_id += 1;
            let stored = run.into_run(s.next_run_id);
            s.runs.insert(stored.id, stored.clone());
            Ok(stored)
        })
    }

    async fn get_run(&self, id: RunId) -> Result<Option<Run>, StorageError> {
        self.with_state(false, |s| Ok(s.runs.get(&id).cloned()))
    }

    async fn save_run(&self, run: &Run) -> Result<(), StorageError> {
        self.with_state(true, |s| {
            ensure_open(s, run.id)?;
            s.runs.insert(run.id, run.clone());
            Ok(())
        })
    }

    async fn runs_before(&self, before: RunId, limit: usize) -> Result<Vec<Run>, StorageError> {
        self.with_state(false, |s| {
            Ok(s.runs
                .range(..before)
                .rev()
                .take(limit)
                .map(|(_, r)| r.clone())
                .collect())
        })
    }

    async fn delete_run(&self, id: RunId) -> Result<(), StorageError> {
        self.with_state(true, |s| {
            s.runs
                .remove(&id)
                .ok_or_else(|| StorageError::NotFound(format!("run {id}")))?;
            s.run_articles.remove(&id);
            Ok(())
        })
    }

    async fn replace_run_articles(
        &self,
        run_id: RunId,
        rows: Vec<RunArticle>,
    ) -> Result<(), StorageError> {
        self.with_state(true, |s| {
            ensure_open(s, run_id)?;
            if let Some(bad) = rows.iter().find(|r| r.run_id != run_id) {
                return Err(StorageError::Conflict(format!(
                    "row for run {} passed to run {run_id}",
                    bad.run_id
                )));
            }
            s.run_articles.insert(run_id, rows);
            Ok(())
        })
    }

    async fn run_articles(&self, run_id: RunId) -> Result<Vec<RunArticle>, StorageError> {
        self.with_state(false, |s| {
            Ok(s.run_articles.get(&run_id).cloned().unwrap_or_default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn new_article(url: &str, fp: &str, seen_at: DateTime<Utc>) -> NewArticle {
        NewArticle {
            canonical_url: url.into(),
            title: "t".into(),
            excerpt: "e".into(),
            fingerprint: fp.into(),
            outlet: None,
            published_at: None,
            source_id: "s".into(),
            seen_at,
        }
    }

    fn new_run() -> NewRun {
        NewRun {
            run_date: NaiveDate::from_ymd_opt(2025, 10, 14).unwrap(),
            target_minutes: 10,
            max_candidates: 10,
            max_selected: 3,
            started_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn url_and_fingerprint_are_unique() {
        let repo = MemoryRepository::new();
        let now = Utc::now();
        let since = now - Duration::days(30);

        let first = repo
            .insert_article(new_article("https://a/x", "fp1", now), since)
            .await
            .unwrap();
        let InsertOutcome::Inserted(a) = first else {
            panic!("expected insert");
        };

        let same_url = repo
            .insert_article(new_article("https://a/x", "fp2", now), since)
            .await
            .unwrap();
        assert_eq!(
            same_url,
            InsertOutcome::Conflict {
                existing: a.id,
                key: ConflictKey::Url
            }
        );

        let same_fp = repo
            .insert_article(new_article("https://b/y", "fp1", now), since)
            .await
            .unwrap();
        assert_eq!(
            same_fp,
            InsertOutcome::Conflict {
                existing: a.id,
                key: ConflictKey::Fingerprint
            }
        );
    }

    #[tokio::test]
    async fn fingerprint_outside_window_is_allowed() {
        let repo = MemoryRepository::new();
        let old = Utc::now() - Duration::days(90);
        repo.insert_article(new_article("https://a/old", "fp", old), old)
            .await
            .unwrap();
        let since = Utc::now() - Duration::days(30);
        let out = repo
            .insert_article(new_article("https://a/new", "fp", Utc::now()), since)
            .await
            .unwrap();
        assert!(matches!(out, InsertOutcome::Inserted(_)));
    }

    #[tokio::test]
    async fn terminal_runs_are_frozen_and_delete_cascades() {
        let repo = MemoryRepository::new();
        let mut run = repo.create_run(new_run()).await.unwrap();
        repo.replace_run_articles(run.id, Vec::new()).await.unwrap();
        run.status = crate::model::RunStatus::Failed;
        repo.save_run(&run).await.unwrap();

        run.status = crate::model::RunStatus::Completed;
        assert!(matches!(
            repo.save_run(&run).await,
            Err(StorageError::Conflict(_))
        ));
        assert!(repo.replace_run_articles(run.id, Vec::new()).await.is_err());

        repo.delete_run(run.id).await.unwrap();
        assert!(repo.get_run(run.id).await.unwrap().is_none());
        assert!(repo.run_articles(run.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_faults_are_consumed() {
        let repo = MemoryRepository::new();
        repo.fail_next_inserts(1);
        let now = Utc::now();
        let err = repo
            .insert_article(new_article("https://a/x", "fp", now), now)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(repo
            .insert_article(new_article("https://a/x", "fp", now), now)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn failed_write_leaves_no_article_behind() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let repo = MemoryRepository::open(data.join("state.json")).unwrap();
        let now = Utc::now();
        repo.insert_article(new_article("https://a/1", "fp1", now), now)
            .await
            .unwrap();

        // a regular file where the state directory should be
        fs::remove_dir_all(&data).unwrap();
        fs::write(&data, b"not a directory").unwrap();
        let err = repo
            .insert_article(new_article("https://a/2", "fp2", now), now)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Io(_)), "{err:?}");
        assert!(repo.find_by_url("https://a/2").await.unwrap().is_none());

        fs::remove_file(&data).unwrap();
        let retried = repo
            .insert_article(new_article("https://a/2", "fp2", now), now)
            .await
            .unwrap();
        let InsertOutcome::Inserted(article) = retried else {
            panic!("expected insert after the store recovered, got {retried:?}");
        };
        assert_eq!(article.id, 2);
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let run_id = {
            let repo = MemoryRepository::open(&path).unwrap();
            let now = Utc::now();
            repo.insert_article(new_article("https://a/x", "fp", now), now)
                .await
                .unwrap();
            repo.create_run(new_run()).await.unwrap().id
        };
        let repo = MemoryRepository::open(&path).unwrap();
        assert!(repo.find_by_url("https://a/x").await.unwrap().is_some());
        assert!(repo.get_run(run_id).await.unwrap().is_some());
        assert_eq!(repo.runs_before(run_id + 1, 5).await.unwrap().len(), 1);
    }
}
