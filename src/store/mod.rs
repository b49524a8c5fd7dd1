//! Persistence seam. The engine talks to storage only through [`Repository`].
//!
//! Article uniqueness is enforced by the store itself: [`Repository::insert_article`]
//! is an atomic insert-or-detect-conflict on canonical URL and on fingerprint, so two
//! workers racing on the same story cannot both create it.

pub mod memory;

pub use memory::MemoryRepository;

use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::model::{Article, ArticleId, NewArticle, NewRun, Run, RunArticle, RunId, Source};

/// Which uniqueness constraint an insert collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKey {
    Url,
    Fingerprint,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(Article),
    Conflict { existing: ArticleId, key: ConflictKey },
}

#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    /// Insert unless the canonical URL exists, or the fingerprint exists on an article
    /// first seen at or after `fingerprint_since`. URL conflicts are checked first.
    async fn insert_article(
        &self,
        article: NewArticle,
        fingerprint_since: DateTime<Utc>,
    ) -> Result<InsertOutcome, StorageError>;
    async fn get_article(&self, id: ArticleId) -> Result<Option<Article>, StorageError>;
    /// Articles in the order of `ids`; unknown ids are skipped.
    async fn get_articles(&self, ids: &[ArticleId]) -> Result<Vec<Article>, StorageError>;
    async fn find_by_url(&self, canonical_url: &str) -> Result<Option<Article>, StorageError>;
    /// Articles first seen at or after `since`, in id order.
    async fn articles_since(&self, since: DateTime<Utc>) -> Result<Vec<Article>, StorageError>;
    /// Record that an existing article was seen again.
    async fn touch_article(&self, id: ArticleId, seen_at: DateTime<Utc>)
        -> Result<(), StorageError>;
    async fn add_cluster_member(
        &self,
        canonical_id: ArticleId,
        member_url: &str,
    ) -> Result<(), StorageError>;
    async fn cluster_members(&self, canonical_id: ArticleId) -> Result<Vec<String>, StorageError>;

    async fn upsert_source(&self, source: &Source) -> Result<(), StorageError>;
    async fn sources(&self) -> Result<Vec<Source>, StorageError>;

    async fn create_run(&self, run: NewRun) -> Result<Run, StorageError>;
    async fn get_run(&self, id: RunId) -> Result<Option<Run>, StorageError>;
    /// Overwrite a run checkpoint. Fails with `Conflict` if the stored run is terminal.
    async fn save_run(&self, run: &Run) -> Result<(), StorageError>;
    /// Up to `limit` runs with id lower than `before`, newest first.
    async fn runs_before(&self, before: RunId, limit: usize) -> Result<Vec<Run>, StorageError>;
    /// Deletes the run and every RunArticle it owns.
    async fn delete_run(&self, id: RunId) -> Result<(), StorageError>;

    /// Replace the RunArticle set of a non-terminal run.
    async fn replace_run_articles(
        &self,
        run_id: RunId,
        rows: Vec<RunArticle>,
    ) -> Result<(), StorageError>;
    async fn run_articles(&self, run_id: RunId) -> Result<Vec<RunArticle>, StorageError>;
}
