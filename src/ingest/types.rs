// src/ingest/types.rs
use crate::error::{ExtractionError, FetchError};
use crate::model::{Candidate, Source};

/// Produces the candidates currently published by one source.
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<Vec<Candidate>, FetchError>;
    fn name(&self) -> &'static str;
}

/// Returns the main body text of a page.
#[async_trait::async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<String, ExtractionError>;
}

/// Extractor for feeds that already carry full text; never fetches anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExtraction;

#[async_trait::async_trait]
impl ContentExtractor for NoExtraction {
    async fn extract(&self, url: &str) -> Result<String, ExtractionError> {
        Err(ExtractionError::new(url, "extraction disabled"))
    }
}
