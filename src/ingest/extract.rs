// src/ingest/extract.rs
//! HTTP main-content extraction: fetch the page, drop non-content blocks, keep visible text.

use scraper::{ElementRef, Html, Node, Selector};
use std::time::Duration;

use crate::error::ExtractionError;
use crate::ingest::normalize_text;
use crate::ingest::types::ContentExtractor;

const PAYWALL_MARKERS: &[&str] = &[
    "subscribe to continue",
    "subscribe to read",
    "this content is for subscribers",
    "already a subscriber",
    "create a free account to continue",
];

/// Subtrees whose text never counts as page content.
const DROPPED: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "header", "footer", "aside", "form",
];

pub struct HttpExtractor {
    client: reqwest::Client,
}

impl HttpExtractor {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("newsrank/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl ContentExtractor for HttpExtractor {
    async fn extract(&self, url: &str) -> Result<String, ExtractionError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ExtractionError::new(url, e))?;
        if !resp.status().is_success() {
            return Err(ExtractionError::new(
                url,
                format!("http status {}", resp.status().as_u16()),
            ));
        }
        let html = resp.text().await.map_err(|e| ExtractionError::new(url, e))?;
        extract_main_text(&html).map_err(|cause| ExtractionError::new(url, cause))
    }
}

/// Visible text of an HTML page, scoped to the outermost `<article>` or `<main>` when
/// present and to `<body>` otherwise.
pub fn extract_main_text(html: &str) -> Result<String, &'static str> {
    let lowered = html.to_lowercase();
    if PAYWALL_MARKERS.iter().any(|m| lowered.contains(m)) {
        return Err("paywall detected");
    }

    let document = Html::parse_document(html);
    let main = Selector::parse("article, main").map_err(|_| "invalid selector")?;
    let body = Selector::parse("body").map_err(|_| "invalid selector")?;
    // document order puts the outermost match first
    let scope = document
        .select(&main)
        .next()
        .or_else(|| document.select(&body).next())
        .unwrap_or_else(|| document.root_element());

    let mut raw = String::new();
    collect_text(scope, &mut raw);
    let text = normalize_text(&raw);
    if text.is_empty() {
        return Err("no text content");
    }
    Ok(text)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(e) if DROPPED.contains(&e.name()) => {}
            Node::Element(_) => {
                if let Some(nested) = ElementRef::wrap(child) {
                    collect_text(nested, out);
                }
            }
            _ => {}
        }
    }
}
