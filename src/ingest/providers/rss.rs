// src/ingest/providers/rss.rs
//! RSS 2.0 feed provider. Reads each source's `url` over HTTP, or from an in-memory
//! fixture keyed by source id.

use chrono::{DateTime, Utc};
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::error::FetchError;
use crate::ingest::normalize_text;
use crate::ingest::types::FeedSource;
use crate::model::{Candidate, Source};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_pub_date(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    OffsetDateTime::parse(ts, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(ts, &Rfc3339))
        .ok()
        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), 0))
}

/// Descriptions at least this long are used as the body and skip extraction.
pub const DEFAULT_MIN_INLINE_CHARS: usize = 200;

pub struct RssFeed {
    mode: Mode,
    min_inline_chars: usize,
}

enum Mode {
    Fixture(HashMap<String, String>),
    Http(reqwest::Client),
}

impl RssFeed {
    /// Serve feeds from memory: `(source id, rss xml)` pairs.
    pub fn from_fixtures<I, K, V>(fixtures: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            mode: Mode::Fixture(
                fixtures
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            min_inline_chars: DEFAULT_MIN_INLINE_CHARS,
        }
    }

    pub fn http(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("newsrank/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            mode: Mode::Http(client),
            min_inline_chars: DEFAULT_MIN_INLINE_CHARS,
        })
    }

    pub fn with_min_inline_chars(mut self, chars: usize) -> Self {
        self.min_inline_chars = chars;
        self
    }

    /// Parse one RSS document into candidates for `source_id`.
    pub fn parse_items(&self, source_id: &str, xml: &str) -> Result<Vec<Candidate>, FetchError> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&xml_clean)
            .map_err(|e| FetchError::new(source_id, format!("parsing rss xml: {e}")))?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let Some(url) = it.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()) else {
                continue;
            };
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            let text = it
                .description
                .as_deref()
                .map(normalize_text)
                .filter(|d| d.chars().count() >= self.min_inline_chars);

            out.push(Candidate {
                title,
                url,
                published_at: it.pub_date.as_deref().and_then(parse_pub_date),
                text,
                source_id: source_id.to_string(),
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("newsrank_feed_parse_ms").record(ms);
        Ok(out)
    }
}

#[async_trait::async_trait]
impl FeedSource for RssFeed {
    async fn fetch(&self, source: &Source) -> Result<Vec<Candidate>, FetchError> {
        match &self.mode {
            Mode::Fixture(map) => {
                let xml = map
                    .get(&source.id)
                    .ok_or_else(|| FetchError::new(&source.id, "no fixture for source"))?;
                self.parse_items(&source.id, xml)
            }
            Mode::Http(client) => {
                let resp = client
                    .get(&source.url)
                    .send()
                    .await
                    .map_err(|e| FetchError::new(&source.id, format!("http get: {e}")))?;
                if !resp.status().is_success() {
                    return Err(FetchError::new(
                        &source.id,
                        format!("http status {}", resp.status().as_u16()),
                    ));
                }
                let body = resp
                    .text()
                    .await
                    .map_err(|e| FetchError::new(&source.id, format!("http body: {e}")))?;
                self.parse_items(&source.id, &body)
            }
        }
    }

    fn name(&self) -> &'static str {
        "rss"
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pub_date_formats() {
        let a = parse_pub_date("Tue, 14 Oct 2025 09:30:00 +0000").unwrap();
        assert_eq!(a.to_rfc3339(), "2025-10-14T09:30:00+00:00");
        let b = parse_pub_date("2025-10-14T11:30:00+02:00").unwrap();
        assert_eq!(a, b);
        assert!(parse_pub_date("yesterday").is_none());
    }

    #[test]
    fn items_without_link_or_title_are_skipped() {
        let xml = r#"<rss><channel>
            <item><title>Kept</title><link>https://x.example/1</link></item>
            <item><title>No link</title></item>
            <item><link>https://x.example/3</link></item>
        </channel></rss>"#;
        let feed = RssFeed::from_fixtures(Vec::<(String, String)>::new());
        let items = feed.parse_items("x", xml).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Kept");
        assert!(items[0].published_at.is_none());
        assert!(items[0].text.is_none());
    }

    #[test]
    fn empty_channel_parses() {
        let feed = RssFeed::from_fixtures(Vec::<(String, String)>::new());
        let items = feed.parse_items("x", "<rss><channel></channel></rss>").unwrap();
        assert!(items.is_empty());
    }
}
