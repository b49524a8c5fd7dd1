// src/ingest/normalize.rs
//! Text, URL and fingerprint normalization shared by ingestion and admission.

use once_cell::sync::OnceCell;
use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

/// Upper bound on stored body text.
pub const MAX_TEXT_CHARS: usize = 20_000;

/// Query parameters dropped from canonical URLs.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "mc_cid", "mc_eid", "igshid", "ref", "ref_src",
    "_hsenc", "_hsmi", "cmpid", "ncid", "ocid", "smid", "_ga",
];

fn re_ws() -> &'static Regex {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Normalize feed/page text: decode entities, strip tags, ASCII quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    out = re_ws().replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }

    out
}

/// Whitespace-collapsed, case-folded form used for fingerprints.
pub fn fold_text(s: &str) -> String {
    re_ws().replace_all(s.trim(), " ").to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlError(pub String);

impl std::fmt::Display for UrlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid url: {}", self.0)
    }
}

impl std::error::Error for UrlError {}

/// Canonical form of an article URL.
///
/// Drops tracking query parameters (`utm_*` and known click ids) and the fragment,
/// lowercases scheme and host, and removes trailing slashes from the path.
pub fn canonical_url(raw: &str) -> Result<String, UrlError> {
    let parsed = Url::parse(raw.trim()).map_err(|e| UrlError(format!("{raw}: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| UrlError(format!("{raw}: missing host")))?
        .to_ascii_lowercase();

    let mut out = format!("{}://{}", parsed.scheme(), host);
    if let Some(port) = parsed.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(parsed.path().trim_end_matches('/'));

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !kept.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(kept)
            .finish();
        out.push('?');
        out.push_str(&query);
    }
    Ok(out)
}

fn is_tracking_param(key: &str) -> bool {
    let k = key.to_ascii_lowercase();
    k.starts_with("utm_") || TRACKING_PARAMS.contains(&k.as_str())
}

/// Publishing outlet: host without a leading `www.`.
pub fn outlet_of(canonical: &str) -> Option<String> {
    Url::parse(canonical)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
}

/// Hex SHA-256 over folded title + folded leading body (first `body_chars` chars).
pub fn fingerprint(title: &str, body: &str, body_chars: usize) -> String {
    let title = fold_text(title);
    let lead: String = fold_text(body).chars().take(body_chars).collect();
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(lead.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Lowercase alphanumeric tokens.
pub fn tokens(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}
