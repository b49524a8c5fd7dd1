// src/select.rs
//! Selector: turn a fully scored pool into a bounded, ranked list.
//!
//! Order: total score desc → publish time desc (unknown last) → article id asc.
//! Articles below an optional score floor are never selected.
//! With a [`Diversity`] quota the sorted list is walked greedily and an item is skipped
//! when its category is already full; nothing is ever re-ordered.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::model::{RunArticle, RunId, SelectedArticle};
use crate::scoring::ScoredArticle;

/// Per-category caps. Articles whose category has no entry are unconstrained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diversity {
    pub quota: BTreeMap<String, usize>,
    /// source id → category
    pub categories: HashMap<String, String>,
}

impl Diversity {
    fn category_of<'a>(&'a self, source_id: &str) -> Option<&'a str> {
        self.categories.get(source_id).map(String::as_str)
    }
}

/// Deterministic ranking order of two scored articles.
pub fn rank_order(a: &ScoredArticle, b: &ScoredArticle) -> Ordering {
    b.score
        .total
        .total_cmp(&a.score.total)
        .then_with(|| match (a.article.published_at, b.article.published_at) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.article.id.cmp(&b.article.id))
}

/// Pick up to `max_count` articles scoring at least `min_score` and assign ranks 1..=n.
pub fn select(
    run_id: RunId,
    pool: &[ScoredArticle],
    max_count: usize,
    min_score: Option<f64>,
    diversity: Option<&Diversity>,
) -> Vec<SelectedArticle> {
    let mut sorted: Vec<&ScoredArticle> = pool
        .iter()
        .filter(|s| min_score.map_or(true, |min| s.score.total >= min))
        .collect();
    sorted.sort_by(|a, b| rank_order(a, b));

    let mut used: HashMap<&str, usize> = HashMap::new();
    let mut out = Vec::with_capacity(max_count.min(sorted.len()));
    for s in sorted {
        if out.len() >= max_count {
            break;
        }
        if let Some(d) = diversity {
            if let Some(cat) = d.category_of(&s.article.source_id) {
                if let Some(&cap) = d.quota.get(cat) {
                    let n = used.entry(cat).or_insert(0);
                    if *n >= cap {
                        continue;
                    }
                    *n += 1;
                }
            }
        }
        out.push(SelectedArticle {
            article: s.article.clone(),
            run_article: RunArticle {
                run_id,
                article_id: s.article.id,
                score: s.score.clone(),
                rank: Some(out.len() as u32 + 1),
            },
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Article, ScoreBreakdown};
    use chrono::{Duration, TimeZone, Utc};

    fn scored(id: u64, total: f64, hours_ago: Option<i64>, source: &str) -> ScoredArticle {
        let now = Utc.with_ymd_and_hms(2025, 10, 14, 12, 0, 0).unwrap();
        ScoredArticle {
            article: Article {
                id,
                canonical_url: format!("https://a.example/{id}"),
                title: format!("story {id}"),
                excerpt: String::new(),
                fingerprint: format!("fp{id}"),
                outlet: None,
                published_at: hours_ago.map(|h| now - Duration::hours(h)),
                source_id: source.into(),
                first_seen_at: now,
                last_seen_at: now,
            },
            score: ScoreBreakdown {
                total,
                factors: Vec::new(),
                explanation: String::new(),
            },
            errors: Vec::new(),
        }
    }

    #[test]
    fn unknown_publish_time_sorts_after_known() {
        let pool = vec![scored(1, 0.5, None, "s"), scored(2, 0.5, Some(100), "s")];
        let ids: Vec<_> = select(1, &pool, 2, None, None).iter().map(|s| s.article.id).collect();
        assert_eq!(ids, [2, 1]);
    }

    #[test]
    fn id_breaks_remaining_ties() {
        let pool = vec![scored(9, 0.5, Some(1), "s"), scored(3, 0.5, Some(1), "s")];
        let ids: Vec<_> = select(1, &pool, 5, None, None).iter().map(|s| s.article.id).collect();
        assert_eq!(ids, [3, 9]);
    }

    #[test]
    fn quota_skips_without_reordering() {
        let pool = vec![
            scored(1, 0.9, Some(1), "wire"),
            scored(2, 0.8, Some(1), "wire"),
            scored(3, 0.7, Some(1), "blog"),
            scored(4, 0.6, Some(1), "other"),
        ];
        let d = Diversity {
            quota: BTreeMap::from([("news".to_string(), 1)]),
            categories: HashMap::from([
                ("wire".to_string(), "news".to_string()),
                ("blog".to_string(), "opinion".to_string()),
            ]),
        };
        let picked = select(7, &pool, 3, None, Some(&d));
        let ids: Vec<_> = picked.iter().map(|s| s.article.id).collect();
        assert_eq!(ids, [1, 3, 4]);
        let ranks: Vec<_> = picked.iter().map(|s| s.run_article.rank).collect();
        assert_eq!(ranks, [Some(1), Some(2), Some(3)]);
        assert!(picked.iter().all(|s| s.run_article.run_id == 7));
    }

    #[test]
    fn zero_max_count_selects_nothing() {
        let pool = vec![scored(1, 0.9, None, "s")];
        assert!(select(1, &pool, 0, None, None).is_empty());
    }
}
