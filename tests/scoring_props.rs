// tests/scoring_props.rs
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

use newsrank::config::{PipelineConfig, Weights};
use newsrank::model::{Article, Factor};
use newsrank::scoring::{HistoryWindow, RunContext, ScoringEngine, SourceWeights};
use newsrank::Source;

fn reference() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 14, 6, 0, 0).unwrap()
}

fn article(id: u64, published: Option<DateTime<Utc>>) -> Article {
    Article {
        id,
        canonical_url: format!("https://a.example/{id}"),
        title: "Chip makers expand fabs in Arizona".into(),
        excerpt: "Semiconductor production capacity grows as new fabs open.".into(),
        fingerprint: format!("fp-{id}"),
        outlet: Some("a.example".into()),
        published_at: published,
        source_id: "wire".into(),
        first_seen_at: reference(),
        last_seen_at: reference(),
    }
}

fn ctx(history: HistoryWindow) -> RunContext {
    RunContext {
        reference_time: reference(),
        history,
        source_weights: SourceWeights::from_sources(&[Source {
            id: "wire".into(),
            name: "Wire".into(),
            url: "https://wire.example/rss".into(),
            category: "news".into(),
            weight: 0.9,
            enabled: true,
        }]),
    }
}

fn factor(engine: &ScoringEngine, a: &Article, c: &RunContext, f: Factor) -> f64 {
    let (b, _) = engine.score(a, c);
    b.factors.iter().find(|x| x.factor == f).unwrap().value
}

#[test]
fn more_recent_article_scores_strictly_higher_on_recency() {
    let engine = ScoringEngine::from_config(&PipelineConfig::default()).unwrap();
    let c = ctx(HistoryWindow::new());
    for (newer, older) in [(0, 1), (1, 2), (5, 30), (47, 48), (100, 200)] {
        let a = article(1, Some(reference() - Duration::hours(newer)));
        let b = article(2, Some(reference() - Duration::hours(older)));
        let ra = factor(&engine, &a, &c, Factor::Recency);
        let rb = factor(&engine, &b, &c, Factor::Recency);
        assert!(ra > rb, "{newer}h ({ra}) vs {older}h ({rb})");
        assert!(engine.score(&a, &c).0.total > engine.score(&b, &c).0.total);
    }
}

#[test]
fn unknown_publish_time_is_low_but_nonzero() {
    let engine = ScoringEngine::from_config(&PipelineConfig::default()).unwrap();
    let c = ctx(HistoryWindow::new());
    let unknown = factor(&engine, &article(1, None), &c, Factor::Recency);
    let brand_new = factor(&engine, &article(2, Some(reference())), &c, Factor::Recency);
    assert!(unknown > 0.0);
    assert!(unknown < brand_new);
    assert_eq!(unknown, 0.25);
}

#[test]
fn unknown_publish_value_is_kept_inside_unit_interval() {
    let mut cfg = PipelineConfig::default();
    cfg.recency.unknown_publish_value = 7.0;
    let engine = ScoringEngine::from_config(&cfg).unwrap();
    let c = ctx(HistoryWindow::new());
    let unknown = factor(&engine, &article(1, None), &c, Factor::Recency);
    assert!(unknown > 0.0 && unknown < 1.0);
}

#[test]
fn total_is_clamped_for_any_weights() {
    let mut cfg = PipelineConfig::default();
    cfg.weights = Weights {
        recency: 5.0,
        source: 5.0,
        topic: 5.0,
        novelty: 5.0,
    };
    let engine = ScoringEngine::from_config(&cfg).unwrap();
    let (b, _) = engine.score(&article(1, Some(reference())), &ctx(HistoryWindow::new()));
    assert_eq!(b.total, 1.0);

    cfg.weights = Weights {
        recency: 0.0,
        source: 0.0,
        topic: 0.01,
        novelty: 0.0,
    };
    cfg.topic.suppress_keywords = vec!["fabs".into()];
    let engine = ScoringEngine::from_config(&cfg).unwrap();
    let (b, _) = engine.score(&article(1, Some(reference())), &ctx(HistoryWindow::new()));
    assert!((0.0..=1.0).contains(&b.total));
}

#[test]
fn explanation_leads_with_dominant_factor() {
    let mut cfg = PipelineConfig::default();
    cfg.weights = Weights {
        recency: 0.1,
        source: 0.1,
        topic: 0.7,
        novelty: 0.1,
    };
    cfg.topic.boost_keywords = vec!["semiconductor".into(), "fabs".into()];
    let engine = ScoringEngine::from_config(&cfg).unwrap();
    let (b, _) = engine.score(&article(1, Some(reference())), &ctx(HistoryWindow::new()));
    assert!(b.explanation.starts_with("topic match: semiconductor, fabs"), "{}", b.explanation);
    assert_eq!(b.explanation.split("; ").count(), 4, "{}", b.explanation);
}

#[test]
fn equal_contributions_keep_declaration_order() {
    let mut cfg = PipelineConfig::default();
    cfg.weights = Weights {
        recency: 0.25,
        source: 0.25,
        topic: 0.25,
        novelty: 0.25,
    };
    // recency 1.0 (brand new), source 1.0, topic 1.0, novelty 1.0
    cfg.topic.baseline = 1.0;
    let mut c = ctx(HistoryWindow::new());
    c.source_weights = SourceWeights::from_sources(&[Source {
        id: "wire".into(),
        name: "Wire".into(),
        url: "https://wire.example/rss".into(),
        category: String::new(),
        weight: 1.0,
        enabled: true,
    }]);
    let engine = ScoringEngine::from_config(&cfg).unwrap();
    let a = article(1, Some(reference()));
    let first = engine.score(&a, &c).0;
    let reasons: Vec<_> = first.factors.iter().map(|f| f.reason.clone()).collect();
    assert_eq!(first.explanation, reasons.join("; "));
    for _ in 0..5 {
        assert_eq!(engine.score(&a, &c).0, first);
    }
}

#[test]
fn novelty_drops_with_prior_appearances() {
    let engine = ScoringEngine::from_config(&PipelineConfig::default()).unwrap();
    let a = article(1, Some(reference()));
    let mut values = Vec::new();
    let mut history = HistoryWindow::new();
    for run in 0..4u64 {
        values.push(factor(&engine, &a, &ctx(history.clone()), Factor::Novelty));
        history.push_run(run + 1, [a.fingerprint.clone()]);
    }
    assert_eq!(values[0], 1.0);
    assert!(values.windows(2).all(|w| w[0] > w[1] || w[1] == 0.0));
    assert_eq!(values[3], 0.0);
}

#[tokio::test]
async fn parallel_pool_matches_sequential_scoring() {
    let engine = Arc::new(ScoringEngine::from_config(&PipelineConfig::default()).unwrap());
    let c = ctx(HistoryWindow::new());
    let articles: Vec<_> = (1..=25)
        .map(|i| article(i, Some(reference() - Duration::hours(i as i64))))
        .collect();
    let sequential: Vec<_> = articles.iter().map(|a| engine.score(a, &c).0).collect();
    let pooled = engine
        .score_pool(articles, Arc::new(c), 4)
        .await
        .unwrap();
    let pooled: Vec<_> = pooled.into_iter().map(|s| s.score).collect();
    assert_eq!(pooled, sequential);
}
