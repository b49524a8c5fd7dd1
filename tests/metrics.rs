// tests/metrics.rs
mod common;

use std::sync::Arc;

use newsrank::{MemoryRepository, MockGenerator, RunStatus};

use common::{config, date, orchestrator, source, StaticFeed};

#[tokio::test]
async fn exposition_contains_pipeline_series_after_a_run() {
    // one global recorder per test binary
    let handle = newsrank::metrics::install_prometheus().expect("recorder installs once");

    let dir = tempfile::tempdir().unwrap();
    let sources = vec![source("wire", "news"), source("markets", "finance")];
    let feed = Arc::new(StaticFeed::new(&sources, 3).with_down(&["markets"]));
    let orch = orchestrator(
        config(sources, dir.path()),
        Arc::new(MemoryRepository::new()),
        feed,
        Arc::new(MockGenerator),
    );
    let res = newsrank::run(&orch, date(), 5, 100, 2).await.unwrap();
    assert_eq!(res.status, RunStatus::Completed);

    let text = handle.render();
    for needle in [
        "newsrank_candidates_total",
        "newsrank_source_errors_total",
        "newsrank_admitted_total",
        "newsrank_scored_total",
        "newsrank_selected_total",
        "newsrank_runs_total",
        "newsrank_stage_ms",
        "newsrank_last_run_ts",
    ] {
        assert!(
            text.contains(needle),
            "metrics exposition missing '{needle}'\n{text}"
        );
    }
    assert!(text.contains(r#"status="COMPLETED""#), "{text}");
    assert!(text.contains(r#"outcome="new""#), "{text}");
}
