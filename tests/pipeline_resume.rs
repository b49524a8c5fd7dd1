// tests/pipeline_resume.rs
mod common;

use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use newsrank::admission::{AdmissionLedger, AdmissionResult};
use newsrank::model::{NewRun, ScoreBreakdown, Stage};
use newsrank::{
    MemoryRepository, MockGenerator, PipelineError, Repository, RunArticle, RunStatus,
};

use common::{candidate, config, date, orchestrator, source, DownGenerator, StaticFeed};

fn new_run() -> NewRun {
    NewRun {
        run_date: date(),
        target_minutes: 5,
        max_candidates: 100,
        max_selected: 3,
        started_at: Utc::now(),
    }
}

#[tokio::test]
async fn resume_from_scoring_skips_ingest_and_admission() {
    let dir = tempfile::tempdir().unwrap();
    let sources = vec![source("wire", "news")];
    let cfg = config(sources.clone(), dir.path());
    let repo = Arc::new(MemoryRepository::new());

    // a crashed run that got as far as persisting its admitted pool
    let dyn_repo: Arc<dyn Repository> = repo.clone();
    let ledger = AdmissionLedger::new(dyn_repo, cfg.admission);
    let mut admitted = Vec::new();
    for n in 0..4 {
        match ledger.admit(&candidate("wire", n, n as i64 + 1), Utc::now()).await {
            AdmissionResult::New(a) => admitted.push(a.id),
            other => panic!("expected new, got {other:?}"),
        }
    }
    let mut run = repo.create_run(new_run()).await.unwrap();
    run.status = RunStatus::Scoring;
    run.admitted = admitted.clone();
    repo.save_run(&run).await.unwrap();

    let feed = Arc::new(StaticFeed::new(&sources, 4));
    let orch = orchestrator(cfg, repo.clone(), feed.clone(), Arc::new(MockGenerator));
    let res = orch.resume(run.id).await.unwrap();

    assert_eq!(res.run_id, run.id);
    assert_eq!(res.status, RunStatus::Completed);
    assert_eq!(feed.calls.load(Ordering::SeqCst), 0);
    assert_eq!(res.selected.len(), 3);
    assert!(res
        .selected
        .iter()
        .all(|s| admitted.contains(&s.article.id)));
    assert_eq!(repo.run_articles(run.id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn resume_from_admitting_uses_checkpointed_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let sources = vec![source("wire", "news")];
    let repo = Arc::new(MemoryRepository::new());

    let mut run = repo.create_run(new_run()).await.unwrap();
    run.status = RunStatus::Admitting;
    run.pending_candidates = (0..3).map(|n| candidate("wire", n, 2)).collect();
    repo.save_run(&run).await.unwrap();

    let feed = Arc::new(StaticFeed::new(&sources, 4));
    let orch = orchestrator(
        config(sources, dir.path()),
        repo.clone(),
        feed.clone(),
        Arc::new(MockGenerator),
    );
    let res = orch.resume(run.id).await.unwrap();
    assert_eq!(res.status, RunStatus::Completed);
    assert_eq!(feed.calls.load(Ordering::SeqCst), 0);
    assert_eq!(res.counters.admitted_new, 3);

    let stored = repo.get_run(run.id).await.unwrap().unwrap();
    assert!(stored.pending_candidates.is_empty());
    assert_eq!(stored.admitted.len(), 3);
}

#[tokio::test]
async fn timeout_before_narration_keeps_the_ranking() {
    let dir = tempfile::tempdir().unwrap();
    let sources = vec![source("wire", "news")];
    let mut cfg = config(sources.clone(), dir.path());
    let repo = Arc::new(MemoryRepository::new());

    let dyn_repo: Arc<dyn Repository> = repo.clone();
    let ledger = AdmissionLedger::new(dyn_repo, cfg.admission);
    let mut admitted = Vec::new();
    for n in 0..3 {
        match ledger.admit(&candidate("wire", n, 1), Utc::now()).await {
            AdmissionResult::New(a) => admitted.push(a.id),
            other => panic!("expected new, got {other:?}"),
        }
    }

    // a run that crashed after ranking, before narration
    let mut run = repo.create_run(new_run()).await.unwrap();
    run.status = RunStatus::Generating;
    run.admitted = admitted.clone();
    let rows = admitted
        .iter()
        .enumerate()
        .map(|(i, &article_id)| RunArticle {
            run_id: run.id,
            article_id,
            score: ScoreBreakdown {
                total: 0.9 - i as f64 * 0.1,
                factors: Vec::new(),
                explanation: "seeded".into(),
            },
            rank: Some(i as u32 + 1),
        })
        .collect();
    repo.replace_run_articles(run.id, rows).await.unwrap();
    repo.save_run(&run).await.unwrap();

    cfg.run.timeout_secs = Some(0);
    let feed = Arc::new(StaticFeed::new(&sources, 3));
    let orch = orchestrator(cfg, repo.clone(), feed.clone(), Arc::new(MockGenerator));
    let res = orch.resume(run.id).await.unwrap();

    assert_eq!(res.status, RunStatus::Partial);
    assert!(res.narration.is_none());
    assert!(
        res.warnings
            .iter()
            .any(|w| w.stage == Stage::Generating && w.message.contains("timed out")),
        "{:?}",
        res.warnings
    );
    let selected: Vec<_> = res.selected.iter().map(|s| s.article.id).collect();
    assert_eq!(selected, admitted);
    assert_eq!(feed.calls.load(Ordering::SeqCst), 0);

    let stored = repo.get_run(run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Partial);
    let ranks: Vec<_> = repo
        .run_articles(run.id)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|r| r.rank)
        .collect();
    assert_eq!(ranks.len(), 3);
}

#[tokio::test]
async fn terminal_runs_cannot_be_resumed() {
    let dir = tempfile::tempdir().unwrap();
    let sources = vec![source("wire", "news")];
    let feed = Arc::new(StaticFeed::new(&sources, 3));
    let repo = Arc::new(MemoryRepository::new());
    let orch = orchestrator(
        config(sources, dir.path()),
        repo.clone(),
        feed,
        Arc::new(DownGenerator),
    );

    let partial = newsrank::run(&orch, date(), 5, 100, 2).await.unwrap();
    assert_eq!(partial.status, RunStatus::Partial);
    let err = orch.resume(partial.run_id).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Terminal {
            status: RunStatus::Partial,
            ..
        }
    ));
}

#[tokio::test]
async fn unknown_run_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let sources = vec![source("wire", "news")];
    let feed = Arc::new(StaticFeed::new(&sources, 1));
    let orch = orchestrator(
        config(sources, dir.path()),
        Arc::new(MemoryRepository::new()),
        feed,
        Arc::new(MockGenerator),
    );
    let err = orch.resume(404).await.unwrap_err();
    assert!(matches!(err, PipelineError::RunNotFound(404)));
    assert_eq!(err.run_id(), Some(404));
}

#[tokio::test]
async fn persisted_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state.json");
    let sources = vec![source("wire", "news")];

    let run_id = {
        let repo = Arc::new(MemoryRepository::open(&state).unwrap());
        let mut run = repo.create_run(new_run()).await.unwrap();
        run.status = RunStatus::Ingesting;
        repo.save_run(&run).await.unwrap();
        run.id
    };

    let repo = Arc::new(MemoryRepository::open(&state).unwrap());
    let feed = Arc::new(StaticFeed::new(&sources, 3));
    let orch = orchestrator(
        config(sources, &dir.path().join("runs")),
        repo.clone(),
        feed.clone(),
        Arc::new(MockGenerator),
    );
    let res = orch.resume(run_id).await.unwrap();
    assert_eq!(res.status, RunStatus::Completed);
    assert_eq!(feed.calls.load(Ordering::SeqCst), 1);
    assert_eq!(res.selected.len(), 3);
}
