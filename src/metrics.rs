use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up in the exposition).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "newsrank_candidates_total",
            "Candidates produced by ingestion."
        );
        describe_counter!(
            "newsrank_source_errors_total",
            "Sources that failed to fetch or parse."
        );
        describe_counter!(
            "newsrank_extraction_errors_total",
            "Candidates whose body extraction failed."
        );
        describe_counter!(
            "newsrank_admitted_total",
            "Admission decisions, labelled by outcome."
        );
        describe_counter!("newsrank_scored_total", "Articles scored.");
        describe_counter!(
            "newsrank_scorer_fallbacks_total",
            "Scorer errors replaced by the neutral default."
        );
        describe_counter!("newsrank_selected_total", "Articles selected.");
        describe_counter!("newsrank_runs_total", "Finished runs, labelled by status.");
        describe_histogram!("newsrank_stage_ms", "Stage duration in milliseconds.");
        describe_histogram!("newsrank_feed_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("newsrank_last_run_ts", "Unix ts when a run last finished.");
    });
}

/// Install the global Prometheus recorder. Call once from the binary.
pub fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    ensure_metrics_described();
    Ok(handle)
}
