use std::path::Path;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub fn describe() {
    describe_counter!(
        "scorer_transactions_loaded_total",
        "Number of transaction records read from the input file."
    );
    describe_counter!(
        "scorer_transactions_without_wallet_total",
        "Transaction records dropped because they carry no wallet."
    );
    describe_counter!(
        "scorer_wallets_scored_total",
        "Number of wallets written to the scores file."
    );
    describe_counter!(
        "scorer_wallet_labels_total",
        "Wallets per pseudo-label (label=risky|neutral|safe)."
    );
    describe_histogram!(
        "scorer_stage_duration_ms",
        "Wall time of each pipeline stage in milliseconds."
    );
    describe_gauge!(
        "scorer_fit_rmse",
        "In-sample RMSE of the boosted model against the pseudo-labels."
    );
    describe_counter!(
        "tracing_error_events",
        "Number of ERROR-level log events."
    );
}

/// Global recorder without a listener; the caller dumps `render()` to disk.
pub fn install_prometheus() -> Result<PrometheusHandle> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}

pub fn write_snapshot(handle: &PrometheusHandle, path: &Path) -> Result<()> {
    std::fs::write(path, handle.render())
        .with_context(|| format!("writing metrics to {}", path.display()))?;
    tracing::info!(path = %path.display(), "metrics snapshot written");
    Ok(())
}
