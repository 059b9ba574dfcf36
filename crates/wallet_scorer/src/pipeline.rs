//! One batch run: load, engineer, label, train, score, write CSV, plot.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use common::config::Config;

use crate::ingestion::load_transactions;
use crate::model::tree_shap::shap_values;
use crate::model::{Dataset, GbmParams, GbmRegressor, ModelMetrics};
use crate::plots::histogram::save_score_histogram;
use crate::plots::shap_summary::save_shap_summary;
use crate::wallet_features::{engineer_features, FEATURE_NAMES};
use crate::wallet_labels::{label_wallets, LabelRules, PseudoLabel};
use crate::wallet_scoring::{score_predictions, write_scores_csv, ScoreSummary, ScoredWallet};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input: PathBuf,
    /// Reference time for recency features.
    pub as_of: DateTime<Utc>,
    /// Overrides `output.dir` from the config.
    pub out_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub scores_path: PathBuf,
    pub histogram_path: PathBuf,
    pub shap_path: PathBuf,
    pub wallets: Vec<ScoredWallet>,
    pub label_counts: Vec<(PseudoLabel, usize)>,
    pub summary: ScoreSummary,
    pub fit: ModelMetrics,
}

impl RunReport {
    pub fn output_paths(&self) -> [&Path; 3] {
        [&self.scores_path, &self.histogram_path, &self.shap_path]
    }
}

fn timed<T>(stage: &'static str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    let ms = start.elapsed().as_secs_f64() * 1000.0;
    metrics::histogram!("scorer_stage_duration_ms", "stage" => stage).record(ms);
    tracing::info!(stage, elapsed_ms = ms, "stage complete");
    out
}

pub fn run(opts: &RunOptions, config: &Config) -> Result<RunReport> {
    let out_dir = opts
        .out_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.dir));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating output dir {}", out_dir.display()))?;
    let scores_path = out_dir.join(&config.output.scores_file);
    let histogram_path = out_dir.join(&config.output.histogram_file);
    let shap_path = out_dir.join(&config.output.shap_file);

    let txs = timed("load", || load_transactions(&opts.input, &config.input))
        .with_context(|| format!("loading transactions from {}", opts.input.display()))?;
    metrics::counter!("scorer_transactions_loaded_total").increment(txs.len() as u64);

    let features = timed("features", || {
        engineer_features(&txs, opts.as_of, &config.features)
    });
    if features.is_empty() {
        bail!(
            "no wallets to score: {} contains no records with a userWallet",
            opts.input.display()
        );
    }

    let rules = LabelRules::from_config(&config.labels);
    let labels = timed("labels", || label_wallets(&features, &rules));

    let dataset = Dataset::new(
        features.iter().map(|f| f.to_row().to_vec()).collect(),
        labels.iter().map(|l| f64::from(l.value())).collect(),
        FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect(),
    );
    let model = timed("train", || {
        GbmRegressor::fit(&dataset, &GbmParams::from_config(&config.model))
    })
    .context("training scoring model")?;

    let raw = model.predict_batch(&dataset.features);
    let fit = ModelMetrics::regression(&dataset.targets, &raw);
    metrics::gauge!("scorer_fit_rmse").set(fit.rmse);
    tracing::info!(
        mse = fit.mse,
        rmse = fit.rmse,
        mae = fit.mae,
        r2 = fit.r2,
        "in-sample fit against pseudo-labels"
    );

    let scores = timed("score", || score_predictions(&raw));
    let wallets: Vec<ScoredWallet> = features
        .into_iter()
        .zip(&labels)
        .zip(&scores)
        .map(|((features, &label), &score)| ScoredWallet {
            features,
            label,
            score,
        })
        .collect();

    timed("write_csv", || write_scores_csv(&scores_path, &wallets))?;
    metrics::counter!("scorer_wallets_scored_total").increment(wallets.len() as u64);

    timed("histogram", || {
        save_score_histogram(&histogram_path, &scores, config.output.histogram_bins)
    })?;

    timed("shap", || {
        let explanation = shap_values(&model, &dataset.features);
        tracing::info!(
            expected_value = explanation.expected_value,
            "SHAP baseline (mean model output)"
        );
        save_shap_summary(&shap_path, &explanation, &dataset.features)
    })?;

    let summary = ScoreSummary::from_scores(&scores).context("no scores produced")?;
    tracing::info!(
        wallets = wallets.len(),
        min = summary.min,
        mean = summary.mean,
        max = summary.max,
        "scoring complete"
    );

    let label_counts = PseudoLabel::ALL
        .iter()
        .map(|&l| (l, labels.iter().filter(|x| **x == l).count()))
        .collect();

    Ok(RunReport {
        scores_path,
        histogram_path,
        shap_path,
        wallets,
        label_counts,
        summary,
        fit,
    })
}
