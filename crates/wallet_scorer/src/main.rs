use anyhow::Result;
use chrono::Utc;

mod cli;
mod ingestion;
mod metrics;
mod model;
mod pipeline;
mod plots;
mod wallet_features;
mod wallet_labels;
mod wallet_scoring;

fn main() -> Result<()> {
    let args = match cli::parse_args(std::env::args()) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}");
            println!("{}", cli::USAGE);
            std::process::exit(1);
        }
    };

    let config = common::config::Config::load(args.config.as_deref())?;

    let dispatch = common::observability::build_dispatch(
        &config.general.log_level,
        config.general.log_format,
    );
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;

    let prometheus = match &config.observability.metrics_path {
        Some(_) => Some(metrics::install_prometheus()?),
        None => None,
    };
    metrics::describe();

    let opts = pipeline::RunOptions {
        input: args.input,
        as_of: args.as_of.unwrap_or_else(Utc::now),
        out_dir: args.out_dir,
    };
    tracing::info!(input = %opts.input.display(), as_of = %opts.as_of, "wallet_scorer starting");

    let report = pipeline::run(&opts, &config)?;
    for (label, wallets) in &report.label_counts {
        tracing::info!(label = label.as_str(), wallets, "pseudo-label count");
    }
    tracing::info!(
        wallets = report.wallets.len(),
        min_score = report.summary.min,
        mean_score = report.summary.mean,
        max_score = report.summary.max,
        fit_rmse = report.fit.rmse,
        fit_r2 = report.fit.r2,
        "run summary"
    );

    if let (Some(handle), Some(path)) = (&prometheus, &config.observability.metrics_path) {
        metrics::write_snapshot(handle, std::path::Path::new(path))?;
    }

    println!("Done! Outputs:");
    for path in report.output_paths() {
        println!("   - {}", path.display());
    }
    Ok(())
}
