//! Hotel reservation pipeline CLI
//!
//! Ingests the raw reservations, preprocesses them and trains the
//! cancellation classifier in one run.

use anyhow::{Context, Result};
use clap::Parser;
use hotel_core::Telemetry;
use hotel_pipeline::{run, Args};
use tracing::info;

fn main() -> Result<()> {
    let args = Args::parse();
    let telemetry = Telemetry::stdout(args.log_level());

    telemetry.scope(|| {
        info!("Hotel reservation pipeline v{}", env!("CARGO_PKG_VERSION"));
        info!("Working root: {}", args.root.display());
    });

    let summary = run(&args, &telemetry).context("Pipeline run failed")?;

    telemetry.scope(|| {
        let metrics = &summary.training.metrics;
        info!("═══════════════════════════════════════════");
        info!("✓ Pipeline completed successfully");
        info!(
            "  Rows: {} raw, {} train, {} test",
            summary.ingestion.raw_rows, summary.ingestion.train_rows, summary.ingestion.test_rows
        );
        info!(
            "  Selected features: {}",
            summary.processing.selection.feature_names().join(", ")
        );
        info!(
            "  Accuracy {:.4}, precision {:.4}, recall {:.4}, F1 {:.4}",
            metrics.accuracy, metrics.precision, metrics.recall, metrics.f1
        );
        info!(
            "  Model: {} ({})",
            summary.training.model_path.display(),
            summary.training.model_hash
        );
    });

    Ok(())
}
