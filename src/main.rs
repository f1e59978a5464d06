//! wsi-prepro - Whole Slide Image mask production and patch sampling.
//!
//! This binary parses the command line and dispatches to the mask batch or
//! the patch sampler.

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_prepro::{
    batch::run_batch,
    catalog::{plan_tasks, SlideCatalog, SqliteCatalog},
    config::{Cli, Command, MaskConfig, SampleConfig},
    mask::OutputLayout,
    patch::{export_patches, PatchImporter},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Mask(config) => run_mask(config).await,
        Command::Sample(config) => run_sample(config),
    }
}

// =============================================================================
// Mask Command
// =============================================================================

async fn run_mask(config: MaskConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let options = match config.specimen_options() {
        Ok(options) => options,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Configuration:");
    info!("  Catalog: {} (table {})", config.catalog.display(), config.table);
    info!("  Output: {}", config.output.display());
    info!("  Downsample: {}", config.downsample);
    info!("  Workers: {}", config.workers);

    let catalog = match SqliteCatalog::new(&config.catalog, config.table.clone()) {
        Ok(catalog) => catalog,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let records = match catalog.slides().await {
        Ok(records) => records,
        Err(e) => {
            error!("Failed to read catalog: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let plan = plan_tasks(&records, config.downsample, &options);
    if plan.skipped > 0 {
        warn!("Skipping {} slide(s) without human annotation", plan.skipped);
    }

    let layout = OutputLayout::new(&config.output);
    let mut report = run_batch(plan.tasks, config.workers, layout).await;
    report.failed.extend(plan.rejected);

    for failure in &report.failed {
        error!("  {}: {}", failure.slide_id, failure.message);
    }
    info!(
        "Produced masks for {}/{} slide(s)",
        report.succeeded.len(),
        report.total()
    );

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

// =============================================================================
// Sample Command
// =============================================================================

fn run_sample(config: SampleConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let mut importer = match PatchImporter::open(&config.slide, &config.specimen, &config.annotation)
    {
        Ok(importer) => importer,
        Err(e) => {
            error!("Failed to open {}: {}", config.slide.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let candidates = match importer.configure(&config.patch_settings(), &mut rng) {
        Ok(candidates) => candidates,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Candidate grid: {} x {} ({} coordinates)",
        candidates.count_x,
        candidates.count_y,
        candidates.len()
    );

    match export_patches(
        &mut importer,
        &candidates.coordinates,
        &config.export_options(),
        &config.output,
    ) {
        Ok(accepted) => {
            info!(
                "Wrote {} patch(es) to {}",
                accepted.len(),
                config.output.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Patch export failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_prepro=debug"
    } else {
        "wsi_prepro=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
