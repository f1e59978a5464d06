//! Command-line configuration for wsi-prepro.
//!
//! Two subcommands are available:
//!
//! - `mask` - produce specimen and annotation masks for every annotated
//!   slide in a catalog
//! - `sample` - sample usable patches from one slide and its masks
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use wsi_prepro::config::{Cli, Command};
//!
//! match Cli::parse().into_command() {
//!     Command::Mask(config) => println!("catalog: {}", config.catalog.display()),
//!     Command::Sample(config) => println!("slide: {}", config.slide.display()),
//! }
//! ```
//!
//! # Environment Variables
//!
//! Options can also be set via environment variables with the `PREPRO_` prefix:
//!
//! - `PREPRO_CATALOG` - SQLite catalog path
//! - `PREPRO_TABLE` - Catalog table (default: slides)
//! - `PREPRO_OUTPUT` - Output directory
//! - `PREPRO_OPTIONS` - Specimen options JSON file
//! - `PREPRO_DOWNSAMPLE` - Mask production downsample (default: 12)
//! - `PREPRO_WORKERS` - Concurrent mask workers (default: 4)
//! - `PREPRO_PATCH_MICRONS` - Patch side in microns (default: 500)
//! - `PREPRO_INTERVAL_MICRONS` - Sampling interval in microns (default: 250)
//! - `PREPRO_OUTPUT_PIXELS` - Output patch side in pixels (default: 128)
//! - `PREPRO_PASS_RATIO` - Mask foreground fraction to exceed (default: 0.5)
//! - `PREPRO_COUNT` - Maximum patches to export (default: 100)
//! - `PREPRO_SEED` - Candidate shuffle seed

use std::fs;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::batch::DEFAULT_WORKERS;
use crate::catalog::DEFAULT_TABLE;
use crate::geometry::{MicronSize, PixelSize};
use crate::mask::{SpecimenOptions, DEFAULT_MASK_DOWNSAMPLE};
use crate::patch::{ExportOptions, PatchSettings, DEFAULT_PASS_RATIO};

// =============================================================================
// Default Values
// =============================================================================

/// Default patch side in microns.
pub const DEFAULT_PATCH_MICRONS: f64 = 500.0;

/// Default sampling interval in microns.
pub const DEFAULT_INTERVAL_MICRONS: f64 = 250.0;

/// Default output patch side in pixels.
pub const DEFAULT_OUTPUT_PIXELS: u32 = 128;

/// Default number of exported patches.
pub const DEFAULT_PATCH_COUNT: usize = 100;

// =============================================================================
// CLI Arguments
// =============================================================================

/// wsi-prepro - Whole Slide Image mask production and patch sampling.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-prepro")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Produce specimen and annotation masks for annotated catalog slides.
    Mask(MaskConfig),

    /// Sample usable patches from one slide and its masks.
    Sample(SampleConfig),
}

// =============================================================================
// Mask Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct MaskConfig {
    /// SQLite database holding the slide catalog.
    #[arg(long, env = "PREPRO_CATALOG")]
    pub catalog: PathBuf,

    /// Catalog table name.
    #[arg(long, default_value = DEFAULT_TABLE, env = "PREPRO_TABLE")]
    pub table: String,

    /// Root directory for masks, dumps and previews.
    #[arg(short, long, env = "PREPRO_OUTPUT")]
    pub output: PathBuf,

    /// JSON file with specimen selection options.
    ///
    /// If not specified, the built-in tissue ranges are used.
    #[arg(long, env = "PREPRO_OPTIONS")]
    pub options: Option<PathBuf>,

    /// Downsample at which masks are produced.
    #[arg(long, default_value_t = DEFAULT_MASK_DOWNSAMPLE, env = "PREPRO_DOWNSAMPLE")]
    pub downsample: f64,

    /// Number of slides processed concurrently.
    #[arg(short, long, default_value_t = DEFAULT_WORKERS, env = "PREPRO_WORKERS")]
    pub workers: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl MaskConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.table.is_empty() {
            return Err("Catalog table name is required. Set --table or PREPRO_TABLE".to_string());
        }
        if !self.downsample.is_finite() || self.downsample <= 0.0 {
            return Err(format!(
                "downsample must be positive, got {}",
                self.downsample
            ));
        }
        if self.workers == 0 {
            return Err("workers must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Specimen options from `--options`, or the defaults.
    pub fn specimen_options(&self) -> Result<SpecimenOptions, String> {
        let Some(path) = &self.options else {
            return Ok(SpecimenOptions::default());
        };

        let json = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let options: SpecimenOptions = serde_json::from_str(&json)
            .map_err(|e| format!("Invalid specimen options in {}: {}", path.display(), e))?;
        options.blur.validate().map_err(|e| e.to_string())?;

        Ok(options)
    }
}

// =============================================================================
// Sample Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct SampleConfig {
    /// Slide file (pyramidal TIFF or SVS).
    #[arg(long, env = "PREPRO_SLIDE")]
    pub slide: PathBuf,

    /// Specimen mask TIFF.
    #[arg(long, env = "PREPRO_SPECIMEN")]
    pub specimen: PathBuf,

    /// Annotation mask TIFF.
    #[arg(long, env = "PREPRO_ANNOTATION")]
    pub annotation: PathBuf,

    /// Directory receiving the exported patches.
    #[arg(short, long, env = "PREPRO_OUTPUT")]
    pub output: PathBuf,

    /// Patch side in microns.
    #[arg(long, default_value_t = DEFAULT_PATCH_MICRONS, env = "PREPRO_PATCH_MICRONS")]
    pub patch_microns: f64,

    /// Distance between candidate patches in microns.
    #[arg(long, default_value_t = DEFAULT_INTERVAL_MICRONS, env = "PREPRO_INTERVAL_MICRONS")]
    pub interval_microns: f64,

    /// Side of exported patches in pixels.
    #[arg(long, default_value_t = DEFAULT_OUTPUT_PIXELS, env = "PREPRO_OUTPUT_PIXELS")]
    pub output_pixels: u32,

    /// Mask foreground fraction a patch must exceed.
    #[arg(long, default_value_t = DEFAULT_PASS_RATIO, env = "PREPRO_PASS_RATIO")]
    pub pass_ratio: f64,

    /// Maximum number of patches to export.
    #[arg(short = 'n', long, default_value_t = DEFAULT_PATCH_COUNT, env = "PREPRO_COUNT")]
    pub count: usize,

    /// Seed for the candidate shuffle.
    ///
    /// If not specified, a random seed is used.
    #[arg(long, env = "PREPRO_SEED")]
    pub seed: Option<u64>,

    /// Also require annotation mask coverage.
    #[arg(long, default_value_t = false)]
    pub require_annotation: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl SampleConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.patch_microns.is_finite() || self.patch_microns <= 0.0 {
            return Err("patch_microns must be positive".to_string());
        }
        if !self.interval_microns.is_finite() || self.interval_microns <= 0.0 {
            return Err("interval_microns must be positive".to_string());
        }
        if self.output_pixels == 0 {
            return Err("output_pixels must be greater than 0".to_string());
        }
        if !(0.0..1.0).contains(&self.pass_ratio) {
            return Err("pass_ratio must be in [0, 1)".to_string());
        }
        if self.count == 0 {
            return Err("count must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn patch_settings(&self) -> PatchSettings {
        PatchSettings {
            patch_microns: MicronSize::square(self.patch_microns),
            interval_microns: MicronSize::square(self.interval_microns),
            output_size: PixelSize::square(self.output_pixels),
        }
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            count: self.count,
            pass_ratio: self.pass_ratio,
            require_annotation: self.require_annotation,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
