//! Jitter removal
//!
//! Resamples a jittered image through the inverse of a fitted jitter model.
//! The model comes from a `jitterfit` model file, or from a polynomial
//! coefficient table together with the time domain it was fitted over.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pushframe::model::{JitterModel, PolynomialModel, TimeDomain};
use pushframe::pipeline::remove_jitter;
use pushframe::raster::{ImageFileStore, RasterStore};
use pushframe::shared_args::{offsets_path, ResampleArgs};
use pushframe::tables::LineTimeTable;

#[derive(Parser, Debug)]
#[command(author, version, about = "Remove modeled jitter from an image")]
struct Args {
    /// Jittered normal-line image
    #[arg(long)]
    input: PathBuf,

    /// Normal-line time table (lineNumber,exposureTime)
    #[arg(long)]
    normal_table: PathBuf,

    /// Model file written by jitterfit
    #[arg(long, conflicts_with = "coefficients", required_unless_present = "coefficients")]
    model: Option<PathBuf>,

    /// Polynomial coefficient table (lineCoefficient,sampleCoefficient)
    #[arg(long, requires = "max_time")]
    coefficients: Option<PathBuf>,

    /// End of the polynomial time domain in seconds
    #[arg(long)]
    max_time: Option<f64>,

    #[command(flatten)]
    resample: ResampleArgs,

    /// Corrected image
    #[arg(long)]
    output: PathBuf,

    /// Offsets report, dSample,dLine (default: beside the output image)
    #[arg(long)]
    offsets: Option<PathBuf>,
}

fn load_model(args: &Args) -> Result<JitterModel> {
    if let Some(path) = &args.model {
        return JitterModel::load_from_file(path)
            .with_context(|| format!("Failed to load model {path:?}"));
    }
    let (Some(path), Some(max_time)) = (&args.coefficients, args.max_time) else {
        anyhow::bail!("Either --model or --coefficients with --max-time is required");
    };
    let domain = TimeDomain::new(0.0, max_time).context("Invalid --max-time")?;
    let model = PolynomialModel::read_coefficients(path, domain)
        .with_context(|| format!("Failed to read coefficient table {path:?}"))?;
    Ok(model.into())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let model = load_model(&args)?;
    let normal_table = LineTimeTable::read_csv(&args.normal_table)
        .with_context(|| format!("Failed to read normal table {:?}", args.normal_table))?;

    let store = ImageFileStore;
    let input = store
        .open(&args.input)
        .with_context(|| format!("Failed to open input image {:?}", args.input))?;

    let (corrected, offsets) = remove_jitter(
        &input,
        &normal_table,
        &model,
        args.resample.interpolation(),
    )
    .context("Normal table does not match the input image")?;

    store
        .create(&args.output, &corrected)
        .with_context(|| format!("Failed to write {:?}", args.output))?;
    let offsets_file = offsets_path(&args.output, args.offsets.as_deref());
    offsets
        .write_offsets(&offsets_file)
        .with_context(|| format!("Failed to write {offsets_file:?}"))?;

    let rms = offsets.rms();
    println!("=== Jitter Removal ===");
    println!("Model:          {}", model.kind());
    println!("Image:          {}x{}", input.samples(), input.lines());
    println!("Correction RMS: sample {:.4} px, line {:.4} px", rms.d_sample, rms.d_line);
    println!("\nCorrected image: {:?}", args.output);
    println!("Offsets:         {offsets_file:?}");

    Ok(())
}
