//! Jitter injection
//!
//! Resamples a clean image into the jittered normal-line image and the
//! check-line image a push-frame sensor would read under a harmonic jitter.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pushframe::model::HarmonicModel;
use pushframe::pipeline::inject_jitter;
use pushframe::raster::{ImageFileStore, RasterStore};
use pushframe::shared_args::{offsets_path, ResampleArgs, ScheduleTableArgs};
use pushframe::tables::LineTimeTable;

#[derive(Parser, Debug)]
#[command(author, version, about = "Inject rolling-shutter jitter into an image")]
struct Args {
    /// Clean input image
    #[arg(long)]
    input: PathBuf,

    /// Harmonic jitter table (frequency,ampX,phaseX,ampY,phaseY)
    #[arg(long)]
    jitter: PathBuf,

    #[command(flatten)]
    tables: ScheduleTableArgs,

    #[command(flatten)]
    resample: ResampleArgs,

    /// Jittered normal-line image
    #[arg(long)]
    output: PathBuf,

    /// Check-line image
    #[arg(long)]
    check_output: PathBuf,

    /// Offsets report for the normal lines, dSample,dLine (default: beside the output image)
    #[arg(long)]
    offsets: Option<PathBuf>,

    /// Offsets report for the check lines, dSample,dLine (default: beside the check image)
    #[arg(long)]
    check_offsets: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let model = HarmonicModel::read_csv(&args.jitter)
        .with_context(|| format!("Failed to read jitter table {:?}", args.jitter))?;
    let normal_table = LineTimeTable::read_csv(&args.tables.normal_table)
        .with_context(|| format!("Failed to read normal table {:?}", args.tables.normal_table))?;
    let check_table = LineTimeTable::read_csv(&args.tables.check_table)
        .with_context(|| format!("Failed to read check table {:?}", args.tables.check_table))?;

    let store = ImageFileStore;
    let input = store
        .open(&args.input)
        .with_context(|| format!("Failed to open input image {:?}", args.input))?;

    let injected = inject_jitter(
        &input,
        &normal_table,
        &check_table,
        &model.into(),
        args.resample.interpolation(),
    )
    .context("Failed to build jitter transforms")?;

    store
        .create(&args.output, &injected.jittered)
        .with_context(|| format!("Failed to write {:?}", args.output))?;
    store
        .create(&args.check_output, &injected.check)
        .with_context(|| format!("Failed to write {:?}", args.check_output))?;
    let normal_offsets = offsets_path(&args.output, args.offsets.as_deref());
    injected
        .normal_offsets
        .write_offsets(&normal_offsets)
        .with_context(|| format!("Failed to write {normal_offsets:?}"))?;
    let check_offsets = offsets_path(&args.check_output, args.check_offsets.as_deref());
    injected
        .check_offsets
        .write_offsets(&check_offsets)
        .with_context(|| format!("Failed to write {check_offsets:?}"))?;

    let rms = injected.normal_offsets.rms();
    println!("=== Jitter Injection ===");
    println!("Input:        {}x{}", input.samples(), input.lines());
    println!("Normal lines: {}", injected.jittered.lines());
    println!("Check lines:  {}", injected.check.lines());
    println!("Jitter RMS:   sample {:.4} px, line {:.4} px", rms.d_sample, rms.d_line);
    println!("\nJittered image: {:?}", args.output);
    println!("Check image:    {:?}", args.check_output);
    println!("Offsets:        {normal_offsets:?}, {check_offsets:?}");

    Ok(())
}
