//! Jitter recovery
//!
//! Registers every check line against the jittered normal-line image and
//! writes the residual report used by `jitterfit`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pushframe::raster::{ImageFileStore, RasterStore};
use pushframe::recovery::{recover_jitter, write_residuals, RecoveryStatistics};
use pushframe::registration::{MaximumCorrelation, RegistrationConfig};
use pushframe::shared_args::ScheduleTableArgs;
use pushframe::tables::LineTimeTable;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Recover jitter residuals by correlating check lines",
    long_about = "Registers each check line against the jittered image around its source line.\n\n\
        Writes one residual record per check line and a JSON statistics summary\n\
        next to the report."
)]
struct Args {
    /// Jittered normal-line image
    #[arg(long)]
    jittered: PathBuf,

    /// Check-line image
    #[arg(long)]
    check: PathBuf,

    #[command(flatten)]
    tables: ScheduleTableArgs,

    /// Registration definition (JSON); defaults are used when omitted
    #[arg(long)]
    definition: Option<PathBuf>,

    /// Line/sample scale of the jittered image relative to the tables
    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    /// Residual report
    #[arg(long, default_value = "residuals.csv")]
    output: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.definition {
        Some(path) => RegistrationConfig::load_from_file(path)
            .with_context(|| format!("Failed to load registration definition {path:?}"))?,
        None => RegistrationConfig::default(),
    };

    let normal_table = LineTimeTable::read_csv(&args.tables.normal_table)
        .with_context(|| format!("Failed to read normal table {:?}", args.tables.normal_table))?;
    let check_table = LineTimeTable::read_csv(&args.tables.check_table)
        .with_context(|| format!("Failed to read check table {:?}", args.tables.check_table))?;

    let store = ImageFileStore;
    let jittered = store
        .open(&args.jittered)
        .with_context(|| format!("Failed to open jittered image {:?}", args.jittered))?;
    let check = store
        .open(&args.check)
        .with_context(|| format!("Failed to open check image {:?}", args.check))?;

    let correlator = MaximumCorrelation::from_config(&config);
    let records = recover_jitter(
        &jittered,
        &check,
        &check_table,
        &normal_table,
        args.scale,
        &correlator,
        &config,
    )
    .context("Invalid --scale")?;

    write_residuals(&args.output, &records)
        .with_context(|| format!("Failed to write residual report {:?}", args.output))?;
    let stats = RecoveryStatistics::from_records(&records);
    let stats_path = args.output.with_extension("json");
    stats
        .save_to_file(&stats_path)
        .with_context(|| format!("Failed to write statistics {stats_path:?}"))?;

    println!("=== Jitter Recovery ===");
    println!("Attempted:    {}", stats.attempted);
    println!("Succeeded:    {}", stats.succeeded);
    if let Some(goodness) = stats.mean_goodness_of_fit {
        println!("Mean goodness: {goodness:.4}");
    }
    if let (Some(line), Some(sample)) = (stats.rms_delta_line, stats.rms_delta_sample) {
        println!("Delta RMS:    line {line:.4} px, sample {sample:.4} px");
    }
    println!("\nResiduals:  {:?}", args.output);
    println!("Statistics: {stats_path:?}");

    Ok(())
}
