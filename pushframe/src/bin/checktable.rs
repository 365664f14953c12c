//! Check-line schedule generator
//!
//! Writes the full readout schedule and its normal-only and check-only
//! partitions as `lineNumber,exposureTime` tables.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pushframe::schedule::LineSchedule;
use pushframe::shared_args::ScheduleArgs;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Generate push-frame check-line timing tables",
    long_about = "Generates the readout order and read times of normal and check lines.\n\n\
        Writes <output>, <stem>_normal.<ext> and <stem>_shadow.<ext>."
)]
struct Args {
    /// Full schedule table; the partitions are written next to it
    #[arg(long, default_value = "checktable.csv")]
    output: PathBuf,

    #[command(flatten)]
    schedule: ScheduleArgs,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = args.schedule.to_config();
    let schedule = LineSchedule::generate(&config).context("Invalid schedule configuration")?;

    let (all_path, normal_path, check_path) = schedule
        .write_tables(&args.output)
        .with_context(|| format!("Failed to write schedule tables at {:?}", args.output))?;

    println!("=== Check-line Schedule ===");
    println!("Normal lines:  {}", schedule.normal().len());
    println!("Check lines:   {}", schedule.check().len());
    println!(
        "Source lines:  {:?}",
        config.check_line_identities()
    );
    println!("Line period:   {:e} s", config.time_per_line());
    println!("\n=== Output Files ===");
    println!("Schedule: {all_path:?}");
    println!("Normal:   {normal_path:?}");
    println!("Check:    {check_path:?}");

    Ok(())
}
