//! Jitter model fit
//!
//! Fits a polynomial or B-spline jitter model to a residual report.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pushframe::fit::{fit_polynomial, fit_spline, write_fit_residuals, FitConfig, FitResidual};
use pushframe::model::JitterModel;
use pushframe::recovery::read_residuals;
use pushframe::shared_args::{FitArgs, ModelKind};

#[derive(Parser, Debug)]
#[command(author, version, about = "Fit a jitter model to recovered residuals")]
struct Args {
    /// Residual report written by jitterreg
    #[arg(long, default_value = "residuals.csv")]
    residuals: PathBuf,

    #[command(flatten)]
    fit: FitArgs,

    /// Coefficient table (lineCoefficient,sampleCoefficient)
    #[arg(long, default_value = "coefficients.csv")]
    coefficients: PathBuf,

    /// Full model with its time domain or knots (JSON)
    #[arg(long, default_value = "model.json")]
    model_output: PathBuf,

    /// Optional per-record fit residual report
    #[arg(long)]
    fit_residuals: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let records = read_residuals(&args.residuals)
        .with_context(|| format!("Failed to read residual report {:?}", args.residuals))?;
    let config = FitConfig {
        tolerance: args.fit.tolerance,
        max_time: args.fit.max_time,
    };

    let (model, residuals, rms_line, rms_sample): (JitterModel, Vec<FitResidual>, f64, f64) =
        match args.fit.model {
            ModelKind::Poly => {
                let fit = fit_polynomial(&records, args.fit.degree, &config)
                    .context("Polynomial fit failed")?;
                fit.model
                    .write_coefficients(&args.coefficients)
                    .with_context(|| format!("Failed to write {:?}", args.coefficients))?;
                let (line, sample) = (fit.rms_line_residual(), fit.rms_sample_residual());
                (fit.model.into(), fit.residuals, line, sample)
            }
            ModelKind::Spline => {
                let fit = fit_spline(
                    &records,
                    args.fit.spline_order,
                    args.fit.spline_coefficients,
                    &config,
                )
                .context("Spline fit failed")?;
                fit.model
                    .write_coefficients(&args.coefficients)
                    .with_context(|| format!("Failed to write {:?}", args.coefficients))?;
                let (line, sample) = (fit.rms_line_residual(), fit.rms_sample_residual());
                (fit.model.into(), fit.residuals, line, sample)
            }
        };

    model
        .save_to_file(&args.model_output)
        .with_context(|| format!("Failed to write model {:?}", args.model_output))?;
    if let Some(path) = &args.fit_residuals {
        write_fit_residuals(path, &residuals)
            .with_context(|| format!("Failed to write fit residuals {path:?}"))?;
    }

    println!("=== Jitter Fit ===");
    println!("Model:         {}", model.kind());
    println!("Records:       {} read, {} used", records.len(), residuals.len());
    println!("Residual RMS:  line {rms_line:.4} px, sample {rms_sample:.4} px");
    println!("\nCoefficients: {:?}", args.coefficients);
    println!("Model:        {:?}", args.model_output);

    Ok(())
}
