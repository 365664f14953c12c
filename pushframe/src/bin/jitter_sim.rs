//! Synthetic jitter pipeline
//!
//! Runs every stage on a generated scene: schedule, harmonic jitter
//! injection, check-line recovery, model fit and correction. The fitted model
//! is compared with the injected jitter at every normal-line read time.
//!
//! # Outputs
//! - RMS statistics (injected jitter, model error after correction)
//! - With `--output-dir`: scene, jittered, check and corrected images, the
//!   schedule tables, offsets reports for each pass, residual report and
//!   fitted model

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use jitter_math::{mean, rms, Interpolation};
use pushframe::fit::{fit_polynomial, fit_spline, FitConfig, FitError};
use pushframe::displacement::DisplacementTable;
use pushframe::model::{HarmonicModel, HarmonicTerm, JitterModel, Offset};
use pushframe::pipeline::{inject_jitter, remove_jitter};
use pushframe::raster::{ImageFileStore, Raster, RasterStore};
use pushframe::recovery::{recover_jitter, write_residuals, RecoveryStatistics, ResidualRecord};
use pushframe::registration::{MaximumCorrelation, RegistrationConfig};
use pushframe::scene::{add_noise, textured_scene};
use pushframe::schedule::{LineSchedule, ScheduleConfig};
use pushframe::shared_args::{FitArgs, ModelKind, ResampleArgs, ScheduleArgs};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Synthetic push-frame jitter simulation",
    long_about = "Simulates a push-frame readout of a textured scene under harmonic jitter,\n\
        recovers the jitter from check lines, fits a model and removes it.\n\n\
        Reports how closely the fitted model follows the injected jitter."
)]
struct Args {
    /// Scene width in pixels
    #[arg(long, default_value_t = 128)]
    samples: usize,

    #[command(flatten)]
    schedule: ScheduleArgs,

    /// Harmonic jitter table (default: two built-in terms)
    #[arg(long)]
    jitter: Option<PathBuf>,

    /// Gaussian read noise sigma in DN
    #[arg(long, default_value_t = 20.0)]
    noise: f64,

    /// Random seed for the scene and noise
    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[command(flatten)]
    resample: ResampleArgs,

    #[command(flatten)]
    fit: FitArgs,

    /// Directory for images and tables (nothing is written when omitted)
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

/// Everything one simulation run needs
struct SimulationParams {
    samples: usize,
    schedule: ScheduleConfig,
    jitter: HarmonicModel,
    noise: f64,
    seed: u64,
    interpolation: Interpolation,
    fit: FitArgs,
}

struct SimulationResults {
    schedule: LineSchedule,
    scene: Raster,
    jittered: Raster,
    check: Raster,
    corrected: Raster,
    normal_offsets: DisplacementTable,
    check_offsets: DisplacementTable,
    correction_offsets: DisplacementTable,
    records: Vec<ResidualRecord>,
    model: JitterModel,
    /// Injected jitter at each normal line, mean removed
    injected: Vec<Offset>,
    /// Injected minus fitted jitter at each normal line, mean removed
    model_error: Vec<Offset>,
}

impl SimulationResults {
    fn axis_rms(offsets: &[Offset]) -> Offset {
        Offset::new(
            rms(&offsets.iter().map(|o| o.d_sample).collect::<Vec<_>>()),
            rms(&offsets.iter().map(|o| o.d_line).collect::<Vec<_>>()),
        )
    }

    fn print_statistics(&self) {
        let stats = RecoveryStatistics::from_records(&self.records);
        let injected = Self::axis_rms(&self.injected);
        let error = Self::axis_rms(&self.model_error);

        println!("\n=== Recovery ===");
        println!("Check lines registered: {} of {}", stats.succeeded, stats.attempted);
        if let Some(goodness) = stats.mean_goodness_of_fit {
            println!("Mean goodness of fit:   {goodness:.4}");
        }

        println!("\n=== RMS Statistics ===");
        println!("Injected Jitter:");
        println!("  Sample: {:.4} px RMS", injected.d_sample);
        println!("  Line:   {:.4} px RMS", injected.d_line);
        println!("\nModel Error ({} fit):", self.model.kind());
        println!("  Sample: {:.4} px RMS", error.d_sample);
        println!("  Line:   {:.4} px RMS", error.d_line);
    }

    fn write_outputs(&self, dir: &std::path::Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let store = ImageFileStore;
        for (name, raster) in [
            ("scene.png", &self.scene),
            ("jittered.png", &self.jittered),
            ("check.png", &self.check),
            ("corrected.png", &self.corrected),
        ] {
            let path = dir.join(name);
            store
                .create(&path, raster)
                .with_context(|| format!("Failed to write {path:?}"))?;
        }
        self.schedule.write_tables(&dir.join("checktable.csv"))?;
        self.normal_offsets.write_offsets(dir.join("normal_offsets.csv"))?;
        self.check_offsets.write_offsets(dir.join("check_offsets.csv"))?;
        self.correction_offsets
            .write_offsets(dir.join("dejitter_offsets.csv"))?;
        write_residuals(dir.join("residuals.csv"), &self.records)?;
        self.model.save_to_file(&dir.join("model.json"))?;
        Ok(())
    }
}

/// Terms used when no jitter table is given
fn default_jitter() -> HarmonicModel {
    HarmonicModel::new(vec![
        HarmonicTerm {
            frequency: 0.8,
            amp_x: 1.2,
            phase_x: 0.3,
            amp_y: 1.6,
            phase_y: 1.1,
        },
        HarmonicTerm {
            frequency: 2.3,
            amp_x: 0.3,
            phase_x: 2.0,
            amp_y: 0.4,
            phase_y: 0.7,
        },
    ])
}

fn fit_model(records: &[ResidualRecord], fit: &FitArgs) -> Result<JitterModel, FitError> {
    let config = FitConfig {
        tolerance: fit.tolerance,
        max_time: fit.max_time,
    };
    Ok(match fit.model {
        ModelKind::Poly => fit_polynomial(records, fit.degree, &config)?.model.into(),
        ModelKind::Spline => {
            fit_spline(records, fit.spline_order, fit.spline_coefficients, &config)?
                .model
                .into()
        }
    })
}

/// Subtract the per-axis mean
fn demean(offsets: Vec<Offset>) -> Vec<Offset> {
    let ms = mean(&offsets.iter().map(|o| o.d_sample).collect::<Vec<_>>());
    let ml = mean(&offsets.iter().map(|o| o.d_line).collect::<Vec<_>>());
    offsets
        .into_iter()
        .map(|o| Offset::new(o.d_sample - ms, o.d_line - ml))
        .collect()
}

fn run_simulation(params: &SimulationParams) -> Result<SimulationResults> {
    let schedule = LineSchedule::generate(&params.schedule).context("Invalid schedule")?;

    let lines = params.schedule.total_lines as usize;
    let scene = Raster::from_band(textured_scene(params.samples, lines, params.seed));
    let truth: JitterModel = params.jitter.clone().into();

    let injected = inject_jitter(
        &scene,
        schedule.normal(),
        schedule.check(),
        &truth,
        params.interpolation,
    )?;
    let noisy = |raster: Raster, seed: u64| -> Result<Raster> {
        let bands = raster
            .into_bands()
            .into_iter()
            .map(|band| add_noise(band, params.noise, seed))
            .collect();
        Ok(Raster::new(bands)?)
    };
    let normal_offsets = injected.normal_offsets;
    let check_offsets = injected.check_offsets;
    let jittered = noisy(injected.jittered, params.seed.wrapping_add(1))?;
    let check = noisy(injected.check, params.seed.wrapping_add(2))?;

    let registration = RegistrationConfig::default();
    let correlator = MaximumCorrelation::from_config(&registration);
    let records = recover_jitter(
        &jittered,
        &check,
        schedule.check(),
        schedule.normal(),
        1.0,
        &correlator,
        &registration,
    )?;

    let model = fit_model(&records, &params.fit).context("Model fit failed")?;
    let (corrected, correction_offsets) = remove_jitter(&jittered, schedule.normal(), &model, params.interpolation)?;

    let times = schedule.normal().times();
    let injected_jitter = demean(times.iter().map(|&t| truth.evaluate(t)).collect());
    let model_error = demean(
        times
            .iter()
            .map(|&t| {
                let (a, b) = (truth.evaluate(t), model.evaluate(t));
                Offset::new(a.d_sample - b.d_sample, a.d_line - b.d_line)
            })
            .collect(),
    );

    Ok(SimulationResults {
        schedule,
        scene,
        jittered,
        check,
        corrected,
        normal_offsets,
        check_offsets,
        correction_offsets,
        records,
        model,
        injected: injected_jitter,
        model_error,
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let jitter = match &args.jitter {
        Some(path) => HarmonicModel::read_csv(path)
            .with_context(|| format!("Failed to read jitter table {path:?}"))?,
        None => default_jitter(),
    };
    let params = SimulationParams {
        samples: args.samples,
        schedule: args.schedule.to_config(),
        jitter,
        noise: args.noise,
        seed: args.seed,
        interpolation: args.resample.interpolation(),
        fit: args.fit.clone(),
    };

    println!("=== Push-frame Jitter Simulation ===");
    println!(
        "Scene: {}x{}, {} check lines over {} source lines",
        params.samples,
        params.schedule.total_lines,
        params.schedule.check_line_count,
        params.schedule.unique_check_lines
    );
    println!("Jitter terms: {}", params.jitter.terms().len());

    println!("\nRunning simulation...");
    let results = run_simulation(&params)?;
    results.print_statistics();

    if let Some(dir) = &args.output_dir {
        results.write_outputs(dir)?;
        println!("\nOutputs written to {dir:?}");
    }

    Ok(())
}
