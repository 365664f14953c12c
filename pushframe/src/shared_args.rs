use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use jitter_math::Interpolation;

use crate::schedule::ScheduleConfig;

/// Interpolation kernel selectable on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationArg {
    Nearest,
    Bilinear,
    #[default]
    Cubic,
}

impl From<InterpolationArg> for Interpolation {
    fn from(arg: InterpolationArg) -> Self {
        match arg {
            InterpolationArg::Nearest => Interpolation::Nearest,
            InterpolationArg::Bilinear => Interpolation::Bilinear,
            InterpolationArg::Cubic => Interpolation::CubicConvolution,
        }
    }
}

/// Kind of model fitted to recovered residuals
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelKind {
    /// Constant-free polynomial in normalized time
    #[default]
    Poly,
    /// B-spline with uniform breakpoints
    Spline,
}

/// Readout schedule parameters
#[derive(Args, Debug, Clone)]
pub struct ScheduleArgs {
    /// Number of normal lines in the image
    #[arg(long, default_value_t = 256)]
    pub total_lines: u32,

    /// Number of check lines interleaved with the normal lines
    #[arg(long, default_value_t = 64)]
    pub check_lines: u32,

    /// Number of distinct source lines the check lines re-read
    #[arg(long, default_value_t = 4)]
    pub unique_check_lines: u32,

    /// Total exposure time of the normal lines in seconds
    #[arg(long, default_value_t = 1.0)]
    pub exposure_time: f64,
}

impl ScheduleArgs {
    pub fn to_config(&self) -> ScheduleConfig {
        ScheduleConfig {
            total_lines: self.total_lines,
            check_line_count: self.check_lines,
            unique_check_lines: self.unique_check_lines,
            exposure_time: self.exposure_time,
        }
    }
}

/// Normal and check line/time tables written by `checktable`
#[derive(Args, Debug, Clone)]
pub struct ScheduleTableArgs {
    /// Normal-line time table (lineNumber,exposureTime)
    #[arg(long)]
    pub normal_table: PathBuf,

    /// Check-line time table (lineNumber,exposureTime)
    #[arg(long)]
    pub check_table: PathBuf,
}

/// Resampling options shared by the forward and inverse passes
#[derive(Args, Debug, Clone)]
pub struct ResampleArgs {
    /// Interpolation kernel
    #[arg(long, value_enum, default_value_t = InterpolationArg::Cubic)]
    pub interpolation: InterpolationArg,
}

impl ResampleArgs {
    pub fn interpolation(&self) -> Interpolation {
        self.interpolation.into()
    }
}

/// Model fitting options
#[derive(Args, Debug, Clone)]
pub struct FitArgs {
    /// Model family to fit
    #[arg(long, value_enum, default_value_t = ModelKind::Poly)]
    pub model: ModelKind,

    /// Polynomial degree
    #[arg(long, default_value_t = 5)]
    pub degree: usize,

    /// Spline order (4 is cubic)
    #[arg(long, default_value_t = 4)]
    pub spline_order: usize,

    /// Number of spline coefficients
    #[arg(long, default_value_t = 12)]
    pub spline_coefficients: usize,

    /// Minimum goodness of fit for a residual to be used
    #[arg(long, default_value_t = 0.7)]
    pub tolerance: f64,

    /// End of the polynomial time domain in seconds (default: latest residual time)
    #[arg(long)]
    pub max_time: Option<f64>,
}

/// Offsets report path: `explicit` when given, else `<output stem>_offsets.csv`
/// next to `output`.
pub fn offsets_path(output: &Path, explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    output.with_file_name(format!("{stem}_offsets.csv"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        schedule: ScheduleArgs,

        #[command(flatten)]
        resample: ResampleArgs,

        #[command(flatten)]
        fit: FitArgs,
    }

    #[test]
    fn test_defaults() {
        let cli = TestCli::try_parse_from(["test"]).unwrap();
        assert_eq!(cli.resample.interpolation(), Interpolation::CubicConvolution);
        assert_eq!(cli.fit.model, ModelKind::Poly);
        assert_eq!(cli.fit.degree, 5);
        assert_eq!(cli.fit.max_time, None);
        assert_eq!(cli.schedule.to_config().check_line_count, 64);
        assert!(cli.schedule.to_config().validate().is_ok());
    }

    #[test]
    fn test_value_enums() {
        let cli = TestCli::try_parse_from([
            "test",
            "--interpolation",
            "nearest",
            "--model",
            "spline",
            "--max-time",
            "2.5",
        ])
        .unwrap();
        assert_eq!(cli.resample.interpolation(), Interpolation::Nearest);
        assert_eq!(cli.fit.model, ModelKind::Spline);
        assert_eq!(cli.fit.max_time, Some(2.5));

        assert!(TestCli::try_parse_from(["test", "--model", "cubic"]).is_err());
    }

    #[test]
    fn test_offsets_path() {
        let output = Path::new("/data/run/jittered.png");
        assert_eq!(
            offsets_path(output, None),
            PathBuf::from("/data/run/jittered_offsets.csv")
        );
        assert_eq!(
            offsets_path(output, Some(Path::new("norm.csv"))),
            PathBuf::from("norm.csv")
        );
    }
}
