//! Fit continuous jitter models to recovered check-line residuals.
//!
//! A residual record observes the difference of the jitter at two times, the
//! read time of the normal line (`matched_time`) and of the check line
//! (`check_time`). Both fitters therefore regress each axis on the difference
//! of their basis evaluated at the two times:
//!
//! ```text
//! delta = Σ c_k · (φ_k(t_matched) - φ_k(t_check))
//! ```
//!
//! A constant jitter cancels in every observation, so neither model carries
//! one: the polynomial basis starts at the first power and the first spline
//! coefficient is fixed at zero.

use std::path::Path;

use jitter_math::{least_squares, rms, weighted_least_squares, BSplineBasis, BasisError, SolveError};
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

use crate::model::polynomial::descending_powers;
use crate::model::{InvalidTimeDomain, JitterModel, PolynomialModel, SplineModel, TimeDomain};
use crate::recovery::ResidualRecord;
use crate::tables::{create_writer, TableError};

/// Margin added around the record times when placing spline breakpoints
const SPLINE_TIME_MARGIN: f64 = 1e-6;

#[derive(Error, Debug)]
pub enum FitError {
    #[error("polynomial degree must be at least 1")]
    ZeroDegree,

    #[error("invalid spline basis: {0}")]
    Basis(#[from] BasisError),

    #[error("{retained} usable records for {unknowns} unknowns")]
    TooFewRecords { retained: usize, unknowns: usize },

    #[error(transparent)]
    Domain(#[from] InvalidTimeDomain),

    #[error("least-squares solve failed: {0}")]
    Solve(#[from] SolveError),
}

/// Record selection and time domain for a fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitConfig {
    /// Minimum goodness of fit for a record to take part
    pub tolerance: f64,
    /// End of the polynomial time domain; the latest retained time when None
    pub max_time: Option<f64>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.7,
            max_time: None,
        }
    }
}

/// Fitted vs observed delta for one record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitResidual {
    pub check_time: f64,
    pub matched_time: f64,
    pub delta_line: f64,
    pub fitted_line: f64,
    pub delta_sample: f64,
    pub fitted_sample: f64,
}

impl FitResidual {
    pub const HEADER: [&'static str; 8] = [
        "checkTime",
        "matchedTime",
        "deltaLine",
        "fittedLine",
        "lineResidual",
        "deltaSample",
        "fittedSample",
        "sampleResidual",
    ];

    pub fn line_residual(&self) -> f64 {
        self.delta_line - self.fitted_line
    }

    pub fn sample_residual(&self) -> f64 {
        self.delta_sample - self.fitted_sample
    }
}

/// A fitted model with its per-record residuals
#[derive(Debug, Clone)]
pub struct Fit<M> {
    pub model: M,
    pub residuals: Vec<FitResidual>,
}

pub type PolynomialFit = Fit<PolynomialModel>;
pub type SplineFit = Fit<SplineModel>;

impl<M> Fit<M> {
    pub fn rms_line_residual(&self) -> f64 {
        rms(&self.residuals.iter().map(FitResidual::line_residual).collect::<Vec<_>>())
    }

    pub fn rms_sample_residual(&self) -> f64 {
        rms(&self.residuals.iter().map(FitResidual::sample_residual).collect::<Vec<_>>())
    }
}

impl<M: Clone + Into<JitterModel>> Fit<M> {
    /// The fitted model as a [`JitterModel`]
    pub fn jitter_model(&self) -> JitterModel {
        self.model.clone().into()
    }
}

/// Records that registered successfully with at least `tolerance` goodness.
pub fn filter_records(records: &[ResidualRecord], tolerance: f64) -> Vec<ResidualRecord> {
    let retained: Vec<ResidualRecord> = records
        .iter()
        .filter(|r| r.success && r.goodness_of_fit >= tolerance)
        .copied()
        .collect();
    debug!(
        "Retained {} of {} records at tolerance {tolerance}",
        retained.len(),
        records.len()
    );
    retained
}

/// Fit a constant-free polynomial of `degree` over `[0, max_time]`.
pub fn fit_polynomial(
    records: &[ResidualRecord],
    degree: usize,
    config: &FitConfig,
) -> Result<PolynomialFit, FitError> {
    if degree == 0 {
        return Err(FitError::ZeroDegree);
    }

    let retained = filter_records(records, config.tolerance);
    if retained.len() < degree {
        return Err(FitError::TooFewRecords {
            retained: retained.len(),
            unknowns: degree,
        });
    }

    let max_time = config.max_time.unwrap_or_else(|| latest_time(&retained));
    let domain = TimeDomain::new(0.0, max_time)?;

    let mut design = DMatrix::zeros(retained.len(), degree);
    for (i, record) in retained.iter().enumerate() {
        let matched = descending_powers(domain.normalize(record.matched_time), degree);
        let check = descending_powers(domain.normalize(record.check_time), degree);
        for j in 0..degree {
            design[(i, j)] = matched[j] - check[j];
        }
    }

    let (line_delta, sample_delta) = observations(&retained);
    let line = least_squares(&design, &line_delta)?;
    let sample = least_squares(&design, &sample_delta)?;
    debug!(
        "Polynomial solve RMS residual line {:.4}, sample {:.4}",
        line.rms_residual(),
        sample.rms_residual()
    );

    let model = PolynomialModel::new(
        line.coefficients.iter().copied().collect(),
        sample.coefficients.iter().copied().collect(),
        domain,
    );
    let fit = Fit {
        residuals: residuals(&retained, &model.clone().into()),
        model,
    };
    info!(
        "Degree {degree} polynomial fit over [0, {max_time}] from {} records: RMS residual line {:.4}, sample {:.4}",
        retained.len(),
        fit.rms_line_residual(),
        fit.rms_sample_residual()
    );
    Ok(fit)
}

/// Fit a B-spline of `order` with `coefficients` basis functions.
///
/// Breakpoints are spread uniformly over the retained record times, so
/// `coefficients + 2 - order` must be at least 2.
pub fn fit_spline(
    records: &[ResidualRecord],
    order: usize,
    coefficients: usize,
    config: &FitConfig,
) -> Result<SplineFit, FitError> {
    if order == 0 {
        return Err(BasisError::InvalidOrder(order).into());
    }
    let breakpoints = coefficients as i64 + 2 - order as i64;
    if breakpoints < 2 {
        return Err(BasisError::TooFewBreakpoints(breakpoints).into());
    }

    let retained = filter_records(records, config.tolerance);
    let unknowns = coefficients - 1;
    if retained.is_empty() || retained.len() < unknowns {
        return Err(FitError::TooFewRecords {
            retained: retained.len(),
            unknowns,
        });
    }

    let (min_time, max_time) = retained
        .iter()
        .flat_map(|r| [r.check_time, r.matched_time])
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| (lo.min(t), hi.max(t)));
    let basis = BSplineBasis::uniform(
        order,
        breakpoints,
        min_time - SPLINE_TIME_MARGIN,
        max_time + SPLINE_TIME_MARGIN,
    )?;

    // First coefficient is pinned to zero, its column is left out
    let mut design = DMatrix::zeros(retained.len(), unknowns);
    for (i, record) in retained.iter().enumerate() {
        let matched = basis.evaluate(record.matched_time);
        let check = basis.evaluate(record.check_time);
        for j in 0..unknowns {
            design[(i, j)] = matched[j + 1] - check[j + 1];
        }
    }

    let (line_delta, sample_delta) = observations(&retained);
    let weights = DVector::from_element(retained.len(), 1.0);
    let line = weighted_least_squares(&design, &line_delta, &weights)?;
    let sample = weighted_least_squares(&design, &sample_delta, &weights)?;
    debug!(
        "Spline solve RMS residual line {:.4}, sample {:.4}",
        line.rms_residual(),
        sample.rms_residual()
    );

    let pinned = |solved: &DVector<f64>| -> Vec<f64> {
        std::iter::once(0.0).chain(solved.iter().copied()).collect()
    };
    let model = SplineModel::new(basis, pinned(&line.coefficients), pinned(&sample.coefficients));
    let fit = Fit {
        residuals: residuals(&retained, &model.clone().into()),
        model,
    };
    info!(
        "Order {order} spline fit with {coefficients} coefficients over [{min_time}, {max_time}] from {} records: RMS residual line {:.4}, sample {:.4}",
        retained.len(),
        fit.rms_line_residual(),
        fit.rms_sample_residual()
    );
    Ok(fit)
}

/// Write the per-record fit residual report.
pub fn write_fit_residuals<P: AsRef<Path>>(path: P, residuals: &[FitResidual]) -> Result<(), TableError> {
    let mut writer = create_writer(path.as_ref(), &FitResidual::HEADER)?;
    for r in residuals {
        writer.write_record(&[
            r.check_time.to_string(),
            r.matched_time.to_string(),
            r.delta_line.to_string(),
            r.fitted_line.to_string(),
            r.line_residual().to_string(),
            r.delta_sample.to_string(),
            r.fitted_sample.to_string(),
            r.sample_residual().to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn latest_time(records: &[ResidualRecord]) -> f64 {
    let latest = records
        .iter()
        .flat_map(|r| [r.check_time, r.matched_time])
        .fold(f64::NEG_INFINITY, f64::max);
    if !latest.is_finite() {
        warn!("No finite record times to derive the time domain from");
    }
    latest
}

fn observations(records: &[ResidualRecord]) -> (DVector<f64>, DVector<f64>) {
    (
        DVector::from_iterator(records.len(), records.iter().map(|r| r.delta_line)),
        DVector::from_iterator(records.len(), records.iter().map(|r| r.delta_sample)),
    )
}

fn residuals(records: &[ResidualRecord], model: &JitterModel) -> Vec<FitResidual> {
    records
        .iter()
        .map(|r| {
            let matched = model.evaluate(r.matched_time);
            let check = model.evaluate(r.check_time);
            FitResidual {
                check_time: r.check_time,
                matched_time: r.matched_time,
                delta_line: r.delta_line,
                fitted_line: matched.d_line - check.d_line,
                delta_sample: r.delta_sample,
                fitted_sample: matched.d_sample - check.d_sample,
            }
        })
        .collect()
}
