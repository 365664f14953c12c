//! B-spline jitter model

use std::path::Path;

use jitter_math::BSplineBasis;
use serde::{Deserialize, Serialize};

use super::polynomial::write_coefficient_table;
use super::{InvalidModel, Offset};
use crate::tables::TableError;

/// Per-axis spline coefficients over a shared clamped basis.
///
/// Times outside the knot range evaluate at the nearest end of the range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSplineModel")]
pub struct SplineModel {
    basis: BSplineBasis,
    line_coefficients: Vec<f64>,
    sample_coefficients: Vec<f64>,
}

impl SplineModel {
    /// # Panics
    /// If either coefficient vector does not match the basis size.
    pub fn new(basis: BSplineBasis, line_coefficients: Vec<f64>, sample_coefficients: Vec<f64>) -> Self {
        let n = basis.coefficient_count();
        assert!(
            line_coefficients.len() == n && sample_coefficients.len() == n,
            "Spline coefficient count must match basis size"
        );
        Self {
            basis,
            line_coefficients,
            sample_coefficients,
        }
    }

    /// Like [`Self::new`], returning an error when a coefficient vector does
    /// not match the basis size.
    pub fn try_new(
        basis: BSplineBasis,
        line_coefficients: Vec<f64>,
        sample_coefficients: Vec<f64>,
    ) -> Result<Self, InvalidModel> {
        let expected = basis.coefficient_count();
        if line_coefficients.len() != expected || sample_coefficients.len() != expected {
            return Err(InvalidModel::SplineSize {
                expected,
                line: line_coefficients.len(),
                sample: sample_coefficients.len(),
            });
        }
        Ok(Self {
            basis,
            line_coefficients,
            sample_coefficients,
        })
    }

    pub fn basis(&self) -> &BSplineBasis {
        &self.basis
    }

    pub fn line_coefficients(&self) -> &[f64] {
        &self.line_coefficients
    }

    pub fn sample_coefficients(&self) -> &[f64] {
        &self.sample_coefficients
    }

    pub fn evaluate(&self, time: f64) -> Offset {
        Offset {
            d_sample: self.basis.combine(&self.sample_coefficients, time),
            d_line: self.basis.combine(&self.line_coefficients, time),
        }
    }

    /// Write the coefficients as a `lineCoefficient,sampleCoefficient` table.
    ///
    /// The knots are not part of the table; persist the whole model as JSON to
    /// reuse it for correction.
    pub fn write_coefficients<P: AsRef<Path>>(&self, path: P) -> Result<(), TableError> {
        write_coefficient_table(
            path.as_ref(),
            &self.line_coefficients,
            &self.sample_coefficients,
        )
    }
}

#[derive(Deserialize)]
struct RawSplineModel {
    basis: BSplineBasis,
    line_coefficients: Vec<f64>,
    sample_coefficients: Vec<f64>,
}

impl TryFrom<RawSplineModel> for SplineModel {
    type Error = InvalidModel;

    fn try_from(raw: RawSplineModel) -> Result<Self, Self::Error> {
        Self::try_new(raw.basis, raw.line_coefficients, raw.sample_coefficients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_spline_interpolates_breakpoints() {
        let basis = BSplineBasis::uniform(2, 3, 0.0, 1.0).unwrap();
        let model = SplineModel::new(basis, vec![0.0, 1.0, 0.0], vec![2.0, 2.0, 4.0]);

        let mid = model.evaluate(0.5);
        assert_relative_eq!(mid.d_line, 1.0, epsilon = 1e-12);
        assert_relative_eq!(mid.d_sample, 2.0, epsilon = 1e-12);

        let quarter = model.evaluate(0.75);
        assert_relative_eq!(quarter.d_line, 0.5, epsilon = 1e-12);
        assert_relative_eq!(quarter.d_sample, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_clamped_outside_knots() {
        let basis = BSplineBasis::uniform(4, 4, 0.0, 3.0).unwrap();
        let n = basis.coefficient_count();
        let line: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let model = SplineModel::new(basis, line, vec![0.0; n]);

        assert_eq!(model.evaluate(-1.0), model.evaluate(0.0));
        assert_eq!(model.evaluate(4.0), model.evaluate(3.0));
        assert_relative_eq!(model.evaluate(3.0).d_line, (n - 1) as f64, epsilon = 1e-12);
    }

    #[test]
    fn test_try_new_reports_size() {
        let basis = BSplineBasis::uniform(4, 4, 0.0, 1.0).unwrap();
        assert_eq!(
            SplineModel::try_new(basis.clone(), vec![1.0; 6], vec![1.0; 3]),
            Err(InvalidModel::SplineSize {
                expected: 6,
                line: 6,
                sample: 3
            })
        );
        assert!(SplineModel::try_new(basis, vec![1.0; 6], vec![1.0; 6]).is_ok());
    }

    #[test]
    #[should_panic(expected = "Spline coefficient count must match basis size")]
    fn test_wrong_coefficient_count() {
        let basis = BSplineBasis::uniform(4, 4, 0.0, 1.0).unwrap();
        SplineModel::new(basis, vec![1.0; 3], vec![1.0; 3]);
    }
}
