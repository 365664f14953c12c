//! Polynomial jitter model over normalized time.
//!
//! Each axis is a constant-free power series in `t' = domain.normalize(t)`,
//! coefficients ordered highest power first:
//!
//! ```text
//! offset(t) = c[0]·t'^n + c[1]·t'^(n-1) + ... + c[n-1]·t'
//! ```
//!
//! The constant term is omitted because correlation only observes the
//! difference of the jitter at two times, which cancels any constant.

use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use super::{InvalidModel, Offset, TimeDomain};
use crate::tables::{create_writer, parse_field, read_rows, TableError};

/// Header of the two-column coefficient table
pub const COEFFICIENT_HEADER: [&str; 2] = ["lineCoefficient", "sampleCoefficient"];

/// Powers `x^degree, x^(degree-1), ..., x` in that order.
pub fn descending_powers(x: f64, degree: usize) -> Vec<f64> {
    let mut powers = vec![0.0; degree];
    let mut value = 1.0;
    for slot in powers.iter_mut().rev() {
        value *= x;
        *slot = value;
    }
    powers
}

/// Write paired line/sample coefficients as a `lineCoefficient,sampleCoefficient` table.
pub(crate) fn write_coefficient_table(
    path: &Path,
    line: &[f64],
    sample: &[f64],
) -> Result<(), TableError> {
    let mut writer = create_writer(path, &COEFFICIENT_HEADER)?;
    for (l, s) in line.iter().zip(sample) {
        writer.write_record(&[l.to_string(), s.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPolynomialModel")]
pub struct PolynomialModel {
    line_coefficients: Vec<f64>,
    sample_coefficients: Vec<f64>,
    domain: TimeDomain,
}

impl PolynomialModel {
    /// # Panics
    /// If the two coefficient vectors differ in length.
    pub fn new(line_coefficients: Vec<f64>, sample_coefficients: Vec<f64>, domain: TimeDomain) -> Self {
        assert_eq!(
            line_coefficients.len(),
            sample_coefficients.len(),
            "Line and sample coefficient counts must match"
        );
        Self {
            line_coefficients,
            sample_coefficients,
            domain,
        }
    }

    /// Like [`Self::new`], returning an error for mismatched coefficient counts.
    pub fn try_new(
        line_coefficients: Vec<f64>,
        sample_coefficients: Vec<f64>,
        domain: TimeDomain,
    ) -> Result<Self, InvalidModel> {
        if line_coefficients.len() != sample_coefficients.len() {
            return Err(InvalidModel::CoefficientMismatch {
                line: line_coefficients.len(),
                sample: sample_coefficients.len(),
            });
        }
        Ok(Self {
            line_coefficients,
            sample_coefficients,
            domain,
        })
    }

    /// Highest power of the series
    pub fn degree(&self) -> usize {
        self.line_coefficients.len()
    }

    pub fn line_coefficients(&self) -> &[f64] {
        &self.line_coefficients
    }

    pub fn sample_coefficients(&self) -> &[f64] {
        &self.sample_coefficients
    }

    pub fn domain(&self) -> TimeDomain {
        self.domain
    }

    pub fn evaluate(&self, time: f64) -> Offset {
        let t = self.domain.normalize(time);
        Offset {
            d_sample: horner(&self.sample_coefficients, t),
            d_line: horner(&self.line_coefficients, t),
        }
    }

    /// Read a coefficient table; the table does not carry the time domain.
    ///
    /// A table without rows is an error since it cannot describe a fit.
    pub fn read_coefficients<P: AsRef<Path>>(path: P, domain: TimeDomain) -> Result<Self, TableError> {
        let path = path.as_ref();
        let rows = read_rows(path, 2)?;
        if rows.is_empty() {
            return Err(TableError::Empty {
                path: path.display().to_string(),
            });
        }

        let mut line = Vec::with_capacity(rows.len());
        let mut sample = Vec::with_capacity(rows.len());
        for row in &rows {
            line.push(parse_field(path, row, 0)?);
            sample.push(parse_field(path, row, 1)?);
        }
        debug!(
            "Read degree {} polynomial from {} over [{}, {}]",
            line.len(),
            path.display(),
            domain.min(),
            domain.max()
        );
        Ok(Self::new(line, sample, domain))
    }

    pub fn write_coefficients<P: AsRef<Path>>(&self, path: P) -> Result<(), TableError> {
        write_coefficient_table(
            path.as_ref(),
            &self.line_coefficients,
            &self.sample_coefficients,
        )
    }
}

#[derive(Deserialize)]
struct RawPolynomialModel {
    line_coefficients: Vec<f64>,
    sample_coefficients: Vec<f64>,
    domain: TimeDomain,
}

impl TryFrom<RawPolynomialModel> for PolynomialModel {
    type Error = InvalidModel;

    fn try_from(raw: RawPolynomialModel) -> Result<Self, Self::Error> {
        Self::try_new(raw.line_coefficients, raw.sample_coefficients, raw.domain)
    }
}

/// Constant-free power series, highest power first
fn horner(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().fold(0.0, |acc, c| (acc + c) * x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_descending_powers() {
        assert_eq!(descending_powers(2.0, 3), vec![8.0, 4.0, 2.0]);
        assert!(descending_powers(2.0, 0).is_empty());
    }

    #[test]
    fn test_evaluate_highest_power_first() {
        let domain = TimeDomain::new(0.0, 2.0).unwrap();
        let model = PolynomialModel::new(vec![1.0, -2.0, 0.5], vec![0.0, 3.0, 0.0], domain);

        // t = 1.5 normalizes to 0.5
        let offset = model.evaluate(1.5);
        assert_relative_eq!(offset.d_line, 0.125 - 0.5 + 0.25, epsilon = 1e-15);
        assert_relative_eq!(offset.d_sample, 0.75, epsilon = 1e-15);

        // No constant term: the midpoint of the domain maps to zero
        assert_eq!(model.evaluate(1.0), Offset::default());
    }

    #[test]
    #[should_panic(expected = "Line and sample coefficient counts must match")]
    fn test_mismatched_coefficients() {
        let domain = TimeDomain::new(0.0, 1.0).unwrap();
        PolynomialModel::new(vec![1.0], vec![1.0, 2.0], domain);
    }

    #[test]
    fn test_try_new_reports_mismatch() {
        let domain = TimeDomain::new(0.0, 1.0).unwrap();
        assert_eq!(
            PolynomialModel::try_new(vec![1.0, 2.0, 3.0], vec![], domain),
            Err(InvalidModel::CoefficientMismatch { line: 3, sample: 0 })
        );
        assert!(PolynomialModel::try_new(vec![1.0], vec![2.0], domain).is_ok());
    }

    #[test]
    fn test_coefficient_table_round_trip() {
        let domain = TimeDomain::new(0.0, 1.045).unwrap();
        let model = PolynomialModel::new(vec![0.25, -1.5, 3.0], vec![1e-3, 0.0, -7.125], domain);

        let file = NamedTempFile::new().unwrap();
        model.write_coefficients(file.path()).unwrap();
        let contents = std::fs::read_to_string(file.path()).unwrap();
        assert!(contents.starts_with("lineCoefficient,sampleCoefficient"));

        let read = PolynomialModel::read_coefficients(file.path(), domain).unwrap();
        assert_eq!(read, model);
    }

    #[test]
    fn test_empty_coefficient_table_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "lineCoefficient,sampleCoefficient").unwrap();
        file.flush().unwrap();

        let domain = TimeDomain::new(0.0, 1.0).unwrap();
        assert!(matches!(
            PolynomialModel::read_coefficients(file.path(), domain),
            Err(TableError::Empty { .. })
        ));
    }
}
