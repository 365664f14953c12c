//! Closed-form jitter as a sum of phase-shifted cosines

use std::f64::consts::PI;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::Offset;
use crate::tables::{create_writer, parse_field, read_rows, TableError};

/// One harmonic of the jitter signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarmonicTerm {
    /// Frequency in Hz
    pub frequency: f64,
    /// Sample-axis amplitude in pixels
    pub amp_x: f64,
    /// Sample-axis phase in radians
    pub phase_x: f64,
    /// Line-axis amplitude in pixels
    pub amp_y: f64,
    /// Line-axis phase in radians
    pub phase_y: f64,
}

/// Sum of harmonic terms.
///
/// ```text
/// dSample(t) = Σ amp_x · cos(2π f t - phase_x)
/// dLine(t)   = Σ amp_y · cos(2π f t - phase_y)
/// ```
///
/// A model with no terms evaluates to a zero offset everywhere.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarmonicModel {
    terms: Vec<HarmonicTerm>,
}

impl HarmonicModel {
    /// CSV header written by [`HarmonicModel::write_csv`]
    pub const HEADER: [&'static str; 5] = ["frequency", "ampX", "phaseX", "ampY", "phaseY"];

    pub fn new(terms: Vec<HarmonicTerm>) -> Self {
        Self { terms }
    }

    pub fn terms(&self) -> &[HarmonicTerm] {
        &self.terms
    }

    pub fn evaluate(&self, time: f64) -> Offset {
        self.terms
            .iter()
            .fold(Offset::default(), |acc, term| {
                let angle = 2.0 * PI * term.frequency * time;
                Offset {
                    d_sample: acc.d_sample + term.amp_x * (angle - term.phase_x).cos(),
                    d_line: acc.d_line + term.amp_y * (angle - term.phase_y).cos(),
                }
            })
    }

    /// Load a `frequency,ampX,phaseX,ampY,phaseY` coefficient table.
    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
        let path = path.as_ref();
        let rows = read_rows(path, 5)?;

        let terms = rows
            .iter()
            .map(|row| {
                Ok(HarmonicTerm {
                    frequency: parse_field(path, row, 0)?,
                    amp_x: parse_field(path, row, 1)?,
                    phase_x: parse_field(path, row, 2)?,
                    amp_y: parse_field(path, row, 3)?,
                    phase_y: parse_field(path, row, 4)?,
                })
            })
            .collect::<Result<Vec<_>, TableError>>()?;

        if terms.is_empty() {
            warn!(
                "{}: harmonic table has no rows, jitter will be zero",
                path.display()
            );
        } else {
            debug!("Loaded {} harmonic terms from {}", terms.len(), path.display());
        }
        Ok(Self { terms })
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), TableError> {
        let mut writer = create_writer(path.as_ref(), &Self::HEADER)?;
        for term in &self.terms {
            writer.write_record(&[
                term.frequency.to_string(),
                term.amp_x.to_string(),
                term.phase_x.to_string(),
                term.amp_y.to_string(),
                term.phase_y.to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn term(frequency: f64, amp_x: f64, phase_x: f64, amp_y: f64, phase_y: f64) -> HarmonicTerm {
        HarmonicTerm {
            frequency,
            amp_x,
            phase_x,
            amp_y,
            phase_y,
        }
    }

    #[test]
    fn test_single_term_at_zero() {
        let model = HarmonicModel::new(vec![term(1.0, 2.0, 0.0, 3.0, 0.0)]);
        assert_eq!(model.evaluate(0.0), Offset::new(2.0, 3.0));
    }

    #[test]
    fn test_empty_model_is_identity() {
        let model = HarmonicModel::default();
        assert_eq!(model.evaluate(0.0), Offset::default());
        assert_eq!(model.evaluate(12.5), Offset::default());
    }

    #[test]
    fn test_phase_and_superposition() {
        // Quarter-period phase turns cosine into sine
        let model = HarmonicModel::new(vec![
            term(2.0, 1.0, PI / 2.0, 0.0, 0.0),
            term(5.0, 0.0, 0.0, 0.5, PI),
        ]);
        let t = 0.03;
        let offset = model.evaluate(t);
        assert_relative_eq!(offset.d_sample, (2.0 * PI * 2.0 * t).sin(), epsilon = 1e-12);
        assert_relative_eq!(offset.d_line, -0.5 * (2.0 * PI * 5.0 * t).cos(), epsilon = 1e-12);
    }

    #[test]
    fn test_read_csv_with_header_and_comments() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "frequency,ampX,phaseX,ampY,phaseY").unwrap();
        writeln!(file, "# dominant reaction wheel harmonic").unwrap();
        writeln!(file, "1,2,0,3,0").unwrap();
        writeln!(file, "10.5, 0.1, 0.2, 0.3, 0.4").unwrap();
        file.flush().unwrap();

        let model = HarmonicModel::read_csv(file.path()).unwrap();
        assert_eq!(model.terms().len(), 2);
        assert_eq!(model.terms()[1], term(10.5, 0.1, 0.2, 0.3, 0.4));
    }

    #[test]
    fn test_read_empty_table() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "frequency,ampX,phaseX,ampY,phaseY").unwrap();
        file.flush().unwrap();

        let model = HarmonicModel::read_csv(file.path()).unwrap();
        assert!(model.terms().is_empty());
        assert_eq!(model.evaluate(1.0), Offset::default());
    }

    #[test]
    fn test_write_then_read() {
        let model = HarmonicModel::new(vec![term(0.7, 1.5, 0.25, -0.5, 2.0)]);
        let file = NamedTempFile::new().unwrap();
        model.write_csv(file.path()).unwrap();
        assert_eq!(HarmonicModel::read_csv(file.path()).unwrap(), model);
    }
}
