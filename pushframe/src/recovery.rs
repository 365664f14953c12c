//! Jitter recovery by correlating check lines against the jittered image.
//!
//! Each check line re-reads a known source line at a different time than the
//! normal readout of that line. Registering the check line against the
//! jittered image measures how far the two reads disagree, which is the
//! difference of the jitter at the two times:
//!
//! ```text
//! delta = nominal - matched = J(t_matched) - J(t_check)
//! ```

use std::path::Path;

use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::raster::Raster;
use crate::registration::{Chip, Correlator, RegistrationConfig};
use crate::tables::{create_writer, parse_field, parse_flag, read_rows, LineTimeTable, TableError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecoveryError {
    #[error("image scale must be positive and finite, got {0}")]
    InvalidScale(f64),
}

/// One attempted check-line registration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualRecord {
    /// Source line the check line re-reads
    pub check_line: u32,
    pub check_sample: f64,
    /// Read time of the check line
    pub check_time: f64,
    pub matched_line: f64,
    pub matched_sample: f64,
    /// Read time of the normal line matching `check_line`
    pub matched_time: f64,
    pub delta_line: f64,
    pub delta_sample: f64,
    pub goodness_of_fit: f64,
    pub success: bool,
}

impl ResidualRecord {
    /// CSV header of the residual report
    pub const HEADER: [&'static str; 10] = [
        "checkLine",
        "checkSample",
        "checkTime",
        "matchedLine",
        "matchedSample",
        "matchedTime",
        "deltaLine",
        "deltaSample",
        "goodnessOfFit",
        "success",
    ];
}

/// Summary of a recovery run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStatistics {
    pub attempted: usize,
    pub succeeded: usize,
    /// Mean goodness of fit over successful registrations
    pub mean_goodness_of_fit: Option<f64>,
    /// RMS line delta over successful registrations
    pub rms_delta_line: Option<f64>,
    /// RMS sample delta over successful registrations
    pub rms_delta_sample: Option<f64>,
}

impl RecoveryStatistics {
    pub fn from_records(records: &[ResidualRecord]) -> Self {
        let good: Vec<&ResidualRecord> = records.iter().filter(|r| r.success).collect();
        let summarize = |f: fn(&[f64]) -> f64, value: fn(&ResidualRecord) -> f64| {
            if good.is_empty() {
                None
            } else {
                Some(f(&good.iter().map(|r| value(r)).collect::<Vec<_>>()))
            }
        };
        Self {
            attempted: records.len(),
            succeeded: good.len(),
            mean_goodness_of_fit: summarize(jitter_math::mean, |r| r.goodness_of_fit),
            rms_delta_line: summarize(jitter_math::rms, |r| r.delta_line),
            rms_delta_sample: summarize(jitter_math::rms, |r| r.delta_sample),
        }
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Load from JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, std::io::Error> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// Register every check line of `check` against `jittered`.
///
/// # Arguments
/// * `jittered` - Image read with normal lines only (first band is used)
/// * `check` - Image of check lines, one line per check-table row
/// * `check_table` - Check-line schedule, giving source line and read time
/// * `normal_table` - Normal-line schedule, row `n - 1` holding line `n`
/// * `scale` - Line/sample scale of `jittered` relative to the tables
/// * `correlator` - Registration engine
/// * `config` - Pattern and search chip sizes
///
/// # Returns
/// One record per check line in check-table order. The run stops at the
/// first check line whose source line has no normal-table row.
///
/// # Errors
/// [`RecoveryError::InvalidScale`] unless `scale` is positive and finite.
pub fn recover_jitter(
    jittered: &Raster,
    check: &Raster,
    check_table: &LineTimeTable,
    normal_table: &LineTimeTable,
    scale: f64,
    correlator: &dyn Correlator,
    config: &RegistrationConfig,
) -> Result<Vec<ResidualRecord>, RecoveryError> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(RecoveryError::InvalidScale(scale));
    }

    let sample = (jittered.samples() as f64 / 2.0 + 0.5).floor();
    let rows = check.lines().min(check_table.len());

    // Each attempt needs the matching normal line's read time
    let limit = (0..rows)
        .position(|k| {
            let line = check_table.entries()[k].line_number as usize;
            line == 0 || normal_table.get(line - 1).is_none()
        })
        .unwrap_or(rows);
    if limit < rows {
        warn!(
            "Check line {} has no normal line time, stopping after {limit} of {rows} check lines",
            check_table.entries()[limit].line_number
        );
    }

    let jittered_band = jittered.band(0).view();
    let check_band = check.band(0).view();

    let records: Vec<ResidualRecord> = (0..limit)
        .into_par_iter()
        .map(|k| {
            let entry = check_table.entries()[k];
            let check_line = entry.line_number;
            let matched_time = normal_table.entries()[check_line as usize - 1].exposure_time;

            let pattern = Chip::load(
                &check_band,
                sample,
                (k + 1) as f64,
                config.pattern_samples,
                config.pattern_lines,
            );
            let search = Chip::load(
                &jittered_band,
                sample,
                check_line as f64 * scale,
                config.search_samples,
                config.search_lines,
            );
            let result = correlator.register(&pattern, &search);

            let check_sample = sample / scale;
            let matched_line = result.line / scale;
            let matched_sample = result.sample / scale;
            ResidualRecord {
                check_line,
                check_sample,
                check_time: entry.exposure_time,
                matched_line,
                matched_sample,
                matched_time,
                delta_line: check_line as f64 - matched_line,
                delta_sample: check_sample - matched_sample,
                goodness_of_fit: result.goodness_of_fit,
                success: result.success,
            }
        })
        .collect();

    let stats = RecoveryStatistics::from_records(&records);
    info!(
        "Registered {} of {} check lines, mean goodness {:.4}",
        stats.succeeded,
        stats.attempted,
        stats.mean_goodness_of_fit.unwrap_or(0.0)
    );
    Ok(records)
}

/// Write the residual report.
pub fn write_residuals<P: AsRef<Path>>(path: P, records: &[ResidualRecord]) -> Result<(), TableError> {
    let mut writer = create_writer(path.as_ref(), &ResidualRecord::HEADER)?;
    for r in records {
        writer.write_record(&[
            r.check_line.to_string(),
            r.check_sample.to_string(),
            r.check_time.to_string(),
            r.matched_line.to_string(),
            r.matched_sample.to_string(),
            r.matched_time.to_string(),
            r.delta_line.to_string(),
            r.delta_sample.to_string(),
            r.goodness_of_fit.to_string(),
            u8::from(r.success).to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a residual report.
pub fn read_residuals<P: AsRef<Path>>(path: P) -> Result<Vec<ResidualRecord>, TableError> {
    let path = path.as_ref();
    read_rows(path, ResidualRecord::HEADER.len())?
        .iter()
        .map(|row| {
            Ok(ResidualRecord {
                check_line: parse_field(path, row, 0)?,
                check_sample: parse_field(path, row, 1)?,
                check_time: parse_field(path, row, 2)?,
                matched_line: parse_field(path, row, 3)?,
                matched_sample: parse_field(path, row, 4)?,
                matched_time: parse_field(path, row, 5)?,
                delta_line: parse_field(path, row, 6)?,
                delta_sample: parse_field(path, row, 7)?,
                goodness_of_fit: parse_field(path, row, 8)?,
                success: parse_flag(path, row, 9)?,
            })
        })
        .collect()
}
