//! Exposure-time schedule for a push-frame readout with interleaved check lines.
//!
//! A push-frame sensor reads `total_lines` normal lines in order. Sparse check
//! lines are read in between, each re-reading one of a small pool of source
//! lines so the same scene content is sampled at several different times. Every
//! check line consumes one line period, delaying all later normal lines.
//!
//! The schedule always starts and ends with a check line and contains exactly
//! `check_line_count` check events.

use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

use crate::tables::{LineTimeEntry, LineTimeTable, TableError};

/// Errors raised while validating or writing a schedule
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("number of lines must be greater than 0")]
    NoLines,

    #[error("number of unique check lines ({unique}) must not exceed the number of check lines ({check})")]
    UniqueExceedsCheckLines { unique: u32, check: u32 },

    #[error("at least one unique check line is required")]
    NoUniqueCheckLines,

    #[error("at least 2 check lines are required (first and last), got {0}")]
    TooFewCheckLines(u32),

    #[error("{check} check lines cannot be interleaved among {total} lines")]
    TooManyCheckLines { check: u32, total: u32 },

    #[error("check line identity {identity} lies beyond the last line {total}")]
    IdentityOutOfRange { identity: u32, total: u32 },

    #[error("exposure time must be positive and finite, got {0}")]
    InvalidExposureTime(f64),

    #[error("failed to write schedule table: {0}")]
    Table(#[from] TableError),
}

/// Parameters of a check-line schedule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleConfig {
    /// Number of normal image lines
    pub total_lines: u32,
    /// Number of check-line events, including the first and last
    pub check_line_count: u32,
    /// Size of the cyclic pool of source lines re-read by check lines
    pub unique_check_lines: u32,
    /// Total exposure time of the normal lines in seconds
    pub exposure_time: f64,
}

impl ScheduleConfig {
    /// Check every constraint on the configuration.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.total_lines == 0 {
            return Err(ScheduleError::NoLines);
        }
        if self.unique_check_lines > self.check_line_count {
            return Err(ScheduleError::UniqueExceedsCheckLines {
                unique: self.unique_check_lines,
                check: self.check_line_count,
            });
        }
        if self.unique_check_lines == 0 {
            return Err(ScheduleError::NoUniqueCheckLines);
        }
        if self.check_line_count < 2 {
            return Err(ScheduleError::TooFewCheckLines(self.check_line_count));
        }
        // Interior check lines need a normal line in front of each
        if self.check_line_count > self.total_lines + 2 {
            return Err(ScheduleError::TooManyCheckLines {
                check: self.check_line_count,
                total: self.total_lines,
            });
        }
        if !(self.exposure_time.is_finite() && self.exposure_time > 0.0) {
            return Err(ScheduleError::InvalidExposureTime(self.exposure_time));
        }
        if let Some(&identity) = self.check_line_identities().last() {
            if identity > self.total_lines {
                return Err(ScheduleError::IdentityOutOfRange {
                    identity,
                    total: self.total_lines,
                });
            }
        }
        Ok(())
    }

    /// Duration of one line period in seconds
    pub fn time_per_line(&self) -> f64 {
        self.exposure_time / self.total_lines as f64
    }

    /// Source lines re-read by check lines, spaced evenly down the image.
    pub fn check_line_identities(&self) -> Vec<u32> {
        let spacing = 1 + self.total_lines / (self.unique_check_lines + 1);
        (1..=self.unique_check_lines).map(|i| i * spacing).collect()
    }

    /// Normal lines between check lines, rounded up by the per-check share
    fn countdown_reset(&self) -> i64 {
        let frequency = self.total_lines / self.check_line_count;
        let extra = (frequency as f64 / self.check_line_count as f64 + 0.5) as i64;
        frequency as i64 + extra
    }
}

/// A generated schedule, partitioned into its full, normal and check tables
#[derive(Debug, Clone, PartialEq)]
pub struct LineSchedule {
    all: LineTimeTable,
    normal: LineTimeTable,
    check: LineTimeTable,
}

impl LineSchedule {
    /// Generate the schedule for a configuration.
    pub fn generate(config: &ScheduleConfig) -> Result<Self, ScheduleError> {
        config.validate()?;

        let tpl = config.time_per_line();
        let identities = config.check_line_identities();
        let reset = config.countdown_reset();
        let event_time = |normal: u32, checks: u32| (normal + checks) as f64 * tpl - tpl / 2.0;

        let mut all = Vec::with_capacity((config.total_lines + config.check_line_count) as usize);
        let mut normal = Vec::with_capacity(config.total_lines as usize);
        let mut check = Vec::with_capacity(config.check_line_count as usize);

        let mut identity_index = 0usize;
        let mut emit_check = |checks: u32, normal_lines: u32, all: &mut Vec<LineTimeEntry>| {
            let entry = LineTimeEntry {
                line_number: identities[identity_index],
                exposure_time: event_time(normal_lines, checks),
            };
            identity_index = (identity_index + 1) % identities.len();
            all.push(entry);
            check.push(entry);
        };

        let mut written = 1;
        emit_check(written, 0, &mut all);

        let mut countdown = reset;
        for k in 1..=config.total_lines {
            let entry = LineTimeEntry {
                line_number: k,
                exposure_time: event_time(k, written),
            };
            all.push(entry);
            normal.push(entry);

            countdown -= 1;
            // The final check line is reserved for the end of the schedule
            if countdown <= 0 && written + 1 < config.check_line_count {
                written += 1;
                emit_check(written, k, &mut all);
                countdown = reset;
            }
        }

        written += 1;
        emit_check(written, config.total_lines, &mut all);

        let schedule = Self {
            all: all.into(),
            normal: normal.into(),
            check: check.into(),
        };
        debug!(
            "Scheduled {} normal and {} check lines, line period {tpl:e} s",
            schedule.normal.len(),
            schedule.check.len()
        );
        Ok(schedule)
    }

    /// Every event in readout order
    pub fn all(&self) -> &LineTimeTable {
        &self.all
    }

    /// Normal lines only
    pub fn normal(&self) -> &LineTimeTable {
        &self.normal
    }

    /// Check lines only
    pub fn check(&self) -> &LineTimeTable {
        &self.check
    }

    /// Paths of the three tables derived from `path`:
    /// `<path>`, `<stem>_normal.<ext>` and `<stem>_shadow.<ext>`.
    pub fn table_paths(path: &Path) -> (PathBuf, PathBuf, PathBuf) {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let with_suffix = |suffix: &str| {
            let name = match path.extension() {
                Some(ext) => format!("{stem}_{suffix}.{}", ext.to_string_lossy()),
                None => format!("{stem}_{suffix}"),
            };
            path.with_file_name(name)
        };
        (path.to_path_buf(), with_suffix("normal"), with_suffix("shadow"))
    }

    /// Write the full, normal and check tables next to each other.
    pub fn write_tables(&self, path: &Path) -> Result<(PathBuf, PathBuf, PathBuf), ScheduleError> {
        let (all_path, normal_path, check_path) = Self::table_paths(path);
        self.all.write_csv(&all_path)?;
        self.normal.write_csv(&normal_path)?;
        self.check.write_csv(&check_path)?;
        info!(
            "Wrote schedule tables {}, {}, {}",
            all_path.display(),
            normal_path.display(),
            check_path.display()
        );
        Ok((all_path, normal_path, check_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    fn config(total: u32, check: u32, unique: u32) -> ScheduleConfig {
        ScheduleConfig {
            total_lines: total,
            check_line_count: check,
            unique_check_lines: unique,
            exposure_time: 1.0,
        }
    }

    fn is_check(schedule: &LineSchedule, index: usize) -> bool {
        let entry = schedule.all().get(index).unwrap();
        schedule.check().entries().contains(entry)
    }

    #[test]
    fn test_reference_schedule() {
        let schedule = LineSchedule::generate(&config(100, 5, 3)).unwrap();

        assert_eq!(schedule.all().len(), 105);
        assert_eq!(schedule.normal().len(), 100);
        assert_eq!(schedule.check().len(), 5);

        assert!(is_check(&schedule, 0));
        assert!(is_check(&schedule, 104));

        // Identities 26, 52, 78 cycle round-robin
        let lines: Vec<u32> = schedule.check().entries().iter().map(|e| e.line_number).collect();
        assert_eq!(lines, vec![26, 52, 78, 26, 52]);

        assert_relative_eq!(schedule.all().get(0).unwrap().exposure_time, 0.005);
        assert_relative_eq!(schedule.normal().get(0).unwrap().exposure_time, 0.015);
        assert_relative_eq!(
            schedule.all().get(104).unwrap().exposure_time,
            1.045,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_times_strictly_increase() {
        let schedule = LineSchedule::generate(&config(100, 5, 3)).unwrap();
        assert!(schedule.all().is_time_ordered());

        // Events are one line period apart throughout
        let times = schedule.all().times();
        for w in times.windows(2) {
            assert_relative_eq!(w[1] - w[0], 0.01, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_check_count_invariant_across_configs() {
        for total in [1u32, 2, 7, 10, 33, 100, 257] {
            for check in 2..=(total + 2).min(40) {
                let cfg = config(total, check, 1);
                let schedule = LineSchedule::generate(&cfg).unwrap();
                assert_eq!(
                    schedule.check().len(),
                    check as usize,
                    "total={total} check={check}"
                );
                assert_eq!(schedule.normal().len(), total as usize);
                assert!(is_check(&schedule, 0));
                assert!(is_check(&schedule, schedule.all().len() - 1));
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let a = LineSchedule::generate(&config(500, 17, 4)).unwrap();
        let b = LineSchedule::generate(&config(500, 17, 4)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_round_robin_uses_whole_pool() {
        let schedule = LineSchedule::generate(&config(200, 10, 5)).unwrap();
        let lines: Vec<u32> = schedule.check().entries().iter().map(|e| e.line_number).collect();
        assert_eq!(lines, vec![34, 68, 102, 136, 170, 34, 68, 102, 136, 170]);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(
            LineSchedule::generate(&config(0, 5, 3)),
            Err(ScheduleError::NoLines)
        ));
        assert!(matches!(
            LineSchedule::generate(&config(100, 3, 5)),
            Err(ScheduleError::UniqueExceedsCheckLines { unique: 5, check: 3 })
        ));
        assert!(matches!(
            LineSchedule::generate(&config(100, 5, 0)),
            Err(ScheduleError::NoUniqueCheckLines)
        ));
        assert!(matches!(
            LineSchedule::generate(&config(100, 1, 1)),
            Err(ScheduleError::TooFewCheckLines(1))
        ));
        assert!(matches!(
            LineSchedule::generate(&config(3, 6, 1)),
            Err(ScheduleError::TooManyCheckLines { .. })
        ));
        assert!(matches!(
            LineSchedule::generate(&config(1, 3, 3)),
            Err(ScheduleError::IdentityOutOfRange { .. })
        ));

        let mut cfg = config(10, 3, 1);
        cfg.exposure_time = 0.0;
        assert!(matches!(
            LineSchedule::generate(&cfg),
            Err(ScheduleError::InvalidExposureTime(_))
        ));
    }

    #[test]
    fn test_table_paths() {
        let (all, normal, check) = LineSchedule::table_paths(Path::new("/tmp/run/times.csv"));
        assert_eq!(all, PathBuf::from("/tmp/run/times.csv"));
        assert_eq!(normal, PathBuf::from("/tmp/run/times_normal.csv"));
        assert_eq!(check, PathBuf::from("/tmp/run/times_shadow.csv"));
    }

    #[test]
    fn test_write_tables() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schedule.csv");
        let schedule = LineSchedule::generate(&config(20, 4, 2)).unwrap();
        let (all, normal, check) = schedule.write_tables(&path).unwrap();

        assert_eq!(&LineTimeTable::read_csv(all).unwrap(), schedule.all());
        assert_eq!(&LineTimeTable::read_csv(normal).unwrap(), schedule.normal());
        assert_eq!(&LineTimeTable::read_csv(check).unwrap(), schedule.check());
    }
}
