//! Line-indexed displacement lookup built from a jitter model.

use std::path::Path;

use log::debug;
use rayon::prelude::*;

use crate::model::{JitterModel, Offset};
use crate::tables::{create_writer, LineTimeTable, TableError};

/// Immutable table of offsets, one per output line.
///
/// Lines are addressed 1-based, matching the line numbers of the schedule
/// tables the table is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplacementTable {
    offsets: Vec<Offset>,
}

impl DisplacementTable {
    /// CSV header written by [`DisplacementTable::write_offsets`]
    pub const HEADER: [&'static str; 2] = ["dSample", "dLine"];

    /// Evaluate `model` at every exposure time of `times`, preserving order.
    pub fn build(times: &LineTimeTable, model: &JitterModel) -> Self {
        let offsets: Vec<Offset> = times
            .entries()
            .par_iter()
            .map(|entry| model.evaluate(entry.exposure_time))
            .collect();
        debug!(
            "Built {} line displacement table from {} entries",
            model.kind(),
            offsets.len()
        );
        Self { offsets }
    }

    pub fn from_offsets(offsets: Vec<Offset>) -> Self {
        Self { offsets }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Offset for 1-based output `line`
    pub fn get(&self, line: usize) -> Option<Offset> {
        line.checked_sub(1).and_then(|i| self.offsets.get(i)).copied()
    }

    pub fn offsets(&self) -> &[Offset] {
        &self.offsets
    }

    /// Per-axis RMS of the offsets
    pub fn rms(&self) -> Offset {
        let samples: Vec<f64> = self.offsets.iter().map(|o| o.d_sample).collect();
        let lines: Vec<f64> = self.offsets.iter().map(|o| o.d_line).collect();
        Offset::new(jitter_math::rms(&samples), jitter_math::rms(&lines))
    }

    /// Write the offsets report, one `dSample,dLine` row per line.
    pub fn write_offsets<P: AsRef<Path>>(&self, path: P) -> Result<(), TableError> {
        let mut writer = create_writer(path.as_ref(), &Self::HEADER)?;
        for offset in &self.offsets {
            writer.write_record(&[offset.d_sample.to_string(), offset.d_line.to_string()])?;
        }
        writer.flush()?;
        Ok(())
    }
}
