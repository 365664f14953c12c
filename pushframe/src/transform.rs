//! Jitter transforms mapping output pixels to input pixels.
//!
//! Three addressing modes share one displacement lookup:
//!
//! | Mode            | input sample      | input line                   | output lines   |
//! |-----------------|-------------------|------------------------------|----------------|
//! | forward normal  | `out_s + dS`      | `out_l + dL`                 | table length   |
//! | forward check   | `out_s + dS`      | `source_line[out_l] + dL`    | table length   |
//! | inverse         | `out_s - dS`      | `out_l - dL`                 | input lines    |
//!
//! The forward modes inject jitter into a clean image; the inverse mode
//! removes a modeled jitter from an observed one.

use thiserror::Error;

use crate::displacement::DisplacementTable;
use crate::model::Offset;
use crate::resample::Transform;
use crate::tables::CheckLineMap;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("displacement table is empty")]
    EmptyTable,

    #[error("displacement table has {found} lines, expected {expected}")]
    TableLength { expected: usize, found: usize },
}

#[derive(Debug, Clone, PartialEq)]
enum Mode {
    ForwardNormal,
    ForwardCheck(CheckLineMap),
    Inverse,
}

/// Output → input mapping for jitter injection and removal
#[derive(Debug, Clone)]
pub struct JitterTransform {
    samples: usize,
    lines: usize,
    table: DisplacementTable,
    mode: Mode,
}

impl JitterTransform {
    /// Resample normal lines at their jittered positions.
    ///
    /// One output line per table entry.
    pub fn forward_normal(input_samples: usize, table: DisplacementTable) -> Result<Self, TransformError> {
        if table.is_empty() {
            return Err(TransformError::EmptyTable);
        }
        Ok(Self {
            samples: input_samples,
            lines: table.len(),
            table,
            mode: Mode::ForwardNormal,
        })
    }

    /// Resample check lines: output line `k` re-reads source line
    /// `source_lines[k]` at the jitter of its own read time.
    pub fn forward_check(
        input_samples: usize,
        table: DisplacementTable,
        source_lines: CheckLineMap,
    ) -> Result<Self, TransformError> {
        if table.is_empty() {
            return Err(TransformError::EmptyTable);
        }
        if source_lines.len() != table.len() {
            return Err(TransformError::TableLength {
                expected: source_lines.len(),
                found: table.len(),
            });
        }
        Ok(Self {
            samples: input_samples,
            lines: table.len(),
            table,
            mode: Mode::ForwardCheck(source_lines),
        })
    }

    /// Remove jitter; the output keeps the input geometry.
    pub fn inverse(
        input_samples: usize,
        input_lines: usize,
        table: DisplacementTable,
    ) -> Result<Self, TransformError> {
        if table.len() != input_lines {
            return Err(TransformError::TableLength {
                expected: input_lines,
                found: table.len(),
            });
        }
        Ok(Self {
            samples: input_samples,
            lines: input_lines,
            table,
            mode: Mode::Inverse,
        })
    }

    pub fn table(&self) -> &DisplacementTable {
        &self.table
    }

    pub fn into_table(self) -> DisplacementTable {
        self.table
    }

    fn offset(&self, line: f64) -> Option<(usize, Offset)> {
        let line = line.round();
        if line < 1.0 {
            return None;
        }
        let line = line as usize;
        self.table.get(line).map(|offset| (line, offset))
    }
}

impl Transform for JitterTransform {
    fn output_samples(&self) -> usize {
        self.samples
    }

    fn output_lines(&self) -> usize {
        self.lines
    }

    fn map(&self, sample: f64, line: f64) -> Option<(f64, f64)> {
        let (index, offset) = self.offset(line)?;
        match &self.mode {
            Mode::ForwardNormal => Some((sample + offset.d_sample, line + offset.d_line)),
            Mode::ForwardCheck(source_lines) => {
                let source = source_lines.source_line(index - 1)?;
                Some((sample + offset.d_sample, source as f64 + offset.d_line))
            }
            Mode::Inverse => Some((sample - offset.d_sample, line - offset.d_line)),
        }
    }
}
