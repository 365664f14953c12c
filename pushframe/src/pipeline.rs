//! Jitter injection and removal passes over whole rasters.

use jitter_math::Interpolation;
use log::info;

use crate::displacement::DisplacementTable;
use crate::model::JitterModel;
use crate::raster::Raster;
use crate::resample::RubberSheet;
use crate::tables::LineTimeTable;
use crate::transform::{JitterTransform, TransformError};

/// Rasters and offsets produced by [`inject_jitter`]
#[derive(Debug, Clone)]
pub struct InjectedJitter {
    /// Normal lines read at their jittered positions
    pub jittered: Raster,
    /// One line per check-table row, re-reading its source line
    pub check: Raster,
    pub normal_offsets: DisplacementTable,
    pub check_offsets: DisplacementTable,
}

/// Simulate a jittered readout of `input`.
///
/// Normal lines follow `normal_table`, check lines follow `check_table`; each
/// line is displaced by `model` evaluated at its own read time.
pub fn inject_jitter(
    input: &Raster,
    normal_table: &LineTimeTable,
    check_table: &LineTimeTable,
    model: &JitterModel,
    interpolation: Interpolation,
) -> Result<InjectedJitter, TransformError> {
    let sheet = RubberSheet::new(interpolation);

    let normal = JitterTransform::forward_normal(
        input.samples(),
        DisplacementTable::build(normal_table, model),
    )?;
    let jittered = sheet.resample(input, &normal);

    let check = JitterTransform::forward_check(
        input.samples(),
        DisplacementTable::build(check_table, model),
        check_table.source_lines(),
    )?;
    let check_raster = sheet.resample(input, &check);

    let normal_offsets = normal.into_table();
    let check_offsets = check.into_table();
    let (normal_rms, check_rms) = (normal_offsets.rms(), check_offsets.rms());
    info!(
        "Injected {} jitter: {} normal lines (RMS {:.3}, {:.3}), {} check lines (RMS {:.3}, {:.3})",
        model.kind(),
        normal_offsets.len(),
        normal_rms.d_sample,
        normal_rms.d_line,
        check_offsets.len(),
        check_rms.d_sample,
        check_rms.d_line
    );

    Ok(InjectedJitter {
        jittered,
        check: check_raster,
        normal_offsets,
        check_offsets,
    })
}

/// Correct `input` by the jitter `model` predicts at each normal line's read time.
///
/// `normal_table` must hold one row per input line.
pub fn remove_jitter(
    input: &Raster,
    normal_table: &LineTimeTable,
    model: &JitterModel,
    interpolation: Interpolation,
) -> Result<(Raster, DisplacementTable), TransformError> {
    let inverse = JitterTransform::inverse(
        input.samples(),
        input.lines(),
        DisplacementTable::build(normal_table, model),
    )?;
    let corrected = RubberSheet::new(interpolation).resample(input, &inverse);
    info!(
        "Removed {} jitter from {}x{} raster",
        model.kind(),
        input.samples(),
        input.lines()
    );
    Ok((corrected, inverse.into_table()))
}
