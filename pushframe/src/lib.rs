//! Rolling-shutter jitter modeling and correction for push-frame sensors
//!
//! A push-frame sensor reads its image one line at a time while the platform
//! moves, so every line carries the pointing error of its own read time.
//! Interleaving "check lines" that re-read earlier lines later in the readout
//! makes that error observable. This crate provides each stage of the
//! resulting pipeline:
//!
//! - **Scheduling** - generate the normal/check line readout order and times
//! - **Injection** - simulate jittered normal and check-line images from a
//!   clean scene and a jitter model
//! - **Recovery** - correlate check lines against the jittered image
//! - **Fitting** - fit polynomial or B-spline jitter models to the recovered
//!   residuals
//! - **Correction** - resample the jittered image through the inverse model

pub mod displacement;
pub mod fit;
pub mod model;
pub mod pipeline;
pub mod raster;
pub mod recovery;
pub mod registration;
pub mod resample;
pub mod scene;
pub mod schedule;
pub mod shared_args;
pub mod tables;
pub mod transform;

// Re-exports for easier access
pub use displacement::DisplacementTable;
pub use fit::{fit_polynomial, fit_spline, FitConfig, FitError, FitResidual};
pub use model::{HarmonicModel, InvalidModel, JitterModel, Offset, PolynomialModel, SplineModel, TimeDomain};
pub use pipeline::{inject_jitter, remove_jitter, InjectedJitter};
pub use raster::{ImageFileStore, Raster, RasterError, RasterStore};
pub use recovery::{recover_jitter, RecoveryError, RecoveryStatistics, ResidualRecord};
pub use registration::{Correlator, MaximumCorrelation, RegistrationConfig};
pub use schedule::{LineSchedule, ScheduleConfig, ScheduleError};
pub use tables::{LineTimeTable, TableError};
