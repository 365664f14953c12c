//! Continuous jitter models mapping time to a pixel offset.
//!
//! Three closed variants share one capability, [`JitterModel::evaluate`]:
//! - [`HarmonicModel`]: sum of phase-shifted cosines, used to synthesize jitter
//! - [`PolynomialModel`]: constant-free power series over normalized time
//! - [`SplineModel`]: clamped B-spline over time
//!
//! All models are immutable once built and serialize to JSON so a fitted
//! model can be stored and reused by the correction pass.

pub mod harmonic;
pub mod polynomial;
pub mod spline;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use harmonic::{HarmonicModel, HarmonicTerm};
pub use polynomial::PolynomialModel;
pub use spline::SplineModel;

/// Sub-pixel displacement in (sample, line)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Offset {
    pub d_sample: f64,
    pub d_line: f64,
}

impl Offset {
    pub fn new(d_sample: f64, d_line: f64) -> Self {
        Self { d_sample, d_line }
    }
}

/// Time domain is empty, reversed or not finite
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid time domain [{min}, {max}]")]
pub struct InvalidTimeDomain {
    pub min: f64,
    pub max: f64,
}

/// Coefficient vectors that do not fit together
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidModel {
    #[error("{line} line coefficients but {sample} sample coefficients")]
    CoefficientMismatch { line: usize, sample: usize },

    #[error("spline basis has {expected} functions, got {line} line and {sample} sample coefficients")]
    SplineSize {
        expected: usize,
        line: usize,
        sample: usize,
    },
}

/// Time interval mapped onto `[-1, 1]` for polynomial evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTimeDomain")]
pub struct TimeDomain {
    min: f64,
    max: f64,
}

impl TimeDomain {
    pub fn new(min: f64, max: f64) -> Result<Self, InvalidTimeDomain> {
        if !(min.is_finite() && max.is_finite()) || max <= min {
            return Err(InvalidTimeDomain { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// `2(t - min)/(max - min) - 1`; times inside the domain land in `[-1, 1]`
    pub fn normalize(&self, time: f64) -> f64 {
        2.0 * (time - self.min) / (self.max - self.min) - 1.0
    }
}

#[derive(Deserialize)]
struct RawTimeDomain {
    min: f64,
    max: f64,
}

impl TryFrom<RawTimeDomain> for TimeDomain {
    type Error = InvalidTimeDomain;

    fn try_from(raw: RawTimeDomain) -> Result<Self, Self::Error> {
        Self::new(raw.min, raw.max)
    }
}

/// A jitter model of any supported kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JitterModel {
    Harmonic(HarmonicModel),
    Polynomial(PolynomialModel),
    Spline(SplineModel),
}

impl JitterModel {
    /// Offset at `time` seconds.
    pub fn evaluate(&self, time: f64) -> Offset {
        match self {
            JitterModel::Harmonic(model) => model.evaluate(time),
            JitterModel::Polynomial(model) => model.evaluate(time),
            JitterModel::Spline(model) => model.evaluate(time),
        }
    }

    /// Short name of the variant for logs
    pub fn kind(&self) -> &'static str {
        match self {
            JitterModel::Harmonic(_) => "harmonic",
            JitterModel::Polynomial(_) => "polynomial",
            JitterModel::Spline(_) => "spline",
        }
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Load from JSON file; a model that fails validation is `InvalidData`
    pub fn load_from_file(path: &Path) -> Result<Self, std::io::Error> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

impl From<HarmonicModel> for JitterModel {
    fn from(model: HarmonicModel) -> Self {
        JitterModel::Harmonic(model)
    }
}

impl From<PolynomialModel> for JitterModel {
    fn from(model: PolynomialModel) -> Self {
        JitterModel::Polynomial(model)
    }
}

impl From<SplineModel> for JitterModel {
    fn from(model: SplineModel) -> Self {
        JitterModel::Spline(model)
    }
}
