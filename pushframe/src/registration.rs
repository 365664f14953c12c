//! Template registration of a pattern chip within a search chip.
//!
//! A [`Chip`] is a small window sampled from a raster around a (possibly
//! fractional) center. A [`Correlator`] slides the pattern chip over the
//! search chip and reports where it matches best, in raster coordinates of
//! the search chip's source.
//!
//! [`MaximumCorrelation`] scores each integer placement by zero-mean
//! normalized cross-correlation and refines the best placement to sub-pixel
//! precision by fitting a parabola through the neighbouring scores along each
//! axis.
//!
//! Registration settings are read from a JSON definition file
//! ([`RegistrationConfig`]); any field left out takes its default.

use std::path::Path;

use jitter_math::{interpolate, normalized_cross_correlation, Interpolation};
use log::debug;
use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistrationConfigError {
    #[error("failed to read registration definition: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse registration definition: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid registration definition: {0}")]
    Invalid(String),
}

/// Chip sizes and acceptance threshold for registration.
///
/// Neighbouring lines of a check-line image come from unrelated source lines,
/// so the default pattern chip is a single line tall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Pattern chip width in pixels
    pub pattern_samples: usize,
    /// Pattern chip height in pixels
    pub pattern_lines: usize,
    /// Search chip width in pixels
    pub search_samples: usize,
    /// Search chip height in pixels
    pub search_lines: usize,
    /// Minimum correlation for a successful match
    pub tolerance: f64,
    /// Refine the match below one pixel
    pub subpixel: bool,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            pattern_samples: 25,
            pattern_lines: 1,
            search_samples: 45,
            search_lines: 15,
            tolerance: 0.7,
            subpixel: true,
        }
    }
}

impl RegistrationConfig {
    pub fn validate(&self) -> Result<(), RegistrationConfigError> {
        if self.pattern_samples < 3 || self.pattern_lines == 0 {
            return Err(RegistrationConfigError::Invalid(format!(
                "pattern chip {}x{} must be at least 3 samples by 1 line",
                self.pattern_samples, self.pattern_lines
            )));
        }
        if self.search_samples < self.pattern_samples || self.search_lines < self.pattern_lines {
            return Err(RegistrationConfigError::Invalid(format!(
                "search chip {}x{} is smaller than pattern chip {}x{}",
                self.search_samples, self.search_lines, self.pattern_samples, self.pattern_lines
            )));
        }
        if !self.tolerance.is_finite() {
            return Err(RegistrationConfigError::Invalid(format!(
                "tolerance {} is not finite",
                self.tolerance
            )));
        }
        Ok(())
    }

    /// Load and validate a JSON definition file
    pub fn load_from_file(path: &Path) -> Result<Self, RegistrationConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), RegistrationConfigError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Window of raster data around a center position.
///
/// Raster coordinates are 1-based pixel centers. Chip pixels that fall
/// outside the raster hold NaN.
#[derive(Debug, Clone)]
pub struct Chip {
    data: Array2<f64>,
    center_sample: f64,
    center_line: f64,
}

impl Chip {
    /// Sample a `samples` x `lines` chip from `band` centered on
    /// (`center_sample`, `center_line`).
    pub fn load(
        band: &ArrayView2<f64>,
        center_sample: f64,
        center_line: f64,
        samples: usize,
        lines: usize,
    ) -> Self {
        let half_s = (samples as f64 - 1.0) / 2.0;
        let half_l = (lines as f64 - 1.0) / 2.0;
        let data = Array2::from_shape_fn((lines, samples), |(l, s)| {
            let raster_s = center_sample + s as f64 - half_s - 1.0;
            let raster_l = center_line + l as f64 - half_l - 1.0;
            interpolate(band, raster_s, raster_l, Interpolation::Bilinear).unwrap_or(f64::NAN)
        });
        Self {
            data,
            center_sample,
            center_line,
        }
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn samples(&self) -> usize {
        self.data.ncols()
    }

    pub fn lines(&self) -> usize {
        self.data.nrows()
    }

    /// Raster position of 0-based chip position (`sample`, `line`)
    pub fn chip_to_raster(&self, sample: f64, line: f64) -> (f64, f64) {
        let half_s = (self.samples() as f64 - 1.0) / 2.0;
        let half_l = (self.lines() as f64 - 1.0) / 2.0;
        (
            self.center_sample + sample - half_s,
            self.center_line + line - half_l,
        )
    }

    /// True if every pixel of the chip came from inside the raster
    pub fn is_complete(&self) -> bool {
        self.data.iter().all(|v| !v.is_nan())
    }
}

/// Outcome of one registration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    /// Matched sample in the search chip's raster
    pub sample: f64,
    /// Matched line in the search chip's raster
    pub line: f64,
    /// Correlation score at the match
    pub goodness_of_fit: f64,
    pub success: bool,
}

/// Finds a pattern chip inside a search chip
pub trait Correlator: Sync {
    /// Register `pattern` within `search`. A failed registration still
    /// reports its best-effort position.
    fn register(&self, pattern: &Chip, search: &Chip) -> MatchResult;
}

/// Normalized cross-correlation with parabolic sub-pixel refinement
#[derive(Debug, Clone)]
pub struct MaximumCorrelation {
    tolerance: f64,
    subpixel: bool,
}

impl MaximumCorrelation {
    pub fn new(tolerance: f64, subpixel: bool) -> Self {
        Self {
            tolerance,
            subpixel,
        }
    }

    pub fn from_config(config: &RegistrationConfig) -> Self {
        Self::new(config.tolerance, config.subpixel)
    }

    /// Correlation at every integer placement of the pattern's top-left
    /// corner; None where the window is incomplete or featureless
    fn score_surface(pattern: &ArrayView2<f64>, search: &ArrayView2<f64>) -> Array2<Option<f64>> {
        let (pl, ps) = pattern.dim();
        let (sl, ss) = search.dim();
        Array2::from_shape_fn((sl - pl + 1, ss - ps + 1), |(l, s)| {
            let window = search.slice(s![l..l + pl, s..s + ps]);
            if window.iter().any(|v| v.is_nan()) {
                return None;
            }
            normalized_cross_correlation(pattern, &window)
        })
    }
}

/// Vertex offset of the parabola through three equally spaced scores
fn parabolic_peak(left: f64, center: f64, right: f64) -> f64 {
    let denom = left - 2.0 * center + right;
    if denom.abs() < f64::EPSILON {
        return 0.0;
    }
    (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
}

impl Correlator for MaximumCorrelation {
    fn register(&self, pattern: &Chip, search: &Chip) -> MatchResult {
        let failed = |goodness_of_fit: f64| {
            let (sample, line) = search.chip_to_raster(
                (search.samples() as f64 - 1.0) / 2.0,
                (search.lines() as f64 - 1.0) / 2.0,
            );
            MatchResult {
                sample,
                line,
                goodness_of_fit,
                success: false,
            }
        };

        if pattern.lines() > search.lines()
            || pattern.samples() > search.samples()
            || !pattern.is_complete()
        {
            return failed(0.0);
        }

        let surface = Self::score_surface(&pattern.data.view(), &search.data.view());
        let best = surface
            .indexed_iter()
            .filter_map(|(idx, score)| score.map(|v| (idx, v)))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let Some(((bl, bs), score)) = best else {
            return failed(0.0);
        };

        let (rows, cols) = surface.dim();
        let on_edge = (rows > 1 && (bl == 0 || bl == rows - 1)) || (cols > 1 && (bs == 0 || bs == cols - 1));

        let mut dl = 0.0;
        let mut ds = 0.0;
        if self.subpixel && !on_edge {
            let at = |l: usize, s: usize| surface[[l, s]];
            if rows > 1 {
                if let (Some(up), Some(down)) = (at(bl - 1, bs), at(bl + 1, bs)) {
                    dl = parabolic_peak(up, score, down);
                }
            }
            if cols > 1 {
                if let (Some(left), Some(right)) = (at(bl, bs - 1), at(bl, bs + 1)) {
                    ds = parabolic_peak(left, score, right);
                }
            }
        }

        // Pattern center sits half a pattern into the placement
        let center_s = bs as f64 + ds + (pattern.samples() as f64 - 1.0) / 2.0;
        let center_l = bl as f64 + dl + (pattern.lines() as f64 - 1.0) / 2.0;
        let (sample, line) = search.chip_to_raster(center_s, center_l);

        let success = score >= self.tolerance && !on_edge;
        if !success {
            debug!(
                "Registration at ({:.2}, {:.2}) rejected: score {score:.4}, edge {on_edge}",
                search.center_sample, search.center_line
            );
        }

        MatchResult {
            sample,
            line,
            goodness_of_fit: score,
            success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::textured_band;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    #[test]
    fn test_config_defaults_and_partial_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reg.json");
        std::fs::write(&path, r#"{ "tolerance": 0.5, "search_lines": 41 }"#).unwrap();

        let config = RegistrationConfig::load_from_file(&path).unwrap();
        assert_eq!(config.tolerance, 0.5);
        assert_eq!(config.search_lines, 41);
        assert_eq!(config.pattern_samples, RegistrationConfig::default().pattern_samples);
    }

    #[test]
    fn test_config_validation() {
        let config = RegistrationConfig {
            search_samples: 9,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RegistrationConfigError::Invalid(_))
        ));

        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            RegistrationConfig::load_from_file(&path),
            Err(RegistrationConfigError::Json(_))
        ));
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reg.json");
        let config = RegistrationConfig {
            pattern_samples: 11,
            subpixel: false,
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();
        assert_eq!(RegistrationConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_chip_load_and_coordinates() {
        let band = Array2::from_shape_fn((20, 20), |(l, s)| (l * 100 + s) as f64);
        let chip = Chip::load(&band.view(), 10.0, 8.0, 5, 3);

        assert_eq!((chip.samples(), chip.lines()), (5, 3));
        // Chip center is raster (10, 8), i.e. array [7, 9]
        assert_eq!(chip.data()[[1, 2]], band[[7, 9]]);
        assert_eq!(chip.chip_to_raster(2.0, 1.0), (10.0, 8.0));
        assert_eq!(chip.chip_to_raster(0.0, 0.0), (8.0, 7.0));
        assert!(chip.is_complete());

        let edge = Chip::load(&band.view(), 1.0, 1.0, 5, 5);
        assert!(!edge.is_complete());
    }

    #[test]
    fn test_integer_offset_found() {
        let band = textured_band(64, 64);
        let view = band.view();
        let correlator = MaximumCorrelation::new(0.7, false);

        let pattern = Chip::load(&view, 30.0, 32.0, 15, 15);
        let search = Chip::load(&view, 28.0, 35.0, 31, 31);
        let result = correlator.register(&pattern, &search);

        assert!(result.success);
        assert_relative_eq!(result.sample, 30.0, epsilon = 1e-6);
        assert_relative_eq!(result.line, 32.0, epsilon = 1e-6);
        assert_relative_eq!(result.goodness_of_fit, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_subpixel_offset_found() {
        let band = textured_band(64, 64);
        let view = band.view();
        let correlator = MaximumCorrelation::new(0.7, true);

        // Pattern sampled between pixels; search centered on whole pixels
        let pattern = Chip::load(&view, 30.3, 31.6, 15, 15);
        let search = Chip::load(&view, 30.0, 32.0, 31, 31);
        let result = correlator.register(&pattern, &search);

        assert!(result.success);
        assert!((result.sample - 30.3).abs() < 0.15, "sample {}", result.sample);
        assert!((result.line - 31.6).abs() < 0.15, "line {}", result.line);
    }

    #[test]
    fn test_featureless_pattern_fails() {
        let flat = Array2::from_elem((40, 40), 7.0);
        let band = textured_band(40, 40);
        let correlator = MaximumCorrelation::new(0.7, true);

        let pattern = Chip::load(&flat.view(), 20.0, 20.0, 9, 9);
        let search = Chip::load(&band.view(), 20.0, 20.0, 21, 21);
        let result = correlator.register(&pattern, &search);

        assert!(!result.success);
        assert_eq!(result.goodness_of_fit, 0.0);
        assert_eq!((result.sample, result.line), (20.0, 20.0));
    }

    #[test]
    fn test_match_on_search_edge_fails() {
        let band = textured_band(64, 64);
        let view = band.view();
        let correlator = MaximumCorrelation::new(0.0, true);

        // True position lies 8 pixels off center, the edge of a 31 vs 15 search
        let pattern = Chip::load(&view, 40.0, 32.0, 15, 15);
        let search = Chip::load(&view, 32.0, 32.0, 31, 31);
        let result = correlator.register(&pattern, &search);
        assert!(!result.success);
    }

    #[test]
    fn test_parabolic_peak() {
        assert_eq!(parabolic_peak(0.5, 1.0, 0.5), 0.0);
        // Samples of -(x - 0.2)^2 at -1, 0, 1
        let f = |x: f64| -(x - 0.2) * (x - 0.2);
        assert_relative_eq!(parabolic_peak(f(-1.0), f(0.0), f(1.0)), 0.2, epsilon = 1e-12);
    }
}
