//! Clamped B-spline basis on uniform breakpoints
//!
//! A spline of order `k` (degree `k - 1`) over `nbreak` uniformly spaced
//! breakpoints has `nbreak + k - 2` basis functions. The knot vector repeats
//! each end breakpoint `k` times so the basis is clamped at the interval ends
//! and partitions unity everywhere inside it.
//!
//! Basis values are computed with the Cox–de Boor recurrence, touching only
//! the `k` functions that are non-zero in the knot span containing `x`.
//!
//! # Example
//!
//! ```rust
//! use jitter_math::bspline::BSplineBasis;
//!
//! let basis = BSplineBasis::uniform(4, 5, 0.0, 2.0).unwrap();
//! let values = basis.evaluate(0.7);
//! assert_eq!(values.len(), basis.coefficient_count());
//! assert!((values.iter().sum::<f64>() - 1.0).abs() < 1e-12);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while constructing a basis
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BasisError {
    /// Order must be at least 1 (piecewise constant)
    #[error("spline order must be at least 1, got {0}")]
    InvalidOrder(usize),

    /// Fewer than two breakpoints cannot span an interval
    #[error("at least 2 breakpoints are required, got {0}")]
    TooFewBreakpoints(i64),

    /// Breakpoint interval is empty or not finite
    #[error("invalid breakpoint interval [{min}, {max}]")]
    InvalidInterval { min: f64, max: f64 },

    /// Knot vector too short to clamp both ends at this order
    #[error("{len} knots are too few for a clamped basis of order {order}")]
    TooFewKnots { order: usize, len: usize },

    /// Knots decrease or are not finite
    #[error("knot vector must be finite and non-decreasing")]
    UnorderedKnots,
}

/// Clamped B-spline basis with uniform interior breakpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBasis")]
pub struct BSplineBasis {
    /// Spline order k (degree + 1)
    order: usize,
    /// Full knot vector, end knots repeated `order` times
    knots: Vec<f64>,
}

impl BSplineBasis {
    /// Build a basis of the given order over `breakpoints` uniform breakpoints
    /// spanning `[min, max]`.
    ///
    /// `breakpoints` is signed so callers can pass a derived count such as
    /// `coefficients + 2 - order` and get a descriptive error when it drops
    /// below two.
    pub fn uniform(
        order: usize,
        breakpoints: i64,
        min: f64,
        max: f64,
    ) -> Result<Self, BasisError> {
        if order == 0 {
            return Err(BasisError::InvalidOrder(order));
        }
        if breakpoints < 2 {
            return Err(BasisError::TooFewBreakpoints(breakpoints));
        }
        if !(min.is_finite() && max.is_finite()) || max <= min {
            return Err(BasisError::InvalidInterval { min, max });
        }

        let nbreak = breakpoints as usize;
        let step = (max - min) / (nbreak - 1) as f64;

        let mut knots = Vec::with_capacity(2 * order + nbreak - 2);
        knots.extend(std::iter::repeat(min).take(order));
        for i in 1..nbreak - 1 {
            knots.push(min + i as f64 * step);
        }
        knots.extend(std::iter::repeat(max).take(order));

        Ok(Self { order, knots })
    }

    /// Rebuild a basis from a stored knot vector.
    ///
    /// The knots must be finite, non-decreasing, hold at least `2 * order`
    /// entries and span a non-empty interval.
    pub fn from_knots(order: usize, knots: Vec<f64>) -> Result<Self, BasisError> {
        if order == 0 {
            return Err(BasisError::InvalidOrder(order));
        }
        if knots.len() < 2 * order {
            return Err(BasisError::TooFewKnots {
                order,
                len: knots.len(),
            });
        }
        if knots.iter().any(|k| !k.is_finite()) || knots.windows(2).any(|w| w[1] < w[0]) {
            return Err(BasisError::UnorderedKnots);
        }

        let basis = Self { order, knots };
        let (min, max) = basis.interval();
        if max <= min {
            return Err(BasisError::InvalidInterval { min, max });
        }
        Ok(basis)
    }

    /// Spline order k
    pub fn order(&self) -> usize {
        self.order
    }

    /// Polynomial degree of each piece (order - 1)
    pub fn degree(&self) -> usize {
        self.order - 1
    }

    /// Number of basis functions (and spline coefficients)
    pub fn coefficient_count(&self) -> usize {
        self.knots.len() - self.order
    }

    /// The full knot vector
    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    /// Interval `[min, max]` the basis is defined over
    pub fn interval(&self) -> (f64, f64) {
        (
            self.knots[self.order - 1],
            self.knots[self.coefficient_count()],
        )
    }

    /// Evaluate every basis function at `x`.
    ///
    /// Values outside the interval are clamped to the nearest end, so the
    /// spline extends as a constant.
    pub fn evaluate(&self, x: f64) -> Vec<f64> {
        let n = self.coefficient_count();
        let p = self.degree();
        let (lo, hi) = self.interval();
        let x = x.clamp(lo, hi);
        let span = self.find_span(x);

        let mut values = vec![0.0; self.order];
        let mut left = vec![0.0; self.order];
        let mut right = vec![0.0; self.order];
        values[0] = 1.0;

        for j in 1..=p {
            left[j] = x - self.knots[span + 1 - j];
            right[j] = self.knots[span + j] - x;
            let mut saved = 0.0;
            for r in 0..j {
                let temp = values[r] / (right[r + 1] + left[j - r]);
                values[r] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }
            values[j] = saved;
        }

        let mut basis = vec![0.0; n];
        basis[span - p..=span].copy_from_slice(&values);
        basis
    }

    /// Evaluate the spline `Σ cᵢ·Bᵢ(x)` for the given coefficients.
    ///
    /// # Panics
    /// If `coefficients.len()` differs from [`Self::coefficient_count`].
    pub fn combine(&self, coefficients: &[f64], x: f64) -> f64 {
        assert_eq!(
            coefficients.len(),
            self.coefficient_count(),
            "Coefficient count must match basis size"
        );
        self.evaluate(x)
            .iter()
            .zip(coefficients)
            .map(|(b, c)| b * c)
            .sum()
    }

    /// Index of the knot span `[knots[i], knots[i + 1])` holding `x`.
    ///
    /// `x` must already be clamped into the interval. The right end maps to
    /// the last non-empty span.
    fn find_span(&self, x: f64) -> usize {
        let n = self.coefficient_count();
        let p = self.degree();
        if x >= self.knots[n] {
            return n - 1;
        }

        let mut low = p;
        let mut high = n;
        while high - low > 1 {
            let mid = (low + high) / 2;
            if x < self.knots[mid] {
                high = mid;
            } else {
                low = mid;
            }
        }
        low
    }
}

/// Unchecked form of [`BSplineBasis`] as stored on disk
#[derive(Deserialize)]
struct RawBasis {
    order: usize,
    knots: Vec<f64>,
}

impl TryFrom<RawBasis> for BSplineBasis {
    type Error = BasisError;

    fn try_from(raw: RawBasis) -> Result<Self, Self::Error> {
        Self::from_knots(raw.order, raw.knots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_coefficient_count() {
        // nbreak + order - 2
        let cubic = BSplineBasis::uniform(4, 6, 0.0, 1.0).unwrap();
        assert_eq!(cubic.coefficient_count(), 8);
        assert_eq!(cubic.degree(), 3);

        let linear = BSplineBasis::uniform(2, 3, 0.0, 1.0).unwrap();
        assert_eq!(linear.coefficient_count(), 3);
    }

    #[test]
    fn test_knot_vector_clamped() {
        let basis = BSplineBasis::uniform(3, 3, 0.0, 2.0).unwrap();
        assert_eq!(basis.knots(), &[0.0, 0.0, 0.0, 1.0, 2.0, 2.0, 2.0]);
        assert_eq!(basis.interval(), (0.0, 2.0));
    }

    #[test]
    fn test_partition_of_unity() {
        for order in 1..=5 {
            let basis = BSplineBasis::uniform(order, 7, -1.0, 3.0).unwrap();
            for i in 0..=40 {
                let x = -1.0 + 4.0 * i as f64 / 40.0;
                let sum: f64 = basis.evaluate(x).iter().sum();
                assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_values_non_negative() {
        let basis = BSplineBasis::uniform(4, 5, 0.0, 1.0).unwrap();
        for i in 0..=20 {
            let x = i as f64 / 20.0;
            assert!(basis.evaluate(x).iter().all(|&b| b >= 0.0));
        }
    }

    #[test]
    fn test_linear_hat_functions() {
        // Order 2 over breakpoints 0, 1, 2 gives hat functions peaking at each breakpoint
        let basis = BSplineBasis::uniform(2, 3, 0.0, 2.0).unwrap();

        let at_half = basis.evaluate(0.5);
        assert_relative_eq!(at_half[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(at_half[1], 0.5, epsilon = 1e-12);
        assert_relative_eq!(at_half[2], 0.0, epsilon = 1e-12);

        let at_one = basis.evaluate(1.0);
        assert_relative_eq!(at_one[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_endpoints_clamped() {
        let basis = BSplineBasis::uniform(4, 4, 0.0, 3.0).unwrap();
        let n = basis.coefficient_count();

        let start = basis.evaluate(0.0);
        assert_relative_eq!(start[0], 1.0, epsilon = 1e-12);

        let end = basis.evaluate(3.0);
        assert_relative_eq!(end[n - 1], 1.0, epsilon = 1e-12);

        // Outside the interval behaves like the nearest end
        assert_eq!(basis.evaluate(-5.0), start);
        assert_eq!(basis.evaluate(10.0), end);
    }

    #[test]
    fn test_linear_reproduction() {
        // With order 2 the coefficients are the values at the breakpoints
        let basis = BSplineBasis::uniform(2, 5, 0.0, 4.0).unwrap();
        let coefficients: Vec<f64> = (0..5).map(|i| 2.0 * i as f64 + 1.0).collect();
        for x in [0.0, 0.3, 1.7, 2.5, 3.99, 4.0] {
            assert_relative_eq!(basis.combine(&coefficients, x), 2.0 * x + 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_constant_reproduction() {
        let basis = BSplineBasis::uniform(4, 6, 10.0, 20.0).unwrap();
        let coefficients = vec![7.5; basis.coefficient_count()];
        for x in [10.0, 12.3, 15.0, 19.9, 20.0] {
            assert_relative_eq!(basis.combine(&coefficients, x), 7.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_invalid_construction() {
        assert_eq!(
            BSplineBasis::uniform(0, 4, 0.0, 1.0),
            Err(BasisError::InvalidOrder(0))
        );
        assert_eq!(
            BSplineBasis::uniform(4, 1, 0.0, 1.0),
            Err(BasisError::TooFewBreakpoints(1))
        );
        assert_eq!(
            BSplineBasis::uniform(4, -2, 0.0, 1.0),
            Err(BasisError::TooFewBreakpoints(-2))
        );
        assert!(matches!(
            BSplineBasis::uniform(4, 4, 1.0, 1.0),
            Err(BasisError::InvalidInterval { .. })
        ));
    }

    #[test]
    fn test_from_knots_round_trip() {
        let basis = BSplineBasis::uniform(3, 5, -2.0, 2.0).unwrap();
        let rebuilt = BSplineBasis::from_knots(basis.order(), basis.knots().to_vec()).unwrap();
        assert_eq!(rebuilt, basis);
    }

    #[test]
    fn test_from_knots_rejects_bad_vectors() {
        assert_eq!(
            BSplineBasis::from_knots(0, vec![0.0, 1.0]),
            Err(BasisError::InvalidOrder(0))
        );
        assert_eq!(
            BSplineBasis::from_knots(4, vec![0.0, 1.0]),
            Err(BasisError::TooFewKnots { order: 4, len: 2 })
        );
        assert_eq!(
            BSplineBasis::from_knots(2, vec![0.0, 0.0, 2.0, 1.0, 1.0]),
            Err(BasisError::UnorderedKnots)
        );
        assert_eq!(
            BSplineBasis::from_knots(2, vec![0.0, f64::NAN, 1.0, 1.0]),
            Err(BasisError::UnorderedKnots)
        );
        assert!(matches!(
            BSplineBasis::from_knots(2, vec![1.0, 1.0, 1.0, 1.0]),
            Err(BasisError::InvalidInterval { .. })
        ));
    }

    #[test]
    fn test_deserialize_validates() {
        let basis = BSplineBasis::uniform(4, 4, 0.0, 3.0).unwrap();
        let json = serde_json::to_string(&basis).unwrap();
        assert_eq!(serde_json::from_str::<BSplineBasis>(&json).unwrap(), basis);

        let short = r#"{"order":4,"knots":[0.0,1.0]}"#;
        assert!(serde_json::from_str::<BSplineBasis>(short).is_err());
    }

    #[test]
    #[should_panic(expected = "Coefficient count must match basis size")]
    fn test_combine_wrong_length() {
        let basis = BSplineBasis::uniform(4, 4, 0.0, 1.0).unwrap();
        basis.combine(&[1.0, 2.0], 0.5);
    }
}
