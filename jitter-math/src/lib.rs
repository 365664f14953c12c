//! jitter-math - Numerical primitives for push-frame jitter modeling
//!
//! This crate provides the small numerical toolkit the jitter pipeline is
//! built on:
//!
//! - **Least squares** - ordinary and weighted solvers with explicit
//!   rank checking
//! - **B-spline basis** - clamped uniform-knot basis evaluation
//! - **Interpolation** - nearest, bilinear and cubic-convolution pixel kernels
//! - **Statistics** - mean, RMS and normalized cross-correlation
//!
//! # Example
//!
//! ```
//! use jitter_math::{least_squares, BSplineBasis};
//! use nalgebra::{DMatrix, DVector};
//!
//! // Fit y = 2x + 1
//! let design = DMatrix::from_row_slice(3, 2, &[0.0, 1.0, 1.0, 1.0, 2.0, 1.0]);
//! let y = DVector::from_vec(vec![1.0, 3.0, 5.0]);
//! let solution = least_squares(&design, &y).unwrap();
//! assert!((solution.coefficients[0] - 2.0).abs() < 1e-12);
//!
//! // Cubic basis with 6 breakpoints over [0, 1]
//! let basis = BSplineBasis::uniform(4, 6, 0.0, 1.0).unwrap();
//! assert_eq!(basis.coefficient_count(), 8);
//! ```

pub mod bspline;
pub mod interp;
pub mod lstsq;
pub mod stats;

pub use bspline::{BSplineBasis, BasisError};
pub use interp::{cubic_convolution_kernel, interpolate, Interpolation};
pub use lstsq::{least_squares, weighted_least_squares, LeastSquaresSolution, SolveError};
pub use stats::{mean, normalized_cross_correlation, rms};
