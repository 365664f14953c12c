//! Linear least-squares solvers using nalgebra
//!
//! Solves overdetermined systems `A·x ≈ b` through an SVD of the (optionally
//! weighted) design matrix. Rank-deficient systems are reported as errors
//! rather than silently returning a minimum-norm solution.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Relative threshold on singular values below which a direction is treated
/// as unobservable.
const RANK_EPSILON: f64 = 1e-12;

/// Errors produced by the least-squares solvers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    /// Design matrix and observation vector disagree on the number of rows
    #[error("design matrix has {rows} rows but {observations} observations were given")]
    DimensionMismatch { rows: usize, observations: usize },

    /// Weight vector length does not match the number of observations
    #[error("{weights} weights given for {rows} observations")]
    WeightMismatch { rows: usize, weights: usize },

    /// A weight is negative or not finite
    #[error("invalid weight {weight} at observation {index}")]
    InvalidWeight { index: usize, weight: f64 },

    /// Fewer observations than unknowns
    #[error("underdetermined system: {rows} observations for {unknowns} unknowns")]
    Underdetermined { rows: usize, unknowns: usize },

    /// The design matrix does not have full column rank
    #[error("singular system: rank {rank} for {unknowns} unknowns")]
    Singular { rank: usize, unknowns: usize },
}

/// Solution of a least-squares problem
#[derive(Debug, Clone)]
pub struct LeastSquaresSolution {
    /// Solved coefficients, one per design column
    pub coefficients: DVector<f64>,
    /// Unweighted residuals `b - A·x`, one per observation
    pub residuals: DVector<f64>,
}

impl LeastSquaresSolution {
    /// Root-mean-square of the residuals
    pub fn rms_residual(&self) -> f64 {
        if self.residuals.is_empty() {
            return 0.0;
        }
        (self.residuals.norm_squared() / self.residuals.len() as f64).sqrt()
    }
}

/// Solve `design · x ≈ observations` by ordinary least squares.
///
/// # Arguments
/// * `design` - Design matrix with one row per observation
/// * `observations` - Observed values
///
/// # Returns
/// * `Ok(LeastSquaresSolution)` - Coefficients and residuals
/// * `Err(SolveError)` - On dimension mismatch or a rank-deficient design
pub fn least_squares(
    design: &DMatrix<f64>,
    observations: &DVector<f64>,
) -> Result<LeastSquaresSolution, SolveError> {
    let weights = DVector::from_element(design.nrows(), 1.0);
    weighted_least_squares(design, observations, &weights)
}

/// Solve `design · x ≈ observations` minimising `Σ wᵢ·rᵢ²`.
///
/// Each row of the system is scaled by `√wᵢ` and the scaled system is solved
/// through an SVD. Zero weights are allowed and remove an observation from the
/// fit, which can make the system underdetermined.
pub fn weighted_least_squares(
    design: &DMatrix<f64>,
    observations: &DVector<f64>,
    weights: &DVector<f64>,
) -> Result<LeastSquaresSolution, SolveError> {
    let (rows, unknowns) = design.shape();

    if observations.len() != rows {
        return Err(SolveError::DimensionMismatch {
            rows,
            observations: observations.len(),
        });
    }
    if weights.len() != rows {
        return Err(SolveError::WeightMismatch {
            rows,
            weights: weights.len(),
        });
    }
    if let Some((index, &weight)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| !w.is_finite() || **w < 0.0)
    {
        return Err(SolveError::InvalidWeight { index, weight });
    }
    if unknowns == 0 || rows < unknowns {
        return Err(SolveError::Underdetermined { rows, unknowns });
    }

    let mut scaled = design.clone();
    let mut rhs = observations.clone();
    for i in 0..rows {
        let w = weights[i].sqrt();
        for j in 0..unknowns {
            scaled[(i, j)] *= w;
        }
        rhs[i] *= w;
    }

    let svd = scaled.svd(true, true);
    let largest = svd.singular_values.max();
    if largest <= 0.0 || !largest.is_finite() {
        return Err(SolveError::Singular { rank: 0, unknowns });
    }

    let eps = largest * RANK_EPSILON * rows.max(unknowns) as f64;
    let rank = svd.rank(eps);
    if rank < unknowns {
        return Err(SolveError::Singular { rank, unknowns });
    }

    let coefficients = svd
        .solve(&rhs, eps)
        .map_err(|_| SolveError::Singular { rank, unknowns })?;
    let residuals = observations - design * &coefficients;

    Ok(LeastSquaresSolution {
        coefficients,
        residuals,
    })
}
