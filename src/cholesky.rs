//! Pivoted, rank-limited Cholesky factorization.
//!
//! [`pivoted_cholesky`] runs an incomplete Cholesky on a symmetric
//! positive semi-definite matrix: at each step it eliminates the remaining
//! point with the largest Schur-complement diagonal, stopping after the
//! rank limit or once the largest remaining diagonal falls below tolerance.
//! The greedy pivot choice is deterministic (ties break toward the lowest
//! original index), so a fixed random seed elsewhere reproduces the whole
//! chain.
//!
//! A negative pivot diagonal means the matrix is not numerically positive
//! semi-definite at the current hyperparameters. That is reported as a
//! [`FactorizationFailure`], which callers treat as a zero-probability
//! outcome — never as a panic.

use nalgebra::{DMatrix, DVector};

use crate::density::LogDensity;

/// Default relative truncation tolerance for the Schur diagonal.
pub const DEFAULT_TOLERANCE: f64 = 1e-10;

const LN_2PI: f64 = 1.837_877_066_409_345_6;

/// Failure of the pivoted factorization; a zero-probability outcome for
/// proposal steps, a construction error only at model build time.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum FactorizationFailure {
    /// A pivot's Schur-complement diagonal went negative beyond tolerance.
    #[error("covariance is not positive semi-definite: pivot {pivot} has Schur diagonal {diagonal:e}")]
    NotPositiveSemidefinite {
        /// Original index of the offending point.
        pivot: usize,
        /// The negative diagonal value.
        diagonal: f64,
    },

    /// The rank limit is zero or exceeds the matrix size.
    #[error("rank limit {limit} must be between 1 and the point count ({points})")]
    InvalidRankLimit {
        /// The requested rank limit.
        limit: usize,
        /// The matrix size.
        points: usize,
    },
}

/// A pivoted partial Cholesky factor.
///
/// `u` is `rank x n` with columns in pivoted order; the leading `rank`
/// columns form an upper-triangular square factor over the "full-rank"
/// points, and `uᵀ·u` approximates the covariance matrix in pivoted point
/// order. A factor is only meaningful paired with its pivot permutation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PivotedFactor {
    u: DMatrix<f64>,
    pivots: Vec<usize>,
    rank: usize,
}

/// Runs the pivoted partial Cholesky on `cov` up to `rank_limit`.
///
/// `tol` is relative to the largest initial diagonal: diagonals below
/// `tol * max_diag` truncate the factorization (achieved rank below the
/// limit), diagonals below `-tol * max_diag` fail it.
///
/// # Errors
///
/// [`FactorizationFailure::InvalidRankLimit`] for a rank limit of zero or
/// past the matrix size; [`FactorizationFailure::NotPositiveSemidefinite`]
/// when a pivot diagonal goes negative.
pub fn pivoted_cholesky(
    cov: &DMatrix<f64>,
    rank_limit: usize,
    tol: f64,
) -> Result<PivotedFactor, FactorizationFailure> {
    let n = cov.nrows();
    debug_assert_eq!(n, cov.ncols(), "covariance matrix must be square");
    if rank_limit == 0 || rank_limit > n {
        return Err(FactorizationFailure::InvalidRankLimit {
            limit: rank_limit,
            points: n,
        });
    }

    let mut pivots: Vec<usize> = (0..n).collect();
    // Schur-complement diagonal, permuted alongside `pivots`.
    let mut diag: Vec<f64> = (0..n).map(|i| cov[(i, i)]).collect();
    let mut u = DMatrix::zeros(rank_limit, n);

    let max_diag = diag.iter().fold(0.0_f64, |m, &d| m.max(d.abs())).max(1.0);
    let threshold = tol * max_diag;

    let mut rank = 0;
    for k in 0..rank_limit {
        // Greedy pivot: largest remaining diagonal, ties to the lowest
        // original index.
        let mut best = k;
        for j in (k + 1)..n {
            if diag[j] > diag[best] || (diag[j] >= diag[best] && pivots[j] < pivots[best]) {
                best = j;
            }
        }
        if diag[best] < -threshold {
            return Err(FactorizationFailure::NotPositiveSemidefinite {
                pivot: pivots[best],
                diagonal: diag[best],
            });
        }
        if diag[best] <= threshold {
            break;
        }
        pivots.swap(k, best);
        diag.swap(k, best);
        u.swap_columns(k, best);

        let pivot = diag[k].sqrt();
        u[(k, k)] = pivot;
        for m in (k + 1)..n {
            let mut s = cov[(pivots[k], pivots[m])];
            for i in 0..k {
                s -= u[(i, k)] * u[(i, m)];
            }
            let v = s / pivot;
            u[(k, m)] = v;
            diag[m] -= v * v;
        }
        rank = k + 1;
    }

    let u = if rank < rank_limit {
        u.rows(0, rank).clone_owned()
    } else {
        u
    };
    Ok(PivotedFactor { u, pivots, rank })
}

impl PivotedFactor {
    /// Reassembles a factor from a raw `rank x n` factor matrix and a pivot
    /// permutation, e.g. one computed by an external factorization.
    ///
    /// Returns `None` if the permutation does not cover the factor's
    /// columns exactly once or the row count exceeds the column count.
    #[must_use]
    pub fn from_parts(u: DMatrix<f64>, pivots: Vec<usize>) -> Option<Self> {
        let n = u.ncols();
        let rank = u.nrows();
        if rank > n || pivots.len() != n {
            return None;
        }
        let mut seen = vec![false; n];
        for &p in &pivots {
            if p >= n || seen[p] {
                return None;
            }
            seen[p] = true;
        }
        Some(Self { u, pivots, rank })
    }

    /// The achieved rank.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// The number of points the factorization covers.
    #[must_use]
    pub fn n_points(&self) -> usize {
        self.u.ncols()
    }

    /// The full pivot permutation; the first [`rank`](Self::rank) entries
    /// identify the full-rank points.
    #[must_use]
    pub fn pivots(&self) -> &[usize] {
        &self.pivots
    }

    /// Original indices of the full-rank points, in elimination order.
    #[must_use]
    pub fn full_rank_pivots(&self) -> &[usize] {
        &self.pivots[..self.rank]
    }

    /// The `rank x n` factor with columns in pivoted order.
    #[must_use]
    pub fn factor(&self) -> &DMatrix<f64> {
        &self.u
    }

    /// The leading `rank x rank` upper-triangular square factor.
    #[must_use]
    pub fn leading(&self) -> DMatrix<f64> {
        self.u.view((0, 0), (self.rank, self.rank)).clone_owned()
    }

    /// The factor with columns reordered to ascending original point index
    /// (the canonical order shared by any two factorizations of the same
    /// point set).
    #[must_use]
    pub fn sorted(&self) -> DMatrix<f64> {
        let mut sorted = DMatrix::zeros(self.rank, self.u.ncols());
        for (col, &orig) in self.pivots.iter().enumerate() {
            sorted.set_column(orig, &self.u.column(col));
        }
        sorted
    }

    /// The implied covariance `uᵀ·u` over all points, in pivoted order.
    #[must_use]
    pub fn gram(&self) -> DMatrix<f64> {
        self.u.transpose() * &self.u
    }

    /// Maps a whitened vector `z` to the latent field `f = uᵀ·z` at the
    /// full-rank points.
    #[must_use]
    pub fn unwhiten(&self, z: &DVector<f64>) -> DVector<f64> {
        self.leading().transpose() * z
    }

    /// Maps a latent vector back to its whitened representation by solving
    /// `uᵀ·z = f`. `None` if the triangular solve breaks down.
    #[must_use]
    pub fn whiten(&self, f: &DVector<f64>) -> Option<DVector<f64>> {
        self.leading().transpose().solve_lower_triangular(f)
    }

    /// Kriging weights `g = u⁻¹ · u⁻ᵀ · f`, the coefficients applied to
    /// cross-covariances when predicting at new locations.
    #[must_use]
    pub fn krige_weights(&self, f: &DVector<f64>) -> Option<DVector<f64>> {
        let y = self.whiten(f)?;
        self.leading().solve_upper_triangular(&y)
    }

    /// Log-density of `f` under the zero-mean Gaussian with covariance
    /// `uᵀ·u` at the full-rank points. [`LogDensity::Zero`] if `f` has the
    /// wrong length or the solve breaks down.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn latent_log_density(&self, f: &DVector<f64>) -> LogDensity {
        if f.len() != self.rank {
            return LogDensity::Zero;
        }
        let Some(z) = self.whiten(f) else {
            return LogDensity::Zero;
        };
        let mut log_det = 0.0;
        for i in 0..self.rank {
            log_det += self.u[(i, i)].ln();
        }
        LogDensity::finite(-0.5 * z.norm_squared() - log_det - 0.5 * self.rank as f64 * LN_2PI)
    }
}
