//! Covariance kernels over geographic (and environmental) point sets.
//!
//! A [`CovarianceKernel`] is a pure function from two point sets and a
//! hyperparameter set to a covariance matrix. Two variants exist, matching
//! the [`Hyperparams`](crate::hyper::Hyperparams) enum:
//!
//! - **Spatial-only**: a Matérn-family kernel in great-circle distance on
//!   the unit sphere, plus a constant term for the integrated-out mean.
//! - **Spatial+environmental**: `spatial_frac * matern + env_frac *
//!   exp(-d²/2) + const_frac`, where `d` is a Mahalanobis distance over
//!   normalized environmental covariates and `const_frac = 1 -
//!   spatial_frac - env_frac`.
//!
//! # Smoothness degree
//!
//! The Matérn smoothness `diff_degree` is continuous. Closed forms exist at
//! the half-integers ν ∈ {1/2, 3/2, 5/2}; fractional degrees blend the two
//! bracketing closed forms convexly. A convex combination of positive
//! semi-definite kernels is itself a kernel, so the blended family stays
//! valid everywhere the random walk can reach.

use nalgebra::DMatrix;

use crate::error::{Error, Result};
use crate::hyper::{Hyperparams, SpatialEnvParams, SpatialParams};
use crate::points::PointSet;

const SQRT_3: f64 = 1.732_050_807_568_877_2;
const SQRT_5: f64 = 2.236_067_977_499_79;

/// A covariance kernel bound to a validated hyperparameter set.
///
/// # Examples
///
/// ```
/// use latentfield::hyper::{Hyperparams, SpatialParams};
/// use latentfield::kernel::CovarianceKernel;
/// use latentfield::points::PointSet;
///
/// let params = Hyperparams::Spatial(SpatialParams::new(1.0, 0.5, 1.5));
/// let kernel = CovarianceKernel::new(params).unwrap();
/// let pts = PointSet::spatial(&[[0.0, 0.0], [0.3, 0.1]]).unwrap();
/// let cov = kernel.evaluate_symmetric(&pts).unwrap();
/// assert_eq!(cov.nrows(), 2);
/// assert!(cov[(0, 1)] > 0.0);
/// ```
#[derive(Clone, Debug)]
pub struct CovarianceKernel {
    params: Hyperparams,
    /// Eigenvector basis of the environmental metric, precomputed from the
    /// Givens angles (identity-sized empty matrix for the spatial variant).
    env_basis: DMatrix<f64>,
}

impl CovarianceKernel {
    /// Binds a kernel to hyperparameters, validating them.
    ///
    /// # Errors
    ///
    /// Returns the validation error for inadmissible hyperparameters, e.g.
    /// [`Error::InvalidFractions`] when the variance fractions are negative
    /// or sum past one.
    pub fn new(params: Hyperparams) -> Result<Self> {
        params.validate()?;
        let env_basis = match &params {
            Hyperparams::Spatial(_) => DMatrix::identity(0, 0),
            Hyperparams::SpatialEnv(p) => p.basis(),
        };
        Ok(Self { params, env_basis })
    }

    /// The bound hyperparameters.
    #[must_use]
    pub fn params(&self) -> &Hyperparams {
        &self.params
    }

    /// Evaluates the cross-covariance matrix `K[i, j] = k(x_i, y_j)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EnvWidthMismatch`] if the two point sets carry
    /// different environmental widths, or [`Error::EnvMetricWidth`] if the
    /// environmental metric does not match the point sets.
    pub fn evaluate(&self, x: &PointSet, y: &PointSet) -> Result<DMatrix<f64>> {
        self.check_widths(x, y)?;
        Ok(DMatrix::from_fn(x.len(), y.len(), |row, col| {
            self.value(x, row, y, col)
        }))
    }

    /// Evaluates the symmetric covariance matrix of one point set, filling
    /// one triangle and mirroring it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EnvMetricWidth`] if the environmental metric does
    /// not match the point set.
    pub fn evaluate_symmetric(&self, x: &PointSet) -> Result<DMatrix<f64>> {
        self.check_widths(x, x)?;
        let n = x.len();
        let mut cov = DMatrix::zeros(n, n);
        for row in 0..n {
            for col in row..n {
                let v = self.value(x, row, x, col);
                cov[(row, col)] = v;
                cov[(col, row)] = v;
            }
        }
        Ok(cov)
    }

    fn check_widths(&self, x: &PointSet, y: &PointSet) -> Result<()> {
        if x.n_env() != y.n_env() {
            return Err(Error::EnvWidthMismatch {
                left: x.n_env(),
                right: y.n_env(),
            });
        }
        if let Hyperparams::SpatialEnv(p) = &self.params
            && p.env_scales.len() != x.n_env()
        {
            return Err(Error::EnvMetricWidth {
                params: p.env_scales.len(),
                points: x.n_env(),
            });
        }
        Ok(())
    }

    fn value(&self, xs: &PointSet, row: usize, ys: &PointSet, col: usize) -> f64 {
        let (lon1, lat1) = xs.geo(row);
        let (lon2, lat2) = ys.geo(col);
        let d_geo = great_circle(lon1, lat1, lon2, lat2);
        match &self.params {
            Hyperparams::Spatial(params) => spatial_value(params, d_geo),
            Hyperparams::SpatialEnv(params) => {
                let d_env_sq = self.mahalanobis_sq(params, xs, row, ys, col);
                let const_frac = 1.0 - params.spatial_frac - params.env_frac;
                params.spatial_frac * matern(d_geo / params.scale, params.diff_degree)
                    + params.env_frac * (-0.5 * d_env_sq).exp()
                    + const_frac
            }
        }
    }

    /// Squared Mahalanobis distance between the environmental covariates of
    /// two points, in the metric's eigenbasis.
    fn mahalanobis_sq(
        &self,
        params: &SpatialEnvParams,
        xs: &PointSet,
        row: usize,
        ys: &PointSet,
        col: usize,
    ) -> f64 {
        let channels = params.env_scales.len();
        let mut dist_sq = 0.0;
        for axis in 0..channels {
            // Component of the deviation along this eigenvector.
            let mut proj = 0.0;
            for chan in 0..channels {
                proj += self.env_basis[(chan, axis)] * (xs.env(row, chan) - ys.env(col, chan));
            }
            dist_sq += proj * proj / params.env_scales[axis];
        }
        dist_sq
    }
}

fn spatial_value(p: &SpatialParams, d: f64) -> f64 {
    p.amp * p.amp * matern(d / p.scale, p.diff_degree) + p.mean_variance
}

/// Great-circle distance between two points on the unit sphere, in radians,
/// via the haversine formula.
#[must_use]
pub fn great_circle(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * h.sqrt().min(1.0).asin()
}

/// Unit-amplitude Matérn correlation at scaled distance `t = d / scale`.
///
/// Exact at ν ∈ {1/2, 3/2, 5/2}; a convex blend of the bracketing closed
/// forms in between. Degrees outside `[1/2, 5/2]` clamp to the nearest
/// closed form.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn matern(t: f64, diff_degree: f64) -> f64 {
    if diff_degree <= 0.5 {
        return matern_half_integer(0, t);
    }
    if diff_degree >= 2.5 {
        return matern_half_integer(2, t);
    }
    let lower = (diff_degree - 0.5).floor() as usize;
    let w = diff_degree - (lower as f64 + 0.5);
    (1.0 - w) * matern_half_integer(lower, t) + w * matern_half_integer(lower + 1, t)
}

/// Matérn closed form at ν = p + 1/2.
fn matern_half_integer(p: usize, t: f64) -> f64 {
    match p {
        0 => (-t).exp(),
        1 => {
            let s = SQRT_3 * t;
            (1.0 + s) * (-s).exp()
        }
        _ => {
            let s = SQRT_5 * t;
            (1.0 + s + s * s / 3.0) * (-s).exp()
        }
    }
}
