//! Point sets and environmental covariate handling.
//!
//! A [`PointSet`] is an ordered, immutable collection of coordinate vectors.
//! The first two columns are geographic longitude/latitude in **radians**;
//! any further columns are environmental covariate channels. Environmental
//! channels are normalized (subtract mean, divide by standard deviation,
//! per channel) through an [`EnvNormalizer`] built from externally supplied
//! statistics, and the same normalizer must be reapplied to query points at
//! prediction time.

use nalgebra::DMatrix;

use crate::error::{Error, Result};

/// Number of geographic coordinate columns (longitude, latitude).
pub const GEO_DIMS: usize = 2;

/// An ordered, immutable set of points: geographic coordinates in radians
/// with optional environmental covariate channels appended.
///
/// # Examples
///
/// ```
/// use latentfield::points::PointSet;
///
/// let pts = PointSet::spatial(&[[0.0, 0.0], [0.5, -0.2]]).unwrap();
/// assert_eq!(pts.len(), 2);
/// assert_eq!(pts.n_env(), 0);
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PointSet {
    /// `n x (GEO_DIMS + n_env)` coordinate matrix.
    coords: DMatrix<f64>,
    /// Number of environmental channels.
    n_env: usize,
}

impl PointSet {
    /// Creates a spatial-only point set from `[lon, lat]` pairs in radians.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyPointSet`] if `lonlat` is empty.
    pub fn spatial(lonlat: &[[f64; 2]]) -> Result<Self> {
        if lonlat.is_empty() {
            return Err(Error::EmptyPointSet);
        }
        let coords = DMatrix::from_fn(lonlat.len(), GEO_DIMS, |i, j| lonlat[i][j]);
        Ok(Self { coords, n_env: 0 })
    }

    /// Creates a point set with environmental covariates.
    ///
    /// `env` must have one row per point; its columns become the
    /// environmental channels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyPointSet`] if `lonlat` is empty, or
    /// [`Error::EnvRowCountMismatch`] if `env` has a different row count.
    pub fn with_env(lonlat: &[[f64; 2]], env: &DMatrix<f64>) -> Result<Self> {
        if lonlat.is_empty() {
            return Err(Error::EmptyPointSet);
        }
        if env.nrows() != lonlat.len() {
            return Err(Error::EnvRowCountMismatch {
                points: lonlat.len(),
                rows: env.nrows(),
            });
        }
        let n_env = env.ncols();
        let coords = DMatrix::from_fn(lonlat.len(), GEO_DIMS + n_env, |i, j| {
            if j < GEO_DIMS {
                lonlat[i][j]
            } else {
                env[(i, j - GEO_DIMS)]
            }
        });
        Ok(Self { coords, n_env })
    }

    /// Creates a point set directly from a coordinate matrix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyPointSet`] for a matrix with no rows, or
    /// [`Error::CoordinateWidth`] if the column count is not
    /// `GEO_DIMS + n_env`.
    pub fn from_matrix(coords: DMatrix<f64>, n_env: usize) -> Result<Self> {
        if coords.nrows() == 0 {
            return Err(Error::EmptyPointSet);
        }
        if coords.ncols() != GEO_DIMS + n_env {
            return Err(Error::CoordinateWidth {
                expected: GEO_DIMS + n_env,
                got: coords.ncols(),
            });
        }
        Ok(Self { coords, n_env })
    }

    /// Stacks two point sets, `top` above `bottom`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EnvWidthMismatch`] if the environmental widths differ.
    pub fn stack(top: &Self, bottom: &Self) -> Result<Self> {
        if top.n_env != bottom.n_env {
            return Err(Error::EnvWidthMismatch {
                left: top.n_env,
                right: bottom.n_env,
            });
        }
        let n_top = top.len();
        let coords = DMatrix::from_fn(n_top + bottom.len(), top.width(), |i, j| {
            if i < n_top {
                top.coords[(i, j)]
            } else {
                bottom.coords[(i - n_top, j)]
            }
        });
        Ok(Self {
            coords,
            n_env: top.n_env,
        })
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.coords.nrows()
    }

    /// Returns `true` if the set contains no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coords.nrows() == 0
    }

    /// Number of environmental channels.
    #[must_use]
    pub fn n_env(&self) -> usize {
        self.n_env
    }

    /// Total coordinate width, `GEO_DIMS + n_env`.
    #[must_use]
    pub fn width(&self) -> usize {
        self.coords.ncols()
    }

    /// The raw coordinate matrix.
    #[must_use]
    pub fn coords(&self) -> &DMatrix<f64> {
        &self.coords
    }

    /// Longitude and latitude of point `i`, in radians.
    #[must_use]
    pub fn geo(&self, i: usize) -> (f64, f64) {
        (self.coords[(i, 0)], self.coords[(i, 1)])
    }

    /// Environmental channel `c` of point `i`.
    #[must_use]
    pub fn env(&self, i: usize, c: usize) -> f64 {
        self.coords[(i, GEO_DIMS + c)]
    }

    /// A new point set containing the given rows, in the given order.
    #[must_use]
    pub fn subset(&self, indices: &[usize]) -> Self {
        let coords = DMatrix::from_fn(indices.len(), self.width(), |i, j| {
            self.coords[(indices[i], j)]
        });
        Self {
            coords,
            n_env: self.n_env,
        }
    }
}

/// Per-channel normalization constants for environmental covariates.
///
/// Built from externally supplied means and standard deviations; the same
/// normalizer is applied to the model's point set at construction and to
/// query points at prediction time.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnvNormalizer {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl EnvNormalizer {
    /// Creates a normalizer from per-channel means and standard deviations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NormalizerWidthMismatch`] if the two vectors differ
    /// in length, or [`Error::InvalidStd`] if any standard deviation is not
    /// strictly positive.
    pub fn new(means: Vec<f64>, stds: Vec<f64>) -> Result<Self> {
        if means.len() != stds.len() {
            return Err(Error::NormalizerWidthMismatch {
                expected: means.len(),
                got: stds.len(),
            });
        }
        for (channel, &value) in stds.iter().enumerate() {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::InvalidStd { channel, value });
            }
        }
        Ok(Self { means, stds })
    }

    /// Number of environmental channels this normalizer covers.
    #[must_use]
    pub fn n_channels(&self) -> usize {
        self.means.len()
    }

    /// Applies the normalization to every environmental channel of `points`,
    /// leaving the geographic columns untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NormalizerWidthMismatch`] if `points` carries a
    /// different number of environmental channels.
    pub fn apply(&self, points: &PointSet) -> Result<PointSet> {
        if points.n_env() != self.n_channels() {
            return Err(Error::NormalizerWidthMismatch {
                expected: self.n_channels(),
                got: points.n_env(),
            });
        }
        let mut coords = points.coords.clone();
        for c in 0..self.n_channels() {
            let col = GEO_DIMS + c;
            for i in 0..coords.nrows() {
                coords[(i, col)] = (coords[(i, col)] - self.means[c]) / self.stds[c];
            }
        }
        Ok(PointSet {
            coords,
            n_env: points.n_env,
        })
    }
}

/// A MaxEnt hinge feature: `max(x - knot, 0)` element-wise.
#[must_use]
pub fn hinge(x: &[f64], knot: f64) -> Vec<f64> {
    x.iter().map(|&v| (v - knot).max(0.0)).collect()
}

/// A MaxEnt step feature: `1` where `x >= knot`, `0` elsewhere.
#[must_use]
pub fn step(x: &[f64], knot: f64) -> Vec<f64> {
    x.iter()
        .map(|&v| if v < knot { 0.0 } else { 1.0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_preserves_order() {
        let a = PointSet::spatial(&[[0.0, 0.0]]).unwrap();
        let b = PointSet::spatial(&[[1.0, 1.0], [2.0, 2.0]]).unwrap();
        let stacked = PointSet::stack(&a, &b).unwrap();
        assert_eq!(stacked.len(), 3);
        assert_eq!(stacked.geo(0), (0.0, 0.0));
        assert_eq!(stacked.geo(2), (2.0, 2.0));
    }

    #[test]
    fn test_env_width_mismatch_rejected() {
        let a = PointSet::spatial(&[[0.0, 0.0]]).unwrap();
        let env = DMatrix::from_row_slice(1, 2, &[1.0, 2.0]);
        let b = PointSet::with_env(&[[0.0, 0.0]], &env).unwrap();
        assert!(matches!(
            PointSet::stack(&a, &b),
            Err(Error::EnvWidthMismatch { left: 0, right: 2 })
        ));
    }

    #[test]
    fn test_normalizer_roundtrip() {
        let env = DMatrix::from_row_slice(2, 1, &[10.0, 30.0]);
        let pts = PointSet::with_env(&[[0.0, 0.0], [0.1, 0.1]], &env).unwrap();
        let nz = EnvNormalizer::new(vec![20.0], vec![10.0]).unwrap();
        let normed = nz.apply(&pts).unwrap();
        assert!((normed.env(0, 0) + 1.0).abs() < 1e-12);
        assert!((normed.env(1, 0) - 1.0).abs() < 1e-12);
        // Geographic columns untouched.
        assert_eq!(normed.geo(1), (0.1, 0.1));
    }

    #[test]
    fn test_normalizer_rejects_bad_std() {
        assert!(matches!(
            EnvNormalizer::new(vec![0.0], vec![0.0]),
            Err(Error::InvalidStd { channel: 0, .. })
        ));
    }

    #[test]
    fn test_hinge_and_step() {
        assert_eq!(hinge(&[-1.0, 0.5, 2.0], 0.5), vec![0.0, 0.0, 1.5]);
        assert_eq!(step(&[-1.0, 0.5, 2.0], 0.5), vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_subset_reorders() {
        let pts = PointSet::spatial(&[[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]]).unwrap();
        let sub = pts.subset(&[2, 0]);
        assert_eq!(sub.geo(0), (2.0, 2.0));
        assert_eq!(sub.geo(1), (0.0, 0.0));
    }
}
