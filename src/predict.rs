//! Field evaluation at arbitrary query points from a frozen state.
//!
//! A [`FieldPredictor`] holds a shared [`FieldState`] snapshot and
//! evaluates the fitted field by kriging: cross-covariance between the
//! query points and the full-rank points, dotted with the cached kriging
//! weights, passed through a [`Link`]. No refactorization happens per
//! query, so evaluating at many points is cheap.

use std::sync::Arc;

use nalgebra::DVector;

use crate::error::Result;
use crate::kernel::CovarianceKernel;
use crate::points::{EnvNormalizer, PointSet};
use crate::state::FieldState;

/// The closed set of link functions applied to the kriged field value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Link {
    /// The raw field value.
    Identity,
    /// The inverse-logit map to `(0, 1)`.
    #[default]
    Logistic,
    /// Hard threshold at zero: `1.0` for positive field values, else `0.0`.
    Threshold,
}

impl Link {
    /// Applies the link to one field value.
    #[must_use]
    pub fn apply(self, f: f64) -> f64 {
        match self {
            Self::Identity => f,
            Self::Logistic => 1.0 / (1.0 + (-f).exp()),
            Self::Threshold => {
                if f > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Kriging predictor over a frozen [`FieldState`] snapshot.
///
/// Environmental-aware models must hand the predictor the same
/// [`EnvNormalizer`] used at construction so query covariates are
/// normalized identically.
#[derive(Clone, Debug)]
pub struct FieldPredictor {
    state: Arc<FieldState>,
    kernel: CovarianceKernel,
    normalizer: Option<EnvNormalizer>,
    link: Link,
}

impl FieldPredictor {
    /// Builds a predictor over a state snapshot.
    ///
    /// # Errors
    ///
    /// Propagates hyperparameter validation errors when binding the kernel;
    /// a snapshot produced by the sampler always passes.
    pub fn new(
        state: Arc<FieldState>,
        normalizer: Option<EnvNormalizer>,
        link: Link,
    ) -> Result<Self> {
        let kernel = CovarianceKernel::new(state.hyper().clone())?;
        Ok(Self {
            state,
            kernel,
            normalizer,
            link,
        })
    }

    /// The snapshot this predictor evaluates.
    #[must_use]
    pub fn state(&self) -> &FieldState {
        &self.state
    }

    /// Evaluates the linked field at each query point.
    ///
    /// # Errors
    ///
    /// Returns a normalization or kernel width error if the query's
    /// environmental channels do not match the model's.
    pub fn predict(&self, query: &PointSet) -> Result<Vec<f64>> {
        let latent = self.predict_latent(query)?;
        Ok(latent.iter().map(|&f| self.link.apply(f)).collect())
    }

    /// Evaluates the raw (unlinked) kriged field at each query point.
    ///
    /// # Errors
    ///
    /// Same contract as [`FieldPredictor::predict`].
    pub fn predict_latent(&self, query: &PointSet) -> Result<DVector<f64>> {
        let normalized;
        let query = match &self.normalizer {
            Some(nz) => {
                normalized = nz.apply(query)?;
                &normalized
            }
            None => query,
        };
        let cross = self
            .kernel
            .evaluate(query, self.state.full_rank_points())?;
        Ok(cross * self.state.krige_weights())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_values() {
        assert!((Link::Identity.apply(0.7) - 0.7).abs() < 1e-15);
        assert!((Link::Logistic.apply(0.0) - 0.5).abs() < 1e-15);
        assert!((Link::Threshold.apply(0.5) - 1.0).abs() < f64::EPSILON);
        assert!(Link::Threshold.apply(-0.5).abs() < f64::EPSILON);
        assert!(Link::Threshold.apply(0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_logistic_is_monotone() {
        let lo = Link::Logistic.apply(-2.0);
        let hi = Link::Logistic.apply(2.0);
        assert!(lo < 0.5 && hi > 0.5);
        assert!((lo + hi - 1.0).abs() < 1e-12, "logistic is symmetric");
    }
}
