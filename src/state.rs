//! The accepted-state snapshot of the latent field sampler.
//!
//! A [`FieldState`] is the immutable triple (hyperparameters, pivoted
//! factor, latent vector) plus two derived caches: the kriging weights and
//! the coordinates of the full-rank points. The sampler never mutates a
//! snapshot in place; a fresh one is produced on each acceptance, so the
//! accepted state stays bit-for-bit intact through any rejected proposal.

use nalgebra::DVector;

use crate::cholesky::PivotedFactor;
use crate::error::{Error, Result};
use crate::hyper::Hyperparams;
use crate::points::PointSet;

/// One atomic (hyperparameters, pivot/factor, latent vector) state.
///
/// Invariant: the latent vector is always consistent with the current
/// factor — its length equals the factor rank and the kriging weights are
/// derived from exactly this pair.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldState {
    hyper: Hyperparams,
    factor: PivotedFactor,
    latent: DVector<f64>,
    krige_weights: DVector<f64>,
    full_rank_points: PointSet,
}

impl FieldState {
    /// Assembles a snapshot, validating the shape invariants and caching
    /// the kriging weights.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LatentLengthMismatch`] or
    /// [`Error::PivotPointCountMismatch`] on shape violations, the
    /// hyperparameter validation error if `hyper` is inadmissible, and
    /// [`Error::DegenerateFactor`] if the kriging solve breaks down.
    pub fn new(
        hyper: Hyperparams,
        factor: PivotedFactor,
        latent: DVector<f64>,
        full_rank_points: PointSet,
    ) -> Result<Self> {
        hyper.validate()?;
        if latent.len() != factor.rank() {
            return Err(Error::LatentLengthMismatch {
                got: latent.len(),
                rank: factor.rank(),
            });
        }
        if full_rank_points.len() != factor.rank() {
            return Err(Error::PivotPointCountMismatch {
                got: full_rank_points.len(),
                rank: factor.rank(),
            });
        }
        let krige_weights = factor
            .krige_weights(&latent)
            .ok_or(Error::DegenerateFactor)?;
        Ok(Self {
            hyper,
            factor,
            latent,
            krige_weights,
            full_rank_points,
        })
    }

    /// The hyperparameters.
    #[must_use]
    pub fn hyper(&self) -> &Hyperparams {
        &self.hyper
    }

    /// The pivoted factor.
    #[must_use]
    pub fn factor(&self) -> &PivotedFactor {
        &self.factor
    }

    /// The latent field values at the full-rank points.
    #[must_use]
    pub fn latent(&self) -> &DVector<f64> {
        &self.latent
    }

    /// The cached kriging weights.
    #[must_use]
    pub fn krige_weights(&self) -> &DVector<f64> {
        &self.krige_weights
    }

    /// Coordinates of the full-rank points, in elimination order.
    #[must_use]
    pub fn full_rank_points(&self) -> &PointSet {
        &self.full_rank_points
    }
}
