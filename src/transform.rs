//! Minimal-squared-error basis changes between factorizations.
//!
//! When the hyperparameters move, the pivot order and factor produced by
//! [`pivoted_cholesky`](crate::cholesky::pivoted_cholesky) change even
//! though they describe the same latent field. Re-drawing the latent vector
//! from scratch would break the reversibility of the outer Metropolis step,
//! so instead a [`BasisChange`] carries the vector across: it converts to
//! the independent unit normals underlying the current and proposed states,
//! computes the minimal-squared-error linear map between them, and
//! re-expresses ("bookends") the map back into the two pivot bases through
//! triangular solves.
//!
//! Both returned maps take an old-basis latent vector to the new basis.
//! [`BasisChange::forward`] is the minimal-MSE map of the move itself;
//! [`BasisChange::backward`] is the inverse of the minimal-MSE map of the
//! reverse move. The caller picks one by an unbiased coin flip each
//! iteration, which keeps the overall proposal symmetric with no Jacobian
//! correction.

use nalgebra::{DMatrix, DVector};
use nalgebra::linalg::Cholesky;

use crate::cholesky::PivotedFactor;

/// Failure to compute a basis change; a zero-probability outcome.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum TransformFailure {
    /// The two factorizations achieved different ranks.
    #[error("rank mismatch between factorizations: {old} vs {new}")]
    RankMismatch {
        /// Rank of the current factorization.
        old: usize,
        /// Rank of the proposed factorization.
        new: usize,
    },

    /// The two factorizations cover different point counts.
    #[error("point count mismatch between factorizations: {old} vs {new}")]
    PointCountMismatch {
        /// Point count of the current factorization.
        old: usize,
        /// Point count of the proposed factorization.
        new: usize,
    },

    /// A Gram matrix was numerically singular.
    #[error("Gram matrix is singular")]
    SingularGram,
}

/// The pair of old-basis-to-new-basis latent maps for one proposed move.
#[derive(Clone, Debug)]
pub struct BasisChange {
    forward: DMatrix<f64>,
    backward: DMatrix<f64>,
}

impl BasisChange {
    /// Computes the forward and backward maps between two factorizations of
    /// the same point set.
    ///
    /// # Errors
    ///
    /// [`TransformFailure::RankMismatch`] or
    /// [`TransformFailure::PointCountMismatch`] when the factor shapes are
    /// incompatible, [`TransformFailure::SingularGram`] when a Gram matrix
    /// cannot be solved.
    pub fn between(
        old: &PivotedFactor,
        new: &PivotedFactor,
    ) -> Result<Self, TransformFailure> {
        if old.rank() != new.rank() {
            return Err(TransformFailure::RankMismatch {
                old: old.rank(),
                new: new.rank(),
            });
        }
        if old.n_points() != new.n_points() {
            return Err(TransformFailure::PointCountMismatch {
                old: old.n_points(),
                new: new.n_points(),
            });
        }

        let u_old_sorted = old.sorted();
        let u_new_sorted = new.sorted();

        let cross = &u_old_sorted * u_new_sorted.transpose();
        let old_old = &u_old_sorted * u_old_sorted.transpose();
        let new_new = &u_new_sorted * u_new_sorted.transpose();

        let forward_sorted = Cholesky::new(new_new)
            .ok_or(TransformFailure::SingularGram)?
            .solve(&cross.transpose());
        let backward_sorted = Cholesky::new(old_old)
            .ok_or(TransformFailure::SingularGram)?
            .solve(&cross)
            .try_inverse()
            .ok_or(TransformFailure::SingularGram)?;

        let u_old_sq = old.leading();
        let u_new_sq = new.leading();
        let forward = bookend(&forward_sorted, &u_old_sq, &u_new_sq)
            .ok_or(TransformFailure::SingularGram)?;
        let backward = bookend(&backward_sorted, &u_old_sq, &u_new_sq)
            .ok_or(TransformFailure::SingularGram)?;

        Ok(Self { forward, backward })
    }

    /// The minimal-squared-error map from the old basis to the new.
    #[must_use]
    pub fn forward(&self) -> &DMatrix<f64> {
        &self.forward
    }

    /// The inverse of the reverse move's minimal-squared-error map, also
    /// applied old basis to new.
    #[must_use]
    pub fn backward(&self) -> &DMatrix<f64> {
        &self.backward
    }

    /// Picks one of the two maps by an unbiased coin flip.
    #[must_use]
    pub fn pick(&self, rng: &mut fastrand::Rng) -> &DMatrix<f64> {
        if rng.bool() {
            &self.forward
        } else {
            &self.backward
        }
    }

    /// Applies the forward map to a latent vector.
    #[must_use]
    pub fn apply_forward(&self, f: &DVector<f64>) -> DVector<f64> {
        &self.forward * f
    }

    /// Applies the backward map to a latent vector.
    #[must_use]
    pub fn apply_backward(&self, f: &DVector<f64>) -> DVector<f64> {
        &self.backward * f
    }
}

/// Re-expresses a sorted-basis map into the two pivot bases:
/// `u_toᵀ · map · u_from⁻ᵀ`, via a triangular solve against `u_from`.
fn bookend(
    map: &DMatrix<f64>,
    u_from: &DMatrix<f64>,
    u_to: &DMatrix<f64>,
) -> Option<DMatrix<f64>> {
    let t = u_from.solve_upper_triangular(&map.transpose())?;
    Some((t * u_to).transpose())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cholesky::{DEFAULT_TOLERANCE, pivoted_cholesky};

    fn psd_from_seed(n: usize, seed: u64) -> DMatrix<f64> {
        let mut rng = fastrand::Rng::with_seed(seed);
        let a = DMatrix::from_fn(n, n, |_, _| rng.f64() * 2.0 - 1.0);
        let mut k = &a * a.transpose();
        for i in 0..n {
            k[(i, i)] += 1.0;
        }
        k
    }

    #[test]
    fn test_identity_when_factor_unchanged() {
        let k = psd_from_seed(4, 1);
        let factor = pivoted_cholesky(&k, 4, DEFAULT_TOLERANCE).unwrap();
        let change = BasisChange::between(&factor, &factor).unwrap();
        let eye = DMatrix::identity(4, 4);
        assert!((change.forward() - &eye).abs().max() < 1e-9);
        assert!((change.backward() - &eye).abs().max() < 1e-9);
    }

    #[test]
    fn test_round_trip_through_reverse_move() {
        let k_a = psd_from_seed(4, 2);
        let k_b = psd_from_seed(4, 3);
        let a = pivoted_cholesky(&k_a, 4, DEFAULT_TOLERANCE).unwrap();
        let b = pivoted_cholesky(&k_b, 4, DEFAULT_TOLERANCE).unwrap();

        let there = BasisChange::between(&a, &b).unwrap();
        let back = BasisChange::between(&b, &a).unwrap();

        let f = DVector::from_vec(vec![0.7, -0.2, 1.4, 0.05]);
        let round = back.apply_forward(&there.apply_forward(&f));
        assert!(
            (&round - &f).norm() < 1e-8,
            "forward then reverse-forward should return the original, drift {}",
            (&round - &f).norm()
        );
    }

    #[test]
    fn test_forward_backward_mutual_inverse_at_full_rank() {
        // Equal rank and pivot sets spanning all points: the backward map
        // must be the exact inverse of the reverse move's forward map, and
        // here both coincide with the forward map itself.
        let k_a = psd_from_seed(3, 4);
        let k_b = psd_from_seed(3, 5);
        let a = pivoted_cholesky(&k_a, 3, DEFAULT_TOLERANCE).unwrap();
        let b = pivoted_cholesky(&k_b, 3, DEFAULT_TOLERANCE).unwrap();

        let change = BasisChange::between(&a, &b).unwrap();
        assert!(
            (change.forward() - change.backward()).abs().max() < 1e-8,
            "at full rank the two maps coincide"
        );

        let reverse = BasisChange::between(&b, &a).unwrap();
        let product = change.forward() * reverse.forward();
        let eye = DMatrix::identity(3, 3);
        assert!(
            (&product - &eye).abs().max() < 1e-8,
            "maps of opposite moves must be mutual inverses"
        );
    }

    #[test]
    fn test_mapped_latent_keeps_target_covariance() {
        // Two factorizations of the SAME covariance with different pivot
        // orders: f_new = forward · f_old has covariance u_newᵀ·u_new
        // exactly, so forward · cov_old · forwardᵀ = cov_new.
        let k = psd_from_seed(3, 6);
        let a = pivoted_cholesky(&k, 3, DEFAULT_TOLERANCE).unwrap();

        // Re-factor the same matrix under a hand-picked pivot order.
        let perm = [2usize, 0, 1];
        let k_perm = DMatrix::from_fn(3, 3, |i, j| k[(perm[i], perm[j])]);
        let chol = Cholesky::new(k_perm).unwrap();
        let b = crate::cholesky::PivotedFactor::from_parts(chol.l().transpose(), perm.to_vec())
            .unwrap();

        let change = BasisChange::between(&a, &b).unwrap();
        let cov_old = a.leading().transpose() * a.leading();
        let cov_new = b.leading().transpose() * b.leading();
        let mapped = change.forward() * cov_old * change.forward().transpose();
        assert!(
            (&mapped - &cov_new).abs().max() < 1e-8,
            "pushed-forward covariance should equal the proposed covariance"
        );
    }

    #[test]
    fn test_rank_mismatch_is_failure() {
        let k_full = psd_from_seed(3, 8);
        // Rank-1 matrix truncates below the limit.
        let ones = DMatrix::from_element(3, 3, 1.0);
        let full = pivoted_cholesky(&k_full, 3, DEFAULT_TOLERANCE).unwrap();
        let deficient = pivoted_cholesky(&ones, 3, DEFAULT_TOLERANCE).unwrap();
        assert_eq!(deficient.rank(), 1);
        assert!(matches!(
            BasisChange::between(&full, &deficient),
            Err(TransformFailure::RankMismatch { old: 3, new: 1 })
        ));
    }
}
