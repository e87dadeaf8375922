//! The model factory: validated assembly of a latent field model.
//!
//! [`LatentFieldModel`] wires the pieces together from raw inputs: an
//! interior and an exterior/background point set, optional environmental
//! normalization statistics, a rank limit, initial hyperparameters, and a
//! link function. Construction validates every input contract up front
//! (dimension mismatches and out-of-range parameters are fatal here, not
//! at sampling time), runs the initial factorization, and draws the
//! initial latent vector — producing the [`FieldState`] a sampler starts
//! from.
//!
//! The observation likelihood is *not* manufactured here: it arrives as a
//! density callback when the model is handed to
//! [`into_sampler`](LatentFieldModel::into_sampler).

use std::sync::Arc;

use nalgebra::DVector;

use crate::cholesky::{DEFAULT_TOLERANCE, PivotedFactor, pivoted_cholesky};
use crate::density::LogDensity;
use crate::error::{Error, Result};
use crate::hyper::Hyperparams;
use crate::kernel::CovarianceKernel;
use crate::points::{EnvNormalizer, PointSet};
use crate::predict::{FieldPredictor, Link};
use crate::rng_util;
use crate::sampler::SamplerBuilder;
use crate::state::FieldState;

/// A fully constructed latent field model: the combined normalized point
/// set plus the initial accepted state.
///
/// # Examples
///
/// ```
/// use latentfield::hyper::{Hyperparams, SpatialParams};
/// use latentfield::model::LatentFieldModel;
/// use latentfield::points::PointSet;
///
/// let interior = PointSet::spatial(&[[0.0, 0.0], [0.5, 0.3]]).unwrap();
/// let exterior = PointSet::spatial(&[[-0.6, 0.2], [0.9, -0.4]]).unwrap();
/// let initial = Hyperparams::Spatial(SpatialParams::new(1.0, 0.7, 1.5));
///
/// let model = LatentFieldModel::builder(interior, exterior, 2, initial)
///     .seed(42)
///     .build()
///     .unwrap();
/// assert_eq!(model.latent().len(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct LatentFieldModel {
    points: PointSet,
    normalizer: Option<EnvNormalizer>,
    link: Link,
    rank_limit: usize,
    state: FieldState,
}

/// Builder for a [`LatentFieldModel`].
pub struct ModelBuilder {
    interior: PointSet,
    exterior: PointSet,
    rank_limit: usize,
    initial: Hyperparams,
    normalizer: Option<EnvNormalizer>,
    link: Link,
    seed: Option<u64>,
}

impl ModelBuilder {
    /// Attaches environmental normalization statistics, applied to the
    /// combined point set now and to query points at prediction time.
    #[must_use]
    pub fn normalizer(mut self, normalizer: EnvNormalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Sets the predictor link function.
    ///
    /// Default: [`Link::Logistic`].
    #[must_use]
    pub fn link(mut self, link: Link) -> Self {
        self.link = link;
        self
    }

    /// Sets the seed for the initial latent draw.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validates the inputs and assembles the model.
    ///
    /// # Errors
    ///
    /// [`Error::EnvWidthMismatch`] for interior/exterior covariate width
    /// disagreement, [`Error::InvalidRankLimit`] for a rank limit of zero
    /// or past the combined point count, hyperparameter validation errors
    /// for an inadmissible initial θ, [`Error::EnvMetricWidth`] when the
    /// environmental metric does not match the covariate width, and
    /// [`Error::InitialFactorization`] / [`Error::InitialRankDeficient`]
    /// when the initial covariance cannot be factored to full requested
    /// rank.
    pub fn build(self) -> Result<LatentFieldModel> {
        let combined = PointSet::stack(&self.interior, &self.exterior)?;
        if self.rank_limit == 0 || self.rank_limit > combined.len() {
            return Err(Error::InvalidRankLimit {
                limit: self.rank_limit,
                points: combined.len(),
            });
        }
        self.initial.validate()?;
        if let Hyperparams::SpatialEnv(p) = &self.initial
            && p.env_scales.len() != combined.n_env()
        {
            return Err(Error::EnvMetricWidth {
                params: p.env_scales.len(),
                points: combined.n_env(),
            });
        }

        let points = match &self.normalizer {
            Some(nz) => nz.apply(&combined)?,
            None => combined,
        };

        let kernel = CovarianceKernel::new(self.initial.clone())?;
        let cov = kernel.evaluate_symmetric(&points)?;
        let factor = pivoted_cholesky(&cov, self.rank_limit, DEFAULT_TOLERANCE)
            .map_err(Error::InitialFactorization)?;
        if factor.rank() < self.rank_limit {
            return Err(Error::InitialRankDeficient {
                achieved: factor.rank(),
                limit: self.rank_limit,
            });
        }

        let mut rng = self
            .seed
            .map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
        let z = DVector::from_fn(self.rank_limit, |_, _| rng_util::standard_normal(&mut rng));
        let latent = factor.unwhiten(&z);

        let full_rank_points = points.subset(factor.full_rank_pivots());
        let state = FieldState::new(self.initial, factor, latent, full_rank_points)?;

        Ok(LatentFieldModel {
            points,
            normalizer: self.normalizer,
            link: self.link,
            rank_limit: self.rank_limit,
            state,
        })
    }
}

impl LatentFieldModel {
    /// Starts a builder from the required inputs.
    #[must_use]
    pub fn builder(
        interior: PointSet,
        exterior: PointSet,
        rank_limit: usize,
        initial: Hyperparams,
    ) -> ModelBuilder {
        ModelBuilder {
            interior,
            exterior,
            rank_limit,
            initial,
            normalizer: None,
            link: Link::default(),
            seed: None,
        }
    }

    /// The combined, normalized point set.
    #[must_use]
    pub fn points(&self) -> &PointSet {
        &self.points
    }

    /// The rank limit.
    #[must_use]
    pub fn rank_limit(&self) -> usize {
        self.rank_limit
    }

    /// The initial hyperparameters.
    #[must_use]
    pub fn hyperparams(&self) -> &Hyperparams {
        self.state.hyper()
    }

    /// The covariance kernel bound to the current hyperparameters.
    ///
    /// # Errors
    ///
    /// Propagates hyperparameter validation errors; a built model always
    /// succeeds.
    pub fn kernel(&self) -> Result<CovarianceKernel> {
        CovarianceKernel::new(self.state.hyper().clone())
    }

    /// The initial pivoted factor.
    #[must_use]
    pub fn factor(&self) -> &PivotedFactor {
        self.state.factor()
    }

    /// The initial latent vector.
    #[must_use]
    pub fn latent(&self) -> &DVector<f64> {
        self.state.latent()
    }

    /// The initial state snapshot.
    #[must_use]
    pub fn state(&self) -> &FieldState {
        &self.state
    }

    /// A predictor frozen at the initial state.
    ///
    /// # Errors
    ///
    /// Propagates kernel binding errors; a built model always succeeds.
    pub fn predictor(&self) -> Result<FieldPredictor> {
        FieldPredictor::new(
            Arc::new(self.state.clone()),
            self.normalizer.clone(),
            self.link,
        )
    }

    /// Hands the model to a sampler builder, attaching the joint density
    /// callback the Metropolis step will consult.
    #[must_use]
    pub fn into_sampler<F>(self, density: F) -> SamplerBuilder
    where
        F: Fn(&Hyperparams, &DVector<f64>) -> LogDensity + Send + Sync + 'static,
    {
        SamplerBuilder::new(self, Box::new(density))
    }

    pub(crate) fn into_parts(
        self,
    ) -> (PointSet, Option<EnvNormalizer>, Link, usize, FieldState) {
        (
            self.points,
            self.normalizer,
            self.link,
            self.rank_limit,
            self.state,
        )
    }
}
