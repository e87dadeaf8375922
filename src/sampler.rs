//! Adaptive Metropolis sampling of the low-rank latent field.
//!
//! [`AdaptiveLowRankSampler`] jointly updates the covariance
//! hyperparameters and the latent vector as one atomic unit. Each
//! iteration:
//!
//! 1. Draws a hyperparameter candidate by a random walk whose covariance
//!    is periodically re-estimated from the accepted-value history
//!    (adaptive Metropolis with the standard `2.38²/d` scaling).
//! 2. Refactorizes the kernel at the candidate and enforces the hard rank
//!    cap: an achieved rank below the limit is a zero-probability outcome.
//! 3. Carries the latent vector into the new basis through a
//!    [`BasisChange`], picking the forward or backward map by a coin flip
//!    so the joint proposal stays symmetric.
//! 4. Evaluates the latent Gaussian prior under the new factor plus the
//!    caller-supplied density callback, and accepts or rejects by the
//!    Metropolis rule.
//!
//! Every failure along the way (inadmissible parameters, factorization
//! failure, rank deficiency, singular transform, zero density) rejects the
//! proposal and leaves the accepted state untouched. A fresh
//! [`FieldState`] snapshot is committed only on acceptance.
//!
//! # Configuration
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `delay` | 1000 | Iterations before covariance adaptation begins |
//! | `interval` | 200 | Iterations between covariance re-estimations |
//! | `scales` | `max(\|θᵢ\|/10, 0.1)` | Initial per-dimension proposal scales |
//! | `proposal_covariance` | diagonal from `scales` | Full initial proposal covariance |
//! | `tolerance` | `1e-10` | Factorization truncation tolerance |
//! | `seed` | random | RNG seed for reproducibility |

use std::sync::Arc;

use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector};

use crate::cholesky::{FactorizationFailure, pivoted_cholesky};
use crate::density::LogDensity;
use crate::error::{Error, Result};
use crate::hyper::Hyperparams;
use crate::kernel::CovarianceKernel;
use crate::model::LatentFieldModel;
use crate::points::{EnvNormalizer, PointSet};
use crate::predict::{FieldPredictor, Link};
use crate::rng_util;
use crate::state::FieldState;
use crate::trace::{TraceSink, TraceValue};
use crate::transform::{BasisChange, TransformFailure};

/// Joint (prior x likelihood) density callback over `(θ, f)`.
///
/// The sampler adds the latent Gaussian prior under the current factor
/// itself; the callback supplies everything else (hyperparameter priors
/// and the externally attached observation likelihood) and signals zero
/// probability with [`LogDensity::Zero`].
pub type DensityFn = dyn Fn(&Hyperparams, &DVector<f64>) -> LogDensity + Send + Sync;

/// Default number of iterations before adaptation begins.
const DEFAULT_DELAY: usize = 1000;
/// Default number of iterations between proposal-covariance updates.
const DEFAULT_INTERVAL: usize = 200;
/// Standard adaptive-Metropolis scaling, `2.38²`, divided by the dimension.
const AM_SCALING: f64 = 2.38 * 2.38;
/// Minimum accepted-history size before the empirical covariance is used.
const MIN_ADAPT_HISTORY: usize = 10;
/// Ridge added to the adapted covariance diagonal before factoring.
const ADAPT_RIDGE: f64 = 1e-12;
/// Floor for the auto-derived per-dimension proposal scales.
const MIN_AUTO_SCALE: f64 = 0.1;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a proposal was rejected.
#[derive(Clone, Debug, PartialEq)]
pub enum RejectReason {
    /// The proposed hyperparameters fell outside their admissible region.
    Inadmissible,
    /// The factorization at the proposed hyperparameters failed.
    Factorization(FactorizationFailure),
    /// The factorization achieved less than the rank limit.
    RankDeficient {
        /// The rank actually achieved.
        achieved: usize,
        /// The requested rank limit.
        limit: usize,
    },
    /// The basis-change transform could not be computed.
    Transform(TransformFailure),
    /// The joint density at the candidate is zero.
    ZeroDensity,
    /// The Metropolis accept test failed.
    MetropolisTest,
}

/// Outcome of one sampler iteration.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    /// The candidate was committed as the new accepted state.
    Accepted,
    /// The candidate was discarded; the accepted state is unchanged.
    Rejected(RejectReason),
}

/// Summary of a [`run`](AdaptiveLowRankSampler::run) call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunStats {
    /// Iterations executed.
    pub iterations: usize,
    /// Iterations that ended in acceptance.
    pub accepted: usize,
}

impl RunStats {
    /// Fraction of iterations accepted.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn acceptance_rate(&self) -> f64 {
        if self.iterations == 0 {
            0.0
        } else {
            self.accepted as f64 / self.iterations as f64
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring an [`AdaptiveLowRankSampler`].
///
/// Created by [`LatentFieldModel::into_sampler`]. All options have
/// defaults; see the module docs for the table.
pub struct SamplerBuilder {
    model: LatentFieldModel,
    density: Box<DensityFn>,
    delay: Option<usize>,
    interval: Option<usize>,
    seed: Option<u64>,
    scales: Option<Vec<f64>>,
    proposal_cov: Option<DMatrix<f64>>,
    tolerance: Option<f64>,
    trace: Option<Arc<dyn TraceSink>>,
    trace_predictions: Option<PointSet>,
}

impl SamplerBuilder {
    pub(crate) fn new(model: LatentFieldModel, density: Box<DensityFn>) -> Self {
        Self {
            model,
            density,
            delay: None,
            interval: None,
            seed: None,
            scales: None,
            proposal_cov: None,
            tolerance: None,
            trace: None,
            trace_predictions: None,
        }
    }

    /// Sets the number of iterations before adaptation begins.
    ///
    /// Default: 1000.
    #[must_use]
    pub fn delay(mut self, delay: usize) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sets the number of iterations between proposal-covariance updates.
    ///
    /// Default: 200.
    #[must_use]
    pub fn interval(mut self, interval: usize) -> Self {
        self.interval = Some(interval.max(1));
        self
    }

    /// Sets the random seed for reproducibility.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the initial per-dimension proposal scales.
    ///
    /// Default: `max(|θᵢ| / 10, 0.1)` per dimension.
    #[must_use]
    pub fn scales(mut self, scales: Vec<f64>) -> Self {
        self.scales = Some(scales);
        self
    }

    /// Sets a full initial proposal covariance, overriding `scales` for
    /// the non-adaptive phase.
    #[must_use]
    pub fn proposal_covariance(mut self, cov: DMatrix<f64>) -> Self {
        self.proposal_cov = Some(cov);
        self
    }

    /// Sets the factorization truncation tolerance.
    ///
    /// Default: [`crate::cholesky::DEFAULT_TOLERANCE`].
    #[must_use]
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    /// Attaches a trace sink; accepted `theta` and `latent` values are
    /// appended to it.
    #[must_use]
    pub fn trace(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace = Some(sink);
        self
    }

    /// Also traces predictor outputs at the given evaluation points on
    /// each acceptance.
    #[must_use]
    pub fn trace_predictions(mut self, points: PointSet) -> Self {
        self.trace_predictions = Some(points);
        self
    }

    /// Builds the configured sampler and evaluates the initial density.
    ///
    /// # Errors
    ///
    /// [`Error::ProposalCovarianceNotPositiveDefinite`] for an unusable
    /// user covariance, [`Error::ZeroInitialDensity`] if the joint density
    /// is zero at the model's initial state.
    pub fn build(self) -> Result<AdaptiveLowRankSampler> {
        let (points, normalizer, link, rank_limit, state) = self.model.into_parts();
        let dim = state.hyper().dim();

        let base_scales = match self.scales {
            Some(s) => {
                let mut v = DVector::zeros(dim);
                for i in 0..dim {
                    v[i] = s.get(i).copied().unwrap_or(MIN_AUTO_SCALE).abs().max(f64::MIN_POSITIVE);
                }
                v
            }
            None => {
                let theta = state.hyper().to_vector();
                DVector::from_fn(dim, |i, _| (theta[i].abs() / 10.0).max(MIN_AUTO_SCALE))
            }
        };

        let proposal_chol = match self.proposal_cov {
            Some(cov) => Cholesky::new(cov)
                .ok_or(Error::ProposalCovarianceNotPositiveDefinite)?
                .l(),
            None => DMatrix::from_diagonal(&base_scales),
        };

        let prior = state.factor().latent_log_density(state.latent());
        let external = (self.density)(state.hyper(), state.latent());
        let LogDensity::Finite(current_log_density) = prior + external else {
            return Err(Error::ZeroInitialDensity);
        };

        let rng = self
            .seed
            .map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);

        Ok(AdaptiveLowRankSampler {
            points,
            normalizer,
            link,
            rank_limit,
            state,
            density: self.density,
            current_log_density,
            rng,
            dim,
            base_scales,
            proposal_chol,
            delay: self.delay.unwrap_or(DEFAULT_DELAY),
            interval: self.interval.unwrap_or(DEFAULT_INTERVAL),
            tolerance: self.tolerance.unwrap_or(crate::cholesky::DEFAULT_TOLERANCE),
            history: Vec::new(),
            iterations: 0,
            accepted: 0,
            trace: self.trace,
            trace_predictions: self.trace_predictions,
        })
    }
}

// ---------------------------------------------------------------------------
// Sampler
// ---------------------------------------------------------------------------

/// Adaptive random-walk Metropolis sampler over the joint
/// (hyperparameters, latent vector) state.
///
/// Strictly sequential: each iteration depends on the previous accepted or
/// reverted state, so one sampler instance drives one chain. Independent
/// chains own independent samplers (and adaptation histories) and may run
/// on separate threads over the same immutable inputs.
///
/// # Examples
///
/// ```
/// use latentfield::hyper::{Hyperparams, SpatialParams};
/// use latentfield::model::LatentFieldModel;
/// use latentfield::points::PointSet;
/// use latentfield::LogDensity;
///
/// let interior = PointSet::spatial(&[[0.0, 0.0], [0.6, 0.1], [-0.2, 0.4]]).unwrap();
/// let exterior = PointSet::spatial(&[[1.0, -0.5], [-0.9, 0.8]]).unwrap();
/// let initial = Hyperparams::Spatial(SpatialParams::new(1.0, 0.8, 1.5));
///
/// let model = LatentFieldModel::builder(interior, exterior, 3, initial)
///     .seed(7)
///     .build()
///     .unwrap();
///
/// let mut sampler = model
///     .into_sampler(|_theta, _latent| LogDensity::Finite(0.0))
///     .seed(7)
///     .delay(10)
///     .interval(5)
///     .build()
///     .unwrap();
///
/// let stats = sampler.run(20);
/// assert_eq!(stats.iterations, 20);
/// ```
pub struct AdaptiveLowRankSampler {
    /// Combined, normalized point set (immutable for the sampler's life).
    points: PointSet,
    normalizer: Option<EnvNormalizer>,
    link: Link,
    rank_limit: usize,
    /// Last accepted state.
    state: FieldState,
    density: Box<DensityFn>,
    /// Cached joint log-density at the accepted state.
    current_log_density: f64,
    rng: fastrand::Rng,
    dim: usize,
    base_scales: DVector<f64>,
    /// Lower Cholesky factor of the proposal covariance.
    proposal_chol: DMatrix<f64>,
    delay: usize,
    interval: usize,
    tolerance: f64,
    /// Accepted hyperparameter vectors, for adaptation.
    history: Vec<DVector<f64>>,
    iterations: usize,
    accepted: usize,
    trace: Option<Arc<dyn TraceSink>>,
    trace_predictions: Option<PointSet>,
}

impl AdaptiveLowRankSampler {
    /// Runs one iteration: propose, judge, commit or revert.
    pub fn step(&mut self) -> StepOutcome {
        self.iterations += 1;
        let outcome = self.try_step();
        if matches!(outcome, StepOutcome::Accepted) {
            self.accepted += 1;
        }
        if self.iterations > self.delay && self.iterations % self.interval == 0 {
            self.adapt_proposal();
        }
        outcome
    }

    /// Runs `n` iterations and summarizes them.
    pub fn run(&mut self, n: usize) -> RunStats {
        let accepted_before = self.accepted;
        for _ in 0..n {
            self.step();
        }
        RunStats {
            iterations: n,
            accepted: self.accepted - accepted_before,
        }
    }

    /// The last accepted state.
    #[must_use]
    pub fn state(&self) -> &FieldState {
        &self.state
    }

    /// A shared snapshot of the last accepted state.
    #[must_use]
    pub fn snapshot(&self) -> Arc<FieldState> {
        Arc::new(self.state.clone())
    }

    /// A predictor frozen at the last accepted state.
    ///
    /// # Errors
    ///
    /// Propagates kernel binding errors; a sampler-produced state always
    /// succeeds.
    pub fn predictor(&self) -> Result<FieldPredictor> {
        FieldPredictor::new(self.snapshot(), self.normalizer.clone(), self.link)
    }

    /// The cached joint log-density at the accepted state.
    #[must_use]
    pub fn current_log_density(&self) -> f64 {
        self.current_log_density
    }

    /// Total iterations executed so far.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Lower Cholesky factor of the current proposal covariance.
    ///
    /// Starts from the configured scales and changes once adaptation kicks
    /// in; exposed for diagnostics.
    #[must_use]
    pub fn proposal_cholesky(&self) -> &DMatrix<f64> {
        &self.proposal_chol
    }

    /// Overall acceptance rate so far.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn acceptance_rate(&self) -> f64 {
        if self.iterations == 0 {
            0.0
        } else {
            self.accepted as f64 / self.iterations as f64
        }
    }

    // -----------------------------------------------------------------------
    // One proposal
    // -----------------------------------------------------------------------

    fn try_step(&mut self) -> StepOutcome {
        // 1. Random-walk draw in the hyperparameter vector space.
        let theta = self.state.hyper().to_vector();
        let z = DVector::from_fn(self.dim, |_, _| rng_util::standard_normal(&mut self.rng));
        let candidate_vec = &theta + &self.proposal_chol * z;
        let hyper = self.state.hyper().from_vector(&candidate_vec);
        if !hyper.is_admissible() {
            return StepOutcome::Rejected(RejectReason::Inadmissible);
        }

        // 2. Refactorize at the candidate.
        let Ok(kernel) = CovarianceKernel::new(hyper.clone()) else {
            return StepOutcome::Rejected(RejectReason::Inadmissible);
        };
        let Ok(cov) = kernel.evaluate_symmetric(&self.points) else {
            return StepOutcome::Rejected(RejectReason::Inadmissible);
        };
        let factor = match pivoted_cholesky(&cov, self.rank_limit, self.tolerance) {
            Ok(f) => f,
            Err(e) => return StepOutcome::Rejected(RejectReason::Factorization(e)),
        };
        if factor.rank() < self.rank_limit {
            return StepOutcome::Rejected(RejectReason::RankDeficient {
                achieved: factor.rank(),
                limit: self.rank_limit,
            });
        }

        // 3. Carry the latent vector into the new basis.
        let change = match BasisChange::between(self.state.factor(), &factor) {
            Ok(c) => c,
            Err(e) => return StepOutcome::Rejected(RejectReason::Transform(e)),
        };
        let latent = change.pick(&mut self.rng) * self.state.latent();

        // 4. Joint density at the candidate.
        let prior = factor.latent_log_density(&latent);
        let external = (self.density)(&hyper, &latent);
        let LogDensity::Finite(candidate_log_density) = prior + external else {
            return StepOutcome::Rejected(RejectReason::ZeroDensity);
        };

        // 5. Metropolis test; the proposal is symmetric by construction.
        let log_ratio = candidate_log_density - self.current_log_density;
        if log_ratio < 0.0 && self.rng.f64().ln() >= log_ratio {
            return StepOutcome::Rejected(RejectReason::MetropolisTest);
        }

        // Commit atomically as a fresh snapshot.
        let full_rank_points = self.points.subset(factor.full_rank_pivots());
        let Ok(state) = FieldState::new(hyper, factor, latent, full_rank_points) else {
            return StepOutcome::Rejected(RejectReason::ZeroDensity);
        };
        self.history.push(state.hyper().to_vector());
        self.current_log_density = candidate_log_density;
        self.state = state;
        trace_debug!(
            log_density = self.current_log_density,
            iteration = self.iterations,
            "proposal accepted"
        );
        self.record_acceptance();
        StepOutcome::Accepted
    }

    // -----------------------------------------------------------------------
    // Adaptation
    // -----------------------------------------------------------------------

    /// Re-estimates the proposal covariance from the accepted history,
    /// shrinking toward the initial diagonal scales when the estimate is
    /// degenerate.
    #[allow(clippy::cast_precision_loss)]
    fn adapt_proposal(&mut self) {
        if self.history.len() < MIN_ADAPT_HISTORY {
            return;
        }
        let scale = AM_SCALING / self.dim as f64;
        let base = DMatrix::from_diagonal(&self.base_scales.map(|s| s * s));
        let mut candidate = empirical_covariance(&self.history) * scale;
        for _ in 0..3 {
            let mut ridged = candidate.clone();
            for i in 0..self.dim {
                ridged[(i, i)] += ADAPT_RIDGE;
            }
            if let Some(chol) = Cholesky::new(ridged) {
                self.proposal_chol = chol.l();
                trace_info!(
                    history = self.history.len(),
                    iteration = self.iterations,
                    "proposal covariance adapted"
                );
                return;
            }
            candidate = candidate * 0.5 + &base * 0.5;
        }
        self.proposal_chol = DMatrix::from_diagonal(&self.base_scales);
    }

    fn record_acceptance(&mut self) {
        let Some(sink) = self.trace.clone() else {
            return;
        };
        sink.append(
            "theta",
            TraceValue::Vector(self.state.hyper().to_vector().iter().copied().collect()),
        );
        sink.append(
            "latent",
            TraceValue::Vector(self.state.latent().iter().copied().collect()),
        );
        if let Some(query) = self.trace_predictions.clone()
            && let Ok(predictor) = self.predictor()
            && let Ok(values) = predictor.predict(&query)
        {
            sink.append("prediction", TraceValue::Vector(values));
        }
    }
}

/// Unbiased empirical covariance of the accepted hyperparameter history.
#[allow(clippy::cast_precision_loss)]
fn empirical_covariance(history: &[DVector<f64>]) -> DMatrix<f64> {
    let n = history.len();
    let d = history[0].len();
    let mut mean = DVector::zeros(d);
    for h in history {
        mean += h;
    }
    mean /= n as f64;
    let mut cov = DMatrix::zeros(d, d);
    for h in history {
        let centered = h - &mean;
        cov += &centered * centered.transpose();
    }
    cov / (n as f64 - 1.0)
}
