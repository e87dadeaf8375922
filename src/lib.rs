#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Low-rank latent Gaussian field sampler for sparse presence/background
//! observations. The crate fits a spatial (optionally spatial+environmental)
//! latent field through a rank-limited covariance approximation sampled by
//! an adaptive Metropolis chain: a pivoted partial Cholesky bounds the cost
//! of each covariance evaluation, and a minimal-squared-error basis change
//! carries the latent vector across factorizations whose pivot order
//! changes from iteration to iteration — keeping the joint proposal
//! symmetric, so detailed balance holds without Jacobian corrections.
//!
//! # Getting Started
//!
//! Fit a field and evaluate it — construction, sampling, prediction:
//!
//! ```
//! use latentfield::prelude::*;
//!
//! let interior = PointSet::spatial(&[[0.0, 0.0], [0.6, 0.1], [-0.2, 0.4]]).unwrap();
//! let exterior = PointSet::spatial(&[[1.0, -0.5], [-0.9, 0.8]]).unwrap();
//! let initial = Hyperparams::Spatial(SpatialParams::new(1.0, 0.8, 1.5));
//!
//! let model = LatentFieldModel::builder(interior, exterior, 3, initial)
//!     .link(Link::Logistic)
//!     .seed(42)
//!     .build()
//!     .unwrap();
//!
//! let mut sampler = model
//!     .into_sampler(|_theta, _latent| LogDensity::Finite(0.0))
//!     .seed(42)
//!     .build()
//!     .unwrap();
//!
//! sampler.run(50);
//!
//! let predictor = sampler.predictor().unwrap();
//! let query = PointSet::spatial(&[[0.1, 0.1]]).unwrap();
//! let p = predictor.predict(&query).unwrap();
//! assert!(p[0] > 0.0 && p[0] < 1.0);
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`PointSet`] | Ordered coordinates: lon/lat in radians plus optional environmental channels. |
//! | [`Hyperparams`] | The covariance hyperparameter vector θ, in one of two closed variants. |
//! | [`CovarianceKernel`] | Pure function from two point sets and θ to a covariance matrix. |
//! | [`PivotedFactor`] | Pivoted, rank-limited Cholesky factor paired with its pivot permutation. |
//! | [`BasisChange`](transform::BasisChange) | Minimal-squared-error latent maps between two factorizations. |
//! | [`FieldState`] | One atomic (θ, pivot/factor, latent) snapshot. |
//! | [`AdaptiveLowRankSampler`] | Adaptive Metropolis chain over the joint state. |
//! | [`FieldPredictor`] | Kriging evaluation of a frozen state at query points. |
//!
//! # Failure model
//!
//! Numerical trouble during a proposal — a non-positive Schur complement, a
//! singular Gram matrix, an under-rank factorization, a zero density — is
//! never an error: it is a [`LogDensity::Zero`]-style outcome that rejects
//! the proposal and leaves the accepted state bit-for-bit intact. Input
//! contract violations (mismatched widths, out-of-range fractions, bad rank
//! limits) are fatal [`Error`]s at construction time.
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `serde` | `Serialize`/`Deserialize` on public value types | off |
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at accept/reject and adaptation points | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

pub mod cholesky;
mod density;
mod error;
pub mod hyper;
pub mod kernel;
pub mod model;
pub mod points;
pub mod predict;
mod rng_util;
pub mod sampler;
pub mod state;
pub mod trace;
pub mod transform;

pub use cholesky::{DEFAULT_TOLERANCE, FactorizationFailure, PivotedFactor, pivoted_cholesky};
pub use density::LogDensity;
pub use error::{Error, Result};
pub use hyper::{Hyperparams, SpatialEnvParams, SpatialParams};
pub use kernel::CovarianceKernel;
pub use model::{LatentFieldModel, ModelBuilder};
pub use points::{EnvNormalizer, PointSet};
pub use predict::{FieldPredictor, Link};
pub use sampler::{AdaptiveLowRankSampler, RejectReason, RunStats, SamplerBuilder, StepOutcome};
pub use state::FieldState;
pub use trace::{MemoryTrace, TraceSink, TraceValue};
pub use transform::{BasisChange, TransformFailure};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use latentfield::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cholesky::{PivotedFactor, pivoted_cholesky};
    pub use crate::density::LogDensity;
    pub use crate::error::{Error, Result};
    pub use crate::hyper::{Hyperparams, SpatialEnvParams, SpatialParams};
    pub use crate::kernel::CovarianceKernel;
    pub use crate::model::LatentFieldModel;
    pub use crate::points::{EnvNormalizer, PointSet};
    pub use crate::predict::{FieldPredictor, Link};
    pub use crate::sampler::{AdaptiveLowRankSampler, RejectReason, RunStats, StepOutcome};
    pub use crate::state::FieldState;
    pub use crate::trace::{MemoryTrace, TraceSink, TraceValue};
    pub use crate::transform::BasisChange;
}
