//! Covariance hyperparameters and their random-walk vector encoding.
//!
//! The kernel family is a closed two-variant set: spatial-only and
//! spatial+environmental. Each variant knows how to lay its free parameters
//! out as a flat vector for the adaptive random walk ([`Hyperparams::to_vector`] /
//! [`Hyperparams::from_vector`]) and how to judge its own admissibility.
//! [`Hyperparams::validate`] is the single rule: it is fatal at model
//! construction and a zero-probability outcome when a proposal lands outside
//! the admissible region.
//!
//! The environmental Mahalanobis metric is parameterized by eigenvalue
//! scales plus an orthogonal eigenvector basis encoded as Givens rotation
//! angles, so the whole metric random-walks over a flat real vector.

use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};

/// Default variance of the integrated-out constant mean on the spatial-only
/// kernel.
pub const DEFAULT_MEAN_VARIANCE: f64 = 1.0e4;

/// Hyperparameters of the spatial-only Matérn kernel.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpatialParams {
    /// Amplitude; the field's marginal standard deviation.
    pub amp: f64,
    /// Length-scale in radians of great-circle distance.
    pub scale: f64,
    /// Matérn smoothness degree.
    pub diff_degree: f64,
    /// Variance of the integrated-out constant mean, added to every kernel
    /// entry. Not part of the random walk.
    pub mean_variance: f64,
}

impl SpatialParams {
    /// Creates spatial-only hyperparameters with the default mean variance.
    #[must_use]
    pub fn new(amp: f64, scale: f64, diff_degree: f64) -> Self {
        Self {
            amp,
            scale,
            diff_degree,
            mean_variance: DEFAULT_MEAN_VARIANCE,
        }
    }

    /// Overrides the integrated-out-mean variance.
    #[must_use]
    pub fn with_mean_variance(mut self, mean_variance: f64) -> Self {
        self.mean_variance = mean_variance;
        self
    }
}

/// Hyperparameters of the spatial+environmental kernel.
///
/// Component amplitudes are fractions of a unit total variance: the
/// constant fraction is `1 - spatial_frac - env_frac` and the three must
/// stay in `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpatialEnvParams {
    /// Fraction of total variance carried by the spatial Matérn term.
    pub spatial_frac: f64,
    /// Fraction of total variance carried by the environmental term.
    pub env_frac: f64,
    /// Spatial length-scale in radians.
    pub scale: f64,
    /// Matérn smoothness degree of the spatial term.
    pub diff_degree: f64,
    /// Eigenvalue scales of the environmental Mahalanobis metric, one per
    /// normalized covariate channel.
    pub env_scales: Vec<f64>,
    /// Givens rotation angles encoding the metric's orthogonal eigenvector
    /// basis; length `k * (k - 1) / 2` for `k` channels.
    pub env_angles: Vec<f64>,
}

impl SpatialEnvParams {
    /// Creates spatial+environmental hyperparameters with a unit metric
    /// (all eigenvalue scales one, axis-aligned basis) over `n_env`
    /// channels.
    #[must_use]
    pub fn new(spatial_frac: f64, env_frac: f64, scale: f64, diff_degree: f64, n_env: usize) -> Self {
        Self {
            spatial_frac,
            env_frac,
            scale,
            diff_degree,
            env_scales: vec![1.0; n_env],
            env_angles: vec![0.0; n_env * n_env.saturating_sub(1) / 2],
        }
    }

    /// Overrides the metric eigenvalue scales.
    #[must_use]
    pub fn with_env_scales(mut self, env_scales: Vec<f64>) -> Self {
        self.env_scales = env_scales;
        self
    }

    /// Overrides the metric basis angles.
    #[must_use]
    pub fn with_env_angles(mut self, env_angles: Vec<f64>) -> Self {
        self.env_angles = env_angles;
        self
    }

    /// Number of Givens angles required for `k` channels.
    #[must_use]
    pub fn angle_count(k: usize) -> usize {
        k * k.saturating_sub(1) / 2
    }

    /// The orthogonal eigenvector basis, as a product of Givens rotations
    /// over the channel planes.
    #[must_use]
    pub fn basis(&self) -> DMatrix<f64> {
        let k = self.env_scales.len();
        let mut b = DMatrix::identity(k, k);
        let mut angles = self.env_angles.iter();
        for i in 0..k {
            for j in (i + 1)..k {
                let theta = angles.next().copied().unwrap_or(0.0);
                let (s, c) = theta.sin_cos();
                for r in 0..k {
                    let bi = b[(r, i)];
                    let bj = b[(r, j)];
                    b[(r, i)] = c * bi - s * bj;
                    b[(r, j)] = s * bi + c * bj;
                }
            }
        }
        b
    }
}

/// The closed set of kernel hyperparameter variants.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Hyperparams {
    /// Great-circle Matérn kernel with an integrated-out mean term.
    Spatial(SpatialParams),
    /// Mixture of a great-circle Matérn term, a Mahalanobis environmental
    /// term, and a constant term.
    SpatialEnv(SpatialEnvParams),
}

impl Hyperparams {
    /// Checks that every parameter lies in its admissible region.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint: positivity of amplitudes,
    /// scales, and smoothness; fractions inside the unit simplex; metric
    /// scales positive; the Givens angle count matching the channel count.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Spatial(p) => {
                check_positive("amp", p.amp)?;
                check_positive("scale", p.scale)?;
                check_positive("diff_degree", p.diff_degree)?;
                if !p.mean_variance.is_finite() || p.mean_variance < 0.0 {
                    return Err(Error::NonPositiveHyperparam {
                        name: "mean_variance",
                        value: p.mean_variance,
                    });
                }
                Ok(())
            }
            Self::SpatialEnv(p) => {
                check_positive("scale", p.scale)?;
                check_positive("diff_degree", p.diff_degree)?;
                let sum = p.spatial_frac + p.env_frac;
                if !sum.is_finite() || p.spatial_frac < 0.0 || p.env_frac < 0.0 || sum > 1.0 {
                    return Err(Error::InvalidFractions {
                        spatial: p.spatial_frac,
                        env: p.env_frac,
                    });
                }
                for &v in &p.env_scales {
                    check_positive("env_scale", v)?;
                }
                let expected = SpatialEnvParams::angle_count(p.env_scales.len());
                if p.env_angles.len() != expected {
                    return Err(Error::EnvAngleCount {
                        expected,
                        got: p.env_angles.len(),
                    });
                }
                for &angle in &p.env_angles {
                    if !angle.is_finite() {
                        return Err(Error::NonPositiveHyperparam {
                            name: "env_angle",
                            value: angle,
                        });
                    }
                }
                Ok(())
            }
        }
    }

    /// Returns `true` if [`Hyperparams::validate`] would succeed.
    ///
    /// Proposal-time counterpart of `validate`: an inadmissible proposed
    /// vector is a zero-probability outcome, not an error.
    #[must_use]
    pub fn is_admissible(&self) -> bool {
        self.validate().is_ok()
    }

    /// Number of environmental channels the variant expects (zero for
    /// spatial-only).
    #[must_use]
    pub fn n_env(&self) -> usize {
        match self {
            Self::Spatial(_) => 0,
            Self::SpatialEnv(p) => p.env_scales.len(),
        }
    }

    /// Dimension of the random-walk vector.
    #[must_use]
    pub fn dim(&self) -> usize {
        match self {
            Self::Spatial(_) => 3,
            Self::SpatialEnv(p) => 4 + p.env_scales.len() + p.env_angles.len(),
        }
    }

    /// Lays the free parameters out as a flat vector.
    ///
    /// Spatial: `[amp, scale, diff_degree]`. Spatial+environmental:
    /// `[spatial_frac, env_frac, scale, diff_degree, env_scales.., env_angles..]`.
    /// The spatial-only `mean_variance` is fixed and not encoded.
    #[must_use]
    pub fn to_vector(&self) -> DVector<f64> {
        match self {
            Self::Spatial(p) => DVector::from_vec(vec![p.amp, p.scale, p.diff_degree]),
            Self::SpatialEnv(p) => {
                let mut v = Vec::with_capacity(self.dim());
                v.push(p.spatial_frac);
                v.push(p.env_frac);
                v.push(p.scale);
                v.push(p.diff_degree);
                v.extend_from_slice(&p.env_scales);
                v.extend_from_slice(&p.env_angles);
                DVector::from_vec(v)
            }
        }
    }

    /// Rebuilds hyperparameters of the same variant from a flat vector.
    ///
    /// # Panics
    ///
    /// Panics if the vector length does not match [`Hyperparams::dim`];
    /// this indicates a bug in the caller, not a runtime error.
    #[must_use]
    pub fn from_vector(&self, v: &DVector<f64>) -> Self {
        assert_eq!(
            v.len(),
            self.dim(),
            "hyperparameter vector length mismatch"
        );
        match self {
            Self::Spatial(p) => Self::Spatial(SpatialParams {
                amp: v[0],
                scale: v[1],
                diff_degree: v[2],
                mean_variance: p.mean_variance,
            }),
            Self::SpatialEnv(p) => {
                let k = p.env_scales.len();
                let env_scales = v.as_slice()[4..4 + k].to_vec();
                let env_angles = v.as_slice()[4 + k..].to_vec();
                Self::SpatialEnv(SpatialEnvParams {
                    spatial_frac: v[0],
                    env_frac: v[1],
                    scale: v[2],
                    diff_degree: v[3],
                    env_scales,
                    env_angles,
                })
            }
        }
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::NonPositiveHyperparam { name, value });
    }
    Ok(())
}
