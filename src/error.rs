use crate::cholesky::FactorizationFailure;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when the rank limit is zero or exceeds the point count.
    #[error("invalid rank limit: {limit} must be between 1 and the point count ({points})")]
    InvalidRankLimit {
        /// The requested rank limit.
        limit: usize,
        /// The number of points available.
        points: usize,
    },

    /// Returned when two point sets carry different environmental widths.
    #[error("environmental width mismatch: {left} vs {right} channels")]
    EnvWidthMismatch {
        /// Channel count of the first point set.
        left: usize,
        /// Channel count of the second point set.
        right: usize,
    },

    /// Returned when the environmental metric does not match the point set.
    #[error("environmental metric has {params} scales but points carry {points} channels")]
    EnvMetricWidth {
        /// Number of metric eigenvalue scales in the hyperparameters.
        params: usize,
        /// Number of environmental channels in the point set.
        points: usize,
    },

    /// Returned when a normalizer is applied to a point set of a different width.
    #[error("normalizer width mismatch: expected {expected} channels, got {got}")]
    NormalizerWidthMismatch {
        /// Channel count the normalizer was built for.
        expected: usize,
        /// Channel count of the point set.
        got: usize,
    },

    /// Returned when environmental rows do not line up with the coordinates.
    #[error("environmental row count mismatch: {points} points but {rows} environmental rows")]
    EnvRowCountMismatch {
        /// Number of coordinate points.
        points: usize,
        /// Number of environmental rows supplied.
        rows: usize,
    },

    /// Returned when a coordinate matrix has the wrong column count.
    #[error("coordinate width mismatch: expected {expected} columns, got {got}")]
    CoordinateWidth {
        /// The expected column count.
        expected: usize,
        /// The actual column count.
        got: usize,
    },

    /// Returned when a point set is constructed with no points.
    #[error("point set is empty")]
    EmptyPointSet,

    /// Returned when a per-channel standard deviation is not positive.
    #[error("invalid standard deviation for channel {channel}: {value} must be positive")]
    InvalidStd {
        /// The offending channel index.
        channel: usize,
        /// The offending value.
        value: f64,
    },

    /// Returned when a hyperparameter that must be positive is not.
    #[error("hyperparameter '{name}' must be positive, got {value}")]
    NonPositiveHyperparam {
        /// The hyperparameter name.
        name: &'static str,
        /// The offending value.
        value: f64,
    },

    /// Returned when variance fractions leave the unit simplex.
    #[error(
        "invalid variance fractions: spatial {spatial} + environmental {env} must lie in [0, 1]"
    )]
    InvalidFractions {
        /// The spatial fraction.
        spatial: f64,
        /// The environmental fraction.
        env: f64,
    },

    /// Returned when the Givens angle count does not match the metric size.
    #[error("environmental basis needs {expected} rotation angles, got {got}")]
    EnvAngleCount {
        /// The required angle count, `k * (k - 1) / 2`.
        expected: usize,
        /// The actual angle count.
        got: usize,
    },

    /// Returned when a latent vector does not match the factorization rank.
    #[error("latent vector length {got} does not match factor rank {rank}")]
    LatentLengthMismatch {
        /// The latent vector length.
        got: usize,
        /// The factorization rank.
        rank: usize,
    },

    /// Returned when the full-rank point subset does not match the factorization rank.
    #[error("full-rank point count {got} does not match factor rank {rank}")]
    PivotPointCountMismatch {
        /// The number of full-rank points supplied.
        got: usize,
        /// The factorization rank.
        rank: usize,
    },

    /// Returned when a factor's triangular solves break down.
    #[error("factor is numerically degenerate")]
    DegenerateFactor,

    /// Returned when a user-supplied proposal covariance has no Cholesky factor.
    #[error("proposal covariance is not positive definite")]
    ProposalCovarianceNotPositiveDefinite,

    /// Returned when the factorization at the initial hyperparameters fails.
    #[error("initial factorization failed: {0}")]
    InitialFactorization(#[from] FactorizationFailure),

    /// Returned when the initial factorization does not reach the rank limit.
    #[error("initial factorization reached rank {achieved}, rank limit is {limit}")]
    InitialRankDeficient {
        /// The rank actually achieved.
        achieved: usize,
        /// The requested rank limit.
        limit: usize,
    },

    /// Returned when the joint density is zero at the initial state.
    #[error("joint density is zero at the initial state")]
    ZeroInitialDensity,
}

pub type Result<T> = core::result::Result<T, Error>;
