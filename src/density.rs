//! Explicit finite-or-zero log-density results.
//!
//! Every stage of a proposal (hyperparameter admissibility, factorization,
//! basis change, prior, likelihood) can conclude that the joint posterior
//! assigns the candidate zero probability. [`LogDensity`] carries that
//! outcome as a value instead of a `-inf` sentinel or an exception, so
//! callers check it eagerly at each stage.

/// A log-density that is either finite or an exact zero-probability marker.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LogDensity {
    /// A finite log-density value.
    Finite(f64),
    /// The zero-probability outcome; absorbs everything it is combined with.
    Zero,
}

impl LogDensity {
    /// Wraps a raw log-density, mapping any non-finite value to [`LogDensity::Zero`].
    #[must_use]
    pub fn finite(value: f64) -> Self {
        if value.is_finite() {
            Self::Finite(value)
        } else {
            Self::Zero
        }
    }

    /// Returns `true` for the zero-probability outcome.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        matches!(self, Self::Zero)
    }

    /// Returns the finite value, or `None` for the zero-probability outcome.
    #[must_use]
    pub const fn value(self) -> Option<f64> {
        match self {
            Self::Finite(v) => Some(v),
            Self::Zero => None,
        }
    }
}

impl core::ops::Add for LogDensity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::Finite(a), Self::Finite(b)) => Self::finite(a + b),
            _ => Self::Zero,
        }
    }
}

impl core::ops::AddAssign for LogDensity {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_absorbs() {
        assert_eq!(LogDensity::Finite(1.0) + LogDensity::Zero, LogDensity::Zero);
        assert_eq!(LogDensity::Zero + LogDensity::Finite(1.0), LogDensity::Zero);
    }

    #[test]
    fn test_finite_sums() {
        assert_eq!(
            LogDensity::Finite(1.5) + LogDensity::Finite(-0.5),
            LogDensity::Finite(1.0)
        );
    }

    #[test]
    fn test_non_finite_becomes_zero() {
        assert!(LogDensity::finite(f64::NEG_INFINITY).is_zero());
        assert!(LogDensity::finite(f64::NAN).is_zero());
        assert!(!LogDensity::finite(-1e300).is_zero());
    }
}
