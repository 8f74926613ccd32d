//! Counter and fraction primitives.

use crate::error::{ProgressError, Result};
use serde::{Deserialize, Serialize};

/// Signed unit counter.
///
/// Negative values are the indeterminate sentinel, not errors.
pub type UnitCount = i64;

/// Completed fraction, always within `[0.0, 1.0]` when produced by a node.
pub type Fraction = f64;

/// Minimum fractional change before a fraction notification fires.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Granularity(f64);

impl Granularity {
    /// The granularity used when none is given.
    pub const DEFAULT: Granularity = Granularity(0.01);

    /// Notify on every change.
    pub const FINEST: Granularity = Granularity(f64::MIN_POSITIVE);

    /// Validate a granularity, which must lie in (0, 1].
    pub fn new(value: f64) -> Result<Self> {
        if value > 0.0 && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(ProgressError::InvalidGranularity(value))
        }
    }

    /// Saturate any value into (0, 1]. NaN maps to the default.
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            Self::DEFAULT
        } else {
            Self(value.clamp(f64::MIN_POSITIVE, 1.0))
        }
    }

    /// Raw threshold value.
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Default for Granularity {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<f64> for Granularity {
    type Error = ProgressError;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Granularity> for f64 {
    fn from(granularity: Granularity) -> Self {
        granularity.0
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granularity_bounds() {
        assert!(Granularity::new(0.01).is_ok());
        assert!(Granularity::new(1.0).is_ok());
        assert!(matches!(
            Granularity::new(0.0),
            Err(ProgressError::InvalidGranularity(_))
        ));
        assert!(Granularity::new(1.5).is_err());
        assert!(Granularity::new(-0.1).is_err());
        assert!(Granularity::new(f64::NAN).is_err());
    }

    #[test]
    fn test_granularity_clamped() {
        assert_eq!(Granularity::clamped(3.0).get(), 1.0);
        assert!(Granularity::clamped(-1.0).get() > 0.0);
        assert_eq!(Granularity::clamped(f64::NAN), Granularity::DEFAULT);
        assert_eq!(Granularity::clamped(0.25).get(), 0.25);
    }

    #[test]
    fn test_granularity_deserialize_validates() {
        let ok: Granularity = serde_json::from_str("0.5").unwrap();
        assert_eq!(ok.get(), 0.5);
        assert!(serde_json::from_str::<Granularity>("2.0").is_err());
    }
}
