//! The ceiling a checker enforces.
//!
//! A [`Limit`] is either a bounded count of simultaneously consumed permits or the
//! [`UNLIMITED`] sentinel. Values below the sentinel are rejected at construction, so
//! a `Limit` that exists is always valid.
//!
//! ```rust
//! use limitguard::Limit;
//!
//! let limit = Limit::new(10).unwrap();
//! assert_eq!(limit.cap(), Some(10));
//! assert!(Limit::new(-1).unwrap().is_unlimited());
//! assert!(Limit::new(-2).is_err());
//! ```

use crate::error::LimitError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw value meaning "no cap".
pub const UNLIMITED: i64 = -1;

/// Immutable permit ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Limit {
    max: Option<u64>,
}

impl Limit {
    /// Validate a raw ceiling. `-1` is unlimited, anything below fails.
    pub fn new(max_value: i64) -> Result<Self, LimitError> {
        match max_value {
            UNLIMITED => Ok(Self::unlimited()),
            v if v < UNLIMITED => Err(LimitError::InvalidLimit { max_value: v }),
            v => Ok(Self { max: Some(v as u64) }),
        }
    }

    /// A bounded limit. Zero is legal and denies everything.
    pub const fn bounded(max: u64) -> Self {
        Self { max: Some(max) }
    }

    pub const fn unlimited() -> Self {
        Self { max: None }
    }

    pub fn is_unlimited(&self) -> bool {
        self.max.is_none()
    }

    /// The ceiling, or `None` when unlimited.
    pub fn cap(&self) -> Option<u64> {
        self.max
    }

    /// The raw ceiling, with [`UNLIMITED`] for no cap. Saturates at `i64::MAX`.
    pub fn max_value(&self) -> i64 {
        match self.max {
            Some(v) => i64::try_from(v).unwrap_or(i64::MAX),
            None => UNLIMITED,
        }
    }

    /// Whether one more permit fits on top of `used`.
    pub fn admits(&self, used: u64) -> bool {
        self.max.map_or(true, |max| used < max)
    }
}

impl TryFrom<i64> for Limit {
    type Error = LimitError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Limit::new(value)
    }
}

impl From<Limit> for i64 {
    fn from(limit: Limit) -> Self {
        limit.max_value()
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(v) => write!(f, "{}", v),
            None => write!(f, "unlimited"),
        }
    }
}
