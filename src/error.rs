//! Error types for limit checkers.
//!
//! A denied permit is not an error: checkers return `Ok(false)` for that. Errors are
//! reserved for misconfiguration ([`LimitError`]) and for failing to reach a decision
//! at all ([`CheckError`]).
use crate::Limit;
use std::time::Duration;

/// Boxed store failure carried inside [`CheckError::Store`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Construction-time configuration errors. These never reach the concurrency logic.
#[derive(Debug, thiserror::Error)]
pub enum LimitError {
    /// Ceiling below the unlimited sentinel (-1).
    #[error("invalid limit {max_value}: must be >= -1")]
    InvalidLimit { max_value: i64 },
    /// Persistent checkers need a non-empty counter key.
    #[error("counter key must not be empty")]
    EmptyKey,
    /// No limit is configured for the requested action.
    #[error("no limit configured for action '{action}'")]
    UnknownAction { action: String },
    /// The limits document could not be parsed.
    #[error("invalid limits config: {0}")]
    Config(#[from] serde_json::Error),
}

/// Failure to decide whether a permit is available.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// The counter store failed (network, timeout, unavailability).
    #[error("counter store failed for key '{key}': {source}")]
    Store {
        key: String,
        #[source]
        source: BoxError,
    },
    /// The caller's deadline passed before the retry loop settled.
    #[error("limit check for key '{key}' timed out after {elapsed:?}")]
    Timeout { key: String, elapsed: Duration },
    /// Every attempt lost the optimistic race.
    #[error("limit check for key '{key}' gave up after {attempts} conflicting attempts")]
    Contention { key: String, attempts: usize },
}

impl CheckError {
    pub(crate) fn store<E>(key: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CheckError::Store { key: key.to_string(), source: Box::new(source) }
    }

    /// Counter key the failed check was running against.
    pub fn key(&self) -> &str {
        match self {
            Self::Store { key, .. } | Self::Timeout { key, .. } | Self::Contention { key, .. } => {
                key
            }
        }
    }

    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_contention(&self) -> bool {
        matches!(self, Self::Contention { .. })
    }
}

/// Outcome of running gated work through a checker.
#[derive(Debug, thiserror::Error)]
pub enum EnforcementError<E> {
    /// No permit was available; the work did not run.
    #[error("usage limit of {limit} reached")]
    LimitExceeded { limit: Limit },
    /// The checker could not decide.
    #[error(transparent)]
    Check(#[from] CheckError),
    /// The gated work ran and failed.
    #[error("{0}")]
    Inner(E),
}

impl<E> EnforcementError<E> {
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Self::LimitExceeded { .. })
    }

    pub fn is_check(&self) -> bool {
        matches!(self, Self::Check(_))
    }

    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}
