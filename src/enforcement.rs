//! Run gated work under a checker.
//!
//! Two flows are common enough to deserve helpers:
//! - Creating something limited: take a permit, run the work, and hand the permit back if
//!   the work fails ([`with_limit_check`]).
//! - Deleting something limited: run the work and release a permit once it succeeds
//!   ([`with_counter_decrement`]).

use crate::checker::LimitChecker;
use crate::error::EnforcementError;
use std::future::Future;

/// Consume a permit, then run `operation`.
///
/// Returns [`EnforcementError::LimitExceeded`] without running `operation` when no permit is
/// available. If `operation` fails the permit is released before the error is returned; a
/// failing release is logged and the operation's error still wins.
pub async fn with_limit_check<C, T, E, Fut, Op>(
    checker: &C,
    operation: Op,
) -> Result<T, EnforcementError<E>>
where
    C: LimitChecker + ?Sized,
    Fut: Future<Output = Result<T, E>>,
    Op: FnOnce() -> Fut,
{
    if !checker.check_and_consume().await? {
        return Err(EnforcementError::LimitExceeded { limit: checker.limit() });
    }

    match operation().await {
        Ok(value) => Ok(value),
        Err(e) => {
            match checker.decrement().await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(target: "limitguard::enforcement", "gated operation failed but no permit was left to release");
                }
                Err(release) => {
                    tracing::warn!(target: "limitguard::enforcement", key = %release.key(), error = %release, "failed to release permit after gated operation failed");
                }
            }
            Err(EnforcementError::Inner(e))
        }
    }
}

/// Run `operation`, then release one permit if it succeeded.
///
/// Releasing nothing (the counter was already at zero) is not an error. A checker fault
/// during the release is returned, since the work itself already succeeded and the caller
/// may want to reconcile the counter.
pub async fn with_counter_decrement<C, T, E, Fut, Op>(
    checker: &C,
    operation: Op,
) -> Result<T, EnforcementError<E>>
where
    C: LimitChecker + ?Sized,
    Fut: Future<Output = Result<T, E>>,
    Op: FnOnce() -> Fut,
{
    let value = operation().await.map_err(EnforcementError::Inner)?;
    if !checker.decrement().await? {
        tracing::debug!(target: "limitguard::enforcement", "nothing to release after gated deletion");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryLimitChecker, Limit};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn denied_work_never_runs() {
        let checker = InMemoryLimitChecker::new(Limit::bounded(0));
        let runs = AtomicUsize::new(0);
        let counter = &runs;

        let result = with_limit_check(&checker, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, io::Error>(())
        })
        .await;

        assert!(result.unwrap_err().is_limit_exceeded());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_work_hands_permit_back() {
        let checker = InMemoryLimitChecker::new(Limit::bounded(1));

        let result = with_limit_check(&checker, || async {
            Err::<(), _>(io::Error::new(io::ErrorKind::Other, "create failed"))
        })
        .await;

        assert_eq!(result.unwrap_err().into_inner().unwrap().to_string(), "create failed");
        assert_eq!(checker.used(), 0);
    }

    #[tokio::test]
    async fn successful_work_keeps_permit() {
        let checker = InMemoryLimitChecker::new(Limit::bounded(1));
        let value = with_limit_check(&checker, || async { Ok::<_, io::Error>(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(checker.used(), 1);
    }

    #[tokio::test]
    async fn deletion_releases_only_on_success() {
        let checker = InMemoryLimitChecker::new(Limit::bounded(2));
        checker.try_consume();
        checker.try_consume();

        let failed = with_counter_decrement(&checker, || async {
            Err::<(), _>(io::Error::new(io::ErrorKind::Other, "still referenced"))
        })
        .await;
        assert!(failed.is_err());
        assert_eq!(checker.used(), 2);

        with_counter_decrement(&checker, || async { Ok::<_, io::Error>(()) }).await.unwrap();
        assert_eq!(checker.used(), 1);
    }

    #[tokio::test]
    async fn deletion_with_empty_counter_is_fine() {
        let checker = InMemoryLimitChecker::new(Limit::bounded(2));
        let result = with_counter_decrement(&checker, || async { Ok::<_, io::Error>("gone") }).await;
        assert_eq!(result.unwrap(), "gone");
    }
}
