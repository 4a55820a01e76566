//! The capability shared by every checker.
//!
//! Callers pick an implementation by durability:
//! - [`InMemoryLimitChecker`](crate::InMemoryLimitChecker) for single-process enforcement.
//! - [`PersistentLimitChecker`](crate::PersistentLimitChecker) when several processes must
//!   share one limit through a [`CounterStore`](crate::CounterStore).
//!
//! Both answer the same two questions, so code written against `dyn LimitChecker` does not
//! change when the durability requirement does.

use crate::error::CheckError;
use crate::Limit;
use async_trait::async_trait;
use std::sync::Arc;

/// Consume and release permits against a [`Limit`].
#[async_trait]
pub trait LimitChecker: Send + Sync {
    /// Take one permit if the limit allows it.
    ///
    /// `Ok(false)` means the limit is reached. That is a normal outcome, not a fault.
    async fn check_and_consume(&self) -> Result<bool, CheckError>;

    /// Give one permit back.
    ///
    /// `Ok(false)` means nothing was consumed, so there was nothing to release.
    async fn decrement(&self) -> Result<bool, CheckError>;

    /// The ceiling this checker enforces.
    fn limit(&self) -> Limit;
}

#[async_trait]
impl<C> LimitChecker for Arc<C>
where
    C: LimitChecker + ?Sized,
{
    async fn check_and_consume(&self) -> Result<bool, CheckError> {
        (**self).check_and_consume().await
    }

    async fn decrement(&self) -> Result<bool, CheckError> {
        (**self).decrement().await
    }

    fn limit(&self) -> Limit {
        (**self).limit()
    }
}

#[async_trait]
impl<C> LimitChecker for Box<C>
where
    C: LimitChecker + ?Sized,
{
    async fn check_and_consume(&self) -> Result<bool, CheckError> {
        (**self).check_and_consume().await
    }

    async fn decrement(&self) -> Result<bool, CheckError> {
        (**self).decrement().await
    }

    fn limit(&self) -> Limit {
        (**self).limit()
    }
}
