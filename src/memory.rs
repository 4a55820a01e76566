//! Process-local limit checker.
//!
//! Enforcement is a compare-and-set loop on one atomic counter: no locks, no I/O, and no
//! failure modes. Clones share the counter, so a checker can be handed to many tasks the
//! same way a semaphore handle is.

use crate::checker::LimitChecker;
use crate::error::CheckError;
use crate::Limit;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct InMemoryLimitChecker {
    limit: Limit,
    used: Arc<AtomicU64>,
}

impl InMemoryLimitChecker {
    pub fn new(limit: Limit) -> Self {
        Self { limit, used: Arc::new(AtomicU64::new(0)) }
    }

    /// Take one permit if the counter is still under the limit.
    pub fn try_consume(&self) -> bool {
        let Some(max) = self.limit.cap() else {
            return true;
        };

        let mut current = self.used.load(Ordering::Acquire);
        loop {
            if current >= max {
                tracing::debug!(target: "limitguard::memory", used = current, max, "permit denied");
                return false;
            }
            match self.used.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                // Lost the race; re-check against the value that won.
                Err(observed) => current = observed,
            }
        }
    }

    /// Release one permit, never going below zero.
    pub fn try_release(&self) -> bool {
        if self.limit.is_unlimited() {
            return false;
        }
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| current.checked_sub(1))
            .is_ok()
    }

    /// Permits currently held.
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }
}

#[async_trait]
impl LimitChecker for InMemoryLimitChecker {
    async fn check_and_consume(&self) -> Result<bool, CheckError> {
        Ok(self.try_consume())
    }

    async fn decrement(&self) -> Result<bool, CheckError> {
        Ok(self.try_release())
    }

    fn limit(&self) -> Limit {
        self.limit
    }
}
