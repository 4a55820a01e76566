//! Store-backed limit checker.
//!
//! The counter lives in a [`CounterStore`] shared by every process enforcing the limit.
//! Nothing is cached between calls: each operation reads the record, decides, and writes back
//! with a guarded write. A guarded write that loses the race is not an error, the loop
//! simply re-reads and decides again.
//!
//! Semantics:
//! - The record is created lazily with value 1 by the first successful consume.
//! - Two first consumers racing on `insert`: the loser re-reads and continues on the
//!   existing-record path. It is never denied because of the race.
//! - Consume writes `value + 1` only if the record still holds the `value` it read; decrement
//!   writes `value - 1` the same way. Each successful call therefore has exactly one applied
//!   write, so the stored value is always consumes minus decrements.
//! - Store failures surface as [`CheckError::Store`]. Conflicts never surface; an exhausted
//!   retry budget surfaces as [`CheckError::Contention`] or [`CheckError::Timeout`].
//!
//! ```rust
//! use limitguard::{InMemoryCounterStore, Limit, LimitChecker, PersistentLimitChecker};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = InMemoryCounterStore::new();
//! let checker = PersistentLimitChecker::new(Limit::bounded(1), "acct-1:deploy", store).unwrap();
//! assert!(checker.check_and_consume().await.unwrap());
//! assert!(!checker.check_and_consume().await.unwrap());
//! assert!(checker.decrement().await.unwrap());
//! # });
//! ```

use crate::checker::LimitChecker;
use crate::error::{CheckError, LimitError};
use crate::retry::RetryConfig;
use crate::store::{CounterRecord, CounterStore, WriteOutcome};
use crate::Limit;
use async_trait::async_trait;
use std::future::Future;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct PersistentLimitChecker<S> {
    limit: Limit,
    key: String,
    store: S,
    retry: RetryConfig,
}

impl<S> PersistentLimitChecker<S>
where
    S: CounterStore,
{
    /// Create a checker for `key` over `store`. Fails if the key is empty.
    pub fn new(limit: Limit, key: impl Into<String>, store: S) -> Result<Self, LimitError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(LimitError::EmptyKey);
        }
        Ok(Self { limit, key, store, retry: RetryConfig::default() })
    }

    /// Replace the retry bounds.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Permits currently recorded for this key (0 if the record does not exist yet).
    pub async fn used(&self) -> Result<u64, CheckError> {
        Ok(self.read().await?.map_or(0, |record| record.value))
    }

    /// [`check_and_consume`](LimitChecker::check_and_consume) with a caller-supplied deadline.
    pub async fn check_and_consume_before(&self, deadline: Instant) -> Result<bool, CheckError> {
        self.consume(Some(deadline)).await
    }

    /// [`decrement`](LimitChecker::decrement) with a caller-supplied deadline.
    pub async fn decrement_before(&self, deadline: Instant) -> Result<bool, CheckError> {
        self.release(Some(deadline)).await
    }

    fn configured_deadline(&self) -> Option<Instant> {
        self.retry.timeout().map(|t| Instant::now() + t)
    }

    async fn read(&self) -> Result<Option<CounterRecord>, CheckError> {
        self.store.get(&self.key).await.map_err(|e| CheckError::store(&self.key, e))
    }

    async fn consume(&self, deadline: Option<Instant>) -> Result<bool, CheckError> {
        let Some(max) = self.limit.cap() else {
            return Ok(true);
        };
        if max == 0 {
            return Ok(false);
        }

        let mut budget = RetryBudget::new(&self.retry, &self.key, deadline);
        loop {
            budget.check_deadline()?;

            match budget.within(self.read()).await? {
                None => {
                    let record = CounterRecord::new(self.key.clone(), 1);
                    let outcome = self
                        .store
                        .insert(&record)
                        .await
                        .map_err(|e| CheckError::store(&self.key, e))?;
                    match outcome {
                        WriteOutcome::Applied => {
                            tracing::debug!(target: "limitguard::persistent", key = %self.key, max, "counter created");
                            return Ok(true);
                        }
                        WriteOutcome::Conflict => {
                            // Someone else created it; the record exists now.
                            tracing::trace!(target: "limitguard::persistent", key = %self.key, "lost counter creation race");
                            budget.conflict(false).await?;
                        }
                    }
                }
                Some(record) if record.value >= max => {
                    tracing::debug!(target: "limitguard::persistent", key = %self.key, used = record.value, max, "permit denied");
                    return Ok(false);
                }
                Some(record) => {
                    let outcome = self
                        .store
                        .conditional_update(&self.key, record.value, record.value + 1)
                        .await
                        .map_err(|e| CheckError::store(&self.key, e))?;
                    if outcome.is_applied() {
                        return Ok(true);
                    }
                    tracing::trace!(target: "limitguard::persistent", key = %self.key, observed = record.value, "consume conflict");
                    budget.conflict(true).await?;
                }
            }
        }
    }

    async fn release(&self, deadline: Option<Instant>) -> Result<bool, CheckError> {
        let mut budget = RetryBudget::new(&self.retry, &self.key, deadline);
        loop {
            budget.check_deadline()?;

            let record = match budget.within(self.read()).await? {
                Some(record) if record.value > 0 => record,
                _ => return Ok(false),
            };
            let outcome = self
                .store
                .conditional_update(&self.key, record.value, record.value - 1)
                .await
                .map_err(|e| CheckError::store(&self.key, e))?;
            if outcome.is_applied() {
                return Ok(true);
            }
            tracing::trace!(target: "limitguard::persistent", key = %self.key, observed = record.value, "decrement conflict");
            budget.conflict(true).await?;
        }
    }
}

#[async_trait]
impl<S> LimitChecker for PersistentLimitChecker<S>
where
    S: CounterStore,
{
    async fn check_and_consume(&self) -> Result<bool, CheckError> {
        self.consume(self.configured_deadline()).await
    }

    async fn decrement(&self) -> Result<bool, CheckError> {
        self.release(self.configured_deadline()).await
    }

    fn limit(&self) -> Limit {
        self.limit
    }
}

/// Attempt and deadline accounting for one operation.
struct RetryBudget<'a> {
    config: &'a RetryConfig,
    key: &'a str,
    started: Instant,
    deadline: Option<Instant>,
    attempts: usize,
}

impl<'a> RetryBudget<'a> {
    fn new(config: &'a RetryConfig, key: &'a str, deadline: Option<Instant>) -> Self {
        Self { config, key, started: Instant::now(), deadline, attempts: 0 }
    }

    fn check_deadline(&self) -> Result<(), CheckError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(self.timed_out()),
            _ => Ok(()),
        }
    }

    fn timed_out(&self) -> CheckError {
        let elapsed = self.started.elapsed();
        tracing::warn!(target: "limitguard::persistent", key = %self.key, attempts = self.attempts, ?elapsed, "limit check deadline passed");
        CheckError::Timeout { key: self.key.to_string(), elapsed }
    }

    /// Run a store read, abandoning it once the deadline passes. Writes are never bounded
    /// this way, so an applied write is always observed.
    async fn within<T, F>(&self, read: F) -> Result<T, CheckError>
    where
        F: Future<Output = Result<T, CheckError>>,
    {
        match self.deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, read).await {
                Ok(result) => result,
                Err(_) => Err(self.timed_out()),
            },
            None => read.await,
        }
    }

    /// Record a lost round; back off before the next one if asked to.
    async fn conflict(&mut self, backoff: bool) -> Result<(), CheckError> {
        self.attempts += 1;
        if self.attempts >= self.config.max_attempts() {
            tracing::warn!(target: "limitguard::persistent", key = %self.key, attempts = self.attempts, "retry budget exhausted under contention");
            return Err(CheckError::Contention { key: self.key.to_string(), attempts: self.attempts });
        }
        if backoff {
            self.config.pause(self.attempts, self.deadline).await;
        }
        Ok(())
    }
}
