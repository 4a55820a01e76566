//! Bounds for the optimistic retry loop.
//!
//! A persistent checker retries whenever another writer changed the counter between its
//! read and its conditional write. Those retries are cheap, but unbounded they can livelock
//! under pathological contention, so every loop runs under a [`RetryConfig`]:
//!
//! - `max_attempts` caps the number of read-check-write rounds.
//! - Exponential backoff (`base_delay * 2^(retry-1)`, capped at `max_delay`) spaces rounds out.
//! - Full jitter draws the actual delay uniformly from `[0, delay]` so contenders desynchronize.
//! - An optional `timeout` turns into a deadline checked between rounds.
//!
//! ```rust
//! use std::time::Duration;
//! use limitguard::RetryConfig;
//!
//! let config = RetryConfig::builder()
//!     .max_attempts(8)
//!     .base_delay(Duration::from_millis(1))
//!     .max_delay(Duration::from_millis(20))
//!     .timeout(Duration::from_millis(500))
//!     .build()
//!     .unwrap();
//! assert_eq!(config.backoff(1), Duration::from_millis(1));
//! assert_eq!(config.backoff(3), Duration::from_millis(4));
//! assert_eq!(config.backoff(10), Duration::from_millis(20));
//! ```

use rand::{rng, Rng};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Abstraction for sleeping between attempts, so tests need not wait on real time.
pub trait Sleeper: Send + Sync + fmt::Debug {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// Production sleeper using the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Sleeper that only yields to the scheduler.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantSleeper;

impl Sleeper for InstantSleeper {
    fn sleep(&self, _duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(tokio::task::yield_now())
    }
}

/// Errors produced while building a [`RetryConfig`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("max_attempts must be > 0 (got {0})")]
    InvalidMaxAttempts(usize),
    #[error("max_delay ({max:?}) must be >= base_delay ({base:?})")]
    MaxLessThanBase { base: Duration, max: Duration },
    #[error("timeout must be non-zero")]
    ZeroTimeout,
}

#[derive(Clone)]
pub struct RetryConfig {
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
    timeout: Option<Duration>,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .field("timeout", &self.timeout)
            .field("sleeper", &"<sleeper>")
            .finish()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 32,
            base_delay: Duration::from_millis(2),
            max_delay: Duration::from_millis(100),
            jitter: true,
            timeout: None,
            sleeper: Arc::new(TokioSleeper),
        }
    }
}

impl RetryConfig {
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Un-jittered delay before retry number `retry` (1-indexed); zero for the first attempt.
    pub fn backoff(&self, retry: usize) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exponent = retry.saturating_sub(1).min(u32::MAX as usize) as u32;
        let multiplier = 2u128.saturating_pow(exponent);
        let nanos = self.base_delay.as_nanos().saturating_mul(multiplier);
        let capped = nanos.min(self.max_delay.as_nanos());
        Duration::from_nanos(u64::try_from(capped).unwrap_or(u64::MAX))
    }

    /// Delay actually slept before retry number `retry`.
    pub(crate) fn delay(&self, retry: usize) -> Duration {
        let delay = self.backoff(retry);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let nanos = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX);
        Duration::from_nanos(rng().random_range(0..=nanos))
    }

    /// Sleep before retry number `retry`, never past `deadline`.
    pub(crate) async fn pause(&self, retry: usize, deadline: Option<Instant>) {
        let mut delay = self.delay(retry);
        if let Some(deadline) = deadline {
            delay = delay.min(deadline.saturating_duration_since(Instant::now()));
        }
        self.sleeper.sleep(delay).await;
    }
}

pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    /// Total read-check-write rounds per operation. Must be > 0.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    /// Disable or enable full jitter.
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.config.jitter = enabled;
        self
    }

    /// Abort the loop once this much time has passed since the operation started.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.config.sleeper = Arc::new(sleeper);
        self
    }

    pub fn build(self) -> Result<RetryConfig, BuildError> {
        let c = self.config;
        if c.max_attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        if c.max_delay < c.base_delay {
            return Err(BuildError::MaxLessThanBase { base: c.base_delay, max: c.max_delay });
        }
        if c.timeout == Some(Duration::ZERO) {
            return Err(BuildError::ZeroTimeout);
        }
        Ok(c)
    }
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
