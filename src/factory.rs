//! Resolve actions to checkers.
//!
//! Persistent checkers hold no state of their own, so a fresh one is built per lookup over
//! the shared store. In-memory checkers *are* the state, so they are cached per key and
//! every lookup of the same action shares one counter.

use crate::checker::LimitChecker;
use crate::config::{Action, Durability, LimitsConfig};
use crate::error::LimitError;
use crate::memory::InMemoryLimitChecker;
use crate::persistent::PersistentLimitChecker;
use crate::retry::RetryConfig;
use crate::store::CounterStore;
use crate::Limit;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Hands out checkers for configured actions.
///
/// In-memory checkers are kept for the life of the factory, one per `(account, action)` key,
/// so the cache is bounded by the configured actions times the accounts seen.
#[derive(Debug)]
pub struct LimitCheckerFactory<S> {
    config: LimitsConfig,
    store: S,
    retry: RetryConfig,
    in_memory: RwLock<HashMap<String, InMemoryLimitChecker>>,
}

impl<S> LimitCheckerFactory<S>
where
    S: CounterStore + Clone + 'static,
{
    pub fn new(config: LimitsConfig, store: S) -> Self {
        Self { config, store, retry: RetryConfig::default(), in_memory: RwLock::new(HashMap::new()) }
    }

    /// Retry bounds handed to every persistent checker.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &LimitsConfig {
        &self.config
    }

    /// Checker enforcing the configured limit for `action`.
    pub fn checker(&self, action: &Action) -> Result<Arc<dyn LimitChecker>, LimitError> {
        let resolved = self.config.resolve(action)?;
        let key = action.key();

        match resolved.durability {
            Durability::Persistent => {
                let checker = PersistentLimitChecker::new(resolved.limit, key, self.store.clone())?
                    .with_retry(self.retry.clone());
                Ok(Arc::new(checker))
            }
            Durability::InMemory => Ok(Arc::new(self.in_memory_checker(key, resolved.limit))),
        }
    }

    fn in_memory_checker(&self, key: String, limit: Limit) -> InMemoryLimitChecker {
        if let Some(existing) =
            self.in_memory.read().unwrap_or_else(PoisonError::into_inner).get(&key)
        {
            return existing.clone();
        }

        let mut map = self.in_memory.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(key)
            .or_insert_with_key(|key| {
                debug!(target: "limitguard::factory", key = %key, %limit, "created in-memory checker");
                InMemoryLimitChecker::new(limit)
            })
            .clone()
    }
}
