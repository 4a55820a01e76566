use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// One counter, keyed by the resource it limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRecord {
    pub key: String,
    /// Permits currently consumed.
    pub value: u64,
}

impl CounterRecord {
    pub fn new(key: impl Into<String>, value: u64) -> Self {
        Self { key: key.into(), value }
    }
}

/// Result of a guarded write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write was applied.
    Applied,
    /// Another writer got there first; nothing was written.
    Conflict,
}

impl WriteOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied)
    }
}

/// Storage contract for shared counters.
///
/// Every mutation is guarded: `insert` rejects existing keys and `conditional_update`
/// rejects stale expectations. There is deliberately no unconditional write, so callers
/// cannot overwrite a concurrent increment.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Create `record`. Returns `Conflict` if the key already exists.
    async fn insert(&self, record: &CounterRecord) -> Result<WriteOutcome, Self::Error>;

    /// Fetch the record for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<CounterRecord>, Self::Error>;

    /// Set `key` to `new_value` only if it currently holds `expected`.
    ///
    /// Returns `Conflict` without mutating when the stored value differs or the record
    /// does not exist.
    async fn conditional_update(
        &self,
        key: &str,
        expected: u64,
        new_value: u64,
    ) -> Result<WriteOutcome, Self::Error>;
}

#[async_trait]
impl<S> CounterStore for Arc<S>
where
    S: CounterStore + ?Sized,
{
    type Error = S::Error;

    async fn insert(&self, record: &CounterRecord) -> Result<WriteOutcome, Self::Error> {
        (**self).insert(record).await
    }

    async fn get(&self, key: &str) -> Result<Option<CounterRecord>, Self::Error> {
        (**self).get(key).await
    }

    async fn conditional_update(
        &self,
        key: &str,
        expected: u64,
        new_value: u64,
    ) -> Result<WriteOutcome, Self::Error> {
        (**self).conditional_update(key, expected, new_value).await
    }
}

/// In-process counter store. Clones share the same map.
#[derive(Default, Clone, Debug)]
pub struct InMemoryCounterStore {
    data: Arc<Mutex<HashMap<String, u64>>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Every critical section leaves the map consistent, so a poisoned lock is still usable.
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, u64>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of counters stored.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    type Error = std::convert::Infallible;

    async fn insert(&self, record: &CounterRecord) -> Result<WriteOutcome, Self::Error> {
        let mut guard = self.lock();
        if guard.contains_key(&record.key) {
            return Ok(WriteOutcome::Conflict);
        }
        guard.insert(record.key.clone(), record.value);
        Ok(WriteOutcome::Applied)
    }

    async fn get(&self, key: &str) -> Result<Option<CounterRecord>, Self::Error> {
        let guard = self.lock();
        Ok(guard.get(key).map(|&value| CounterRecord::new(key, value)))
    }

    async fn conditional_update(
        &self,
        key: &str,
        expected: u64,
        new_value: u64,
    ) -> Result<WriteOutcome, Self::Error> {
        let mut guard = self.lock();
        match guard.get_mut(key) {
            Some(current) if *current == expected => {
                *current = new_value;
                Ok(WriteOutcome::Applied)
            }
            _ => Ok(WriteOutcome::Conflict),
        }
    }
}
