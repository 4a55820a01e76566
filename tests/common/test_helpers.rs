use async_trait::async_trait;
use limitguard::{CounterRecord, CounterStore, InMemoryCounterStore, WriteOutcome};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

/// Counter store that can inject conflicts and outages in front of a real in-memory store.
#[derive(Clone, Default)]
pub struct ScriptedStore {
    inner: InMemoryCounterStore,
    conflicts_left: Arc<AtomicUsize>,
    down: Arc<AtomicBool>,
    stalled: Arc<AtomicBool>,
    updates: Arc<AtomicUsize>,
    inserts: Arc<AtomicUsize>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `n` conditional updates as if another writer got there first.
    pub fn inject_conflicts(&self, n: usize) {
        self.conflicts_left.store(n, Ordering::SeqCst);
    }

    pub fn always_conflict(&self) {
        self.inject_conflicts(usize::MAX);
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Make every read hang until switched off again.
    pub fn stall_reads(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Conditional updates attempted, including rejected ones.
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &InMemoryCounterStore {
        &self.inner
    }

    fn check_up(&self) -> io::Result<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "counter store unavailable"))
        } else {
            Ok(())
        }
    }

    fn take_conflict(&self) -> bool {
        self.conflicts_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl CounterStore for ScriptedStore {
    type Error = io::Error;

    async fn insert(&self, record: &CounterRecord) -> Result<WriteOutcome, Self::Error> {
        self.check_up()?;
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(self.inner.insert(record).await.unwrap_or(WriteOutcome::Conflict))
    }

    async fn get(&self, key: &str) -> Result<Option<CounterRecord>, Self::Error> {
        self.check_up()?;
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(self.inner.get(key).await.unwrap_or(None))
    }

    async fn conditional_update(
        &self,
        key: &str,
        expected: u64,
        new_value: u64,
    ) -> Result<WriteOutcome, Self::Error> {
        self.check_up()?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.take_conflict() {
            return Ok(WriteOutcome::Conflict);
        }
        Ok(self
            .inner
            .conditional_update(key, expected, new_value)
            .await
            .unwrap_or(WriteOutcome::Conflict))
    }
}

/// Captures formatted tracing output for assertions.
#[derive(Clone, Default)]
pub struct SharedWriter(pub Arc<Mutex<Vec<u8>>>);

impl SharedWriter {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedGuard;
    fn make_writer(&'a self) -> Self::Writer {
        SharedGuard(self.0.clone())
    }
}

pub struct SharedGuard(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
