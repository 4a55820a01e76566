//! etcd counter store for `limitguard` (companion crate).
//! Bring your own `etcd_client::Client`; counters are stored as decimal strings under a prefix.
//!
//! Every write is a single etcd transaction: inserts are guarded on the key never having been
//! created, updates on the key still holding the expected value. A failed guard is reported as
//! [`WriteOutcome::Conflict`](limitguard::WriteOutcome::Conflict) so the checker's retry loop
//! can re-read and try again.

#![cfg_attr(not(feature = "etcd-client"), allow(dead_code))]

use thiserror::Error;

/// Errors produced by the etcd counter store.
#[derive(Debug, Error)]
pub enum EtcdStoreError {
    /// The key prefix was rejected at construction.
    #[error("invalid key prefix: {0}")]
    InvalidPrefix(&'static str),
    /// The stored value is not a counter this crate wrote.
    #[error("counter '{key}' holds non-numeric value '{value}'")]
    Corrupt { key: String, value: String },
    /// The etcd request itself failed.
    #[error("etcd request failed: {0}")]
    Etcd(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

#[cfg(feature = "etcd-client")]
impl From<etcd_client::Error> for EtcdStoreError {
    fn from(err: etcd_client::Error) -> Self {
        EtcdStoreError::Etcd(Box::new(err))
    }
}

// Trim whitespace and trailing slashes; reject what etcd tooling would choke on.
fn normalize_prefix(prefix: &str) -> Result<String, EtcdStoreError> {
    let p = prefix.trim().trim_end_matches('/');
    if p.is_empty() {
        return Err(EtcdStoreError::InvalidPrefix("prefix cannot be empty"));
    }
    if p.chars().any(|c| c.is_control()) {
        return Err(EtcdStoreError::InvalidPrefix("prefix cannot contain control characters"));
    }
    Ok(p.to_string())
}

fn parse_counter(key: &str, raw: &[u8]) -> Result<u64, EtcdStoreError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| EtcdStoreError::Corrupt {
            key: key.to_string(),
            value: String::from_utf8_lossy(raw).into_owned(),
        })
}

#[cfg(feature = "etcd-client")]
pub use etcd::EtcdCounterStore;

#[cfg(feature = "etcd-client")]
mod etcd {
    use super::{normalize_prefix, parse_counter, EtcdStoreError};
    use async_trait::async_trait;
    use etcd_client::{Compare, CompareOp, Txn, TxnOp};
    use limitguard::{CounterRecord, CounterStore, WriteOutcome};

    /// [`CounterStore`] backed by etcd transactions.
    #[derive(Clone)]
    pub struct EtcdCounterStore {
        prefix: String,
        client: etcd_client::Client,
    }

    impl std::fmt::Debug for EtcdCounterStore {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("EtcdCounterStore")
                .field("prefix", &self.prefix)
                .field("client", &"<etcd_client::Client>")
                .finish()
        }
    }

    impl EtcdCounterStore {
        /// Create a store using an existing etcd client; counters live at `prefix/<key>`.
        ///
        /// # Errors
        /// Returns [`EtcdStoreError::InvalidPrefix`] if the prefix is empty or contains
        /// control characters.
        pub fn new(
            prefix: impl AsRef<str>,
            client: etcd_client::Client,
        ) -> Result<Self, EtcdStoreError> {
            Ok(Self { prefix: normalize_prefix(prefix.as_ref())?, client })
        }

        pub fn prefix(&self) -> &str {
            &self.prefix
        }

        fn path(&self, key: &str) -> String {
            format!("{}/{}", self.prefix, key)
        }

        async fn guarded_put(
            &self,
            path: String,
            guard: Compare,
            value: u64,
        ) -> Result<WriteOutcome, EtcdStoreError> {
            let mut client = self.client.clone();
            let txn = Txn::new()
                .when(vec![guard])
                .and_then(vec![TxnOp::put(path.clone(), value.to_string(), None)]);
            let resp = client.txn(txn).await.map_err(|e| {
                tracing::warn!(target: "limitguard::etcd", key = %path, error = %e, "etcd transaction failed");
                EtcdStoreError::from(e)
            })?;
            if resp.succeeded() {
                Ok(WriteOutcome::Applied)
            } else {
                tracing::trace!(target: "limitguard::etcd", key = %path, "guarded write lost the race");
                Ok(WriteOutcome::Conflict)
            }
        }
    }

    #[async_trait]
    impl CounterStore for EtcdCounterStore {
        type Error = EtcdStoreError;

        async fn insert(&self, record: &CounterRecord) -> Result<WriteOutcome, Self::Error> {
            let path = self.path(&record.key);
            // A create revision of zero means the key does not exist.
            let guard = Compare::create_revision(path.clone(), CompareOp::Equal, 0);
            self.guarded_put(path, guard, record.value).await
        }

        async fn get(&self, key: &str) -> Result<Option<CounterRecord>, Self::Error> {
            let mut client = self.client.clone();
            let path = self.path(key);
            let resp = client.get(path.clone(), None).await.map_err(|e| {
                tracing::warn!(target: "limitguard::etcd", key = %path, error = %e, "etcd read failed");
                EtcdStoreError::from(e)
            })?;
            match resp.kvs().first() {
                Some(kv) => {
                    let value = parse_counter(key, kv.value())?;
                    Ok(Some(CounterRecord::new(key, value)))
                }
                None => Ok(None),
            }
        }

        async fn conditional_update(
            &self,
            key: &str,
            expected: u64,
            new_value: u64,
        ) -> Result<WriteOutcome, Self::Error> {
            let path = self.path(key);
            // Comparing a missing key's value fails, so absent records conflict too.
            let guard = Compare::value(path.clone(), CompareOp::Equal, expected.to_string());
            self.guarded_put(path, guard, new_value).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_normalized() {
        assert_eq!(normalize_prefix("  limits/prod// ").unwrap(), "limits/prod");
        assert_eq!(normalize_prefix("limits").unwrap(), "limits");
    }

    #[test]
    fn bad_prefixes_are_rejected() {
        assert!(matches!(normalize_prefix(""), Err(EtcdStoreError::InvalidPrefix(_))));
        assert!(matches!(normalize_prefix(" // "), Err(EtcdStoreError::InvalidPrefix(_))));
        assert!(matches!(normalize_prefix("lim\nits"), Err(EtcdStoreError::InvalidPrefix(_))));
    }

    #[test]
    fn counters_parse_from_decimal() {
        assert_eq!(parse_counter("k", b"0").unwrap(), 0);
        assert_eq!(parse_counter("k", b"18446744073709551615").unwrap(), u64::MAX);
    }

    #[test]
    fn foreign_values_are_corrupt() {
        for raw in [&b"-1"[..], b"ten", b"", &[0xff, 0xfe]] {
            match parse_counter("acct:deploy", raw) {
                Err(EtcdStoreError::Corrupt { key, .. }) => assert_eq!(key, "acct:deploy"),
                other => panic!("expected corrupt counter for {:?}, got {:?}", raw, other),
            }
        }
    }
}
