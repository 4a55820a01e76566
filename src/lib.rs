#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # limitguard
//!
//! Admission control for async Rust: decide whether one more unit of work may start
//! against a configured limit, and release the permit when the work goes away.
//!
//! ## Features
//!
//! - **One contract, two durabilities**: [`LimitChecker`] is implemented by an in-process
//!   checker and by a store-backed checker that many processes can share
//! - **Lock-free enforcement**: an atomic compare-and-set loop in memory, guarded
//!   conditional writes against the [`CounterStore`]
//! - **Bounded retries** with exponential backoff, jitter, and deadlines
//! - **Enforcement helpers** and a tower [`LimitLayer`] that hand permits back on failure
//! - **Config-driven factory** mapping `(account, action)` pairs to checkers
//!
//! ## Quick Start
//!
//! ```rust
//! use limitguard::{InMemoryCounterStore, Limit, LimitChecker, PersistentLimitChecker};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = InMemoryCounterStore::new();
//!     let checker = PersistentLimitChecker::new(Limit::bounded(2), "acct-1:create_pipeline", store)
//!         .unwrap();
//!
//!     assert!(checker.check_and_consume().await.unwrap());
//!     assert!(checker.check_and_consume().await.unwrap());
//!     assert!(!checker.check_and_consume().await.unwrap()); // limit reached
//!
//!     assert!(checker.decrement().await.unwrap());
//!     assert!(checker.check_and_consume().await.unwrap());
//! }
//! ```

pub mod checker;
pub mod config;
pub mod enforcement;
pub mod error;
pub mod factory;
pub mod layer;
pub mod limit;
pub mod memory;
pub mod persistent;
pub mod prelude;
pub mod retry;
pub mod store;

// Re-exports
pub use checker::LimitChecker;
pub use config::{Action, ActionLimit, Durability, LimitsConfig};
pub use enforcement::{with_counter_decrement, with_limit_check};
pub use error::{BoxError, CheckError, EnforcementError, LimitError};
pub use factory::LimitCheckerFactory;
pub use layer::{LimitLayer, LimitService};
pub use limit::{Limit, UNLIMITED};
pub use memory::InMemoryLimitChecker;
pub use persistent::PersistentLimitChecker;
pub use retry::{BuildError, InstantSleeper, RetryConfig, RetryConfigBuilder, Sleeper, TokioSleeper};
pub use store::{CounterRecord, CounterStore, InMemoryCounterStore, WriteOutcome};
