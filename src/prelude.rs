//! Convenient re-exports for common limitguard types.
pub use crate::{
    checker::LimitChecker,
    config::{Action, Durability, LimitsConfig},
    enforcement::{with_counter_decrement, with_limit_check},
    error::{CheckError, EnforcementError, LimitError},
    factory::LimitCheckerFactory,
    layer::LimitLayer,
    limit::Limit,
    memory::InMemoryLimitChecker,
    persistent::PersistentLimitChecker,
    retry::RetryConfig,
    store::{CounterStore, InMemoryCounterStore},
};
