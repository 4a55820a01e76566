//! Limits document.
//!
//! Limits are configured per action with optional per-account overrides:
//!
//! ```json
//! {
//!   "actions": {
//!     "create_pipeline": { "limit": 100 },
//!     "api_call_burst":  { "limit": 20, "durability": "in_memory" }
//!   },
//!   "accounts": {
//!     "acct-1": { "create_pipeline": 500 }
//!   }
//! }
//! ```
//!
//! An override replaces only the ceiling; durability always comes from the action entry.

use crate::error::LimitError;
use crate::Limit;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Where a limit's counter lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// Shared through the counter store; survives restarts.
    #[default]
    Persistent,
    /// Local to this process.
    InMemory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLimit {
    pub limit: Limit,
    #[serde(default)]
    pub durability: Durability,
}

/// A limited operation performed by an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Action {
    pub account_id: String,
    pub action: String,
}

impl Action {
    pub fn new(account_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self { account_id: account_id.into(), action: action.into() }
    }

    /// Counter key for this action: `"{account_id}:{action}"`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.account_id, self.action)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.account_id, self.action)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default)]
    pub actions: HashMap<String, ActionLimit>,
    #[serde(default)]
    pub accounts: HashMap<String, HashMap<String, Limit>>,
}

impl LimitsConfig {
    pub fn from_json_str(json: &str) -> Result<Self, LimitError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Register (or replace) the default limit for an action.
    pub fn with_action(mut self, action: impl Into<String>, limit: Limit, durability: Durability) -> Self {
        self.actions.insert(action.into(), ActionLimit { limit, durability });
        self
    }

    /// Override an action's ceiling for one account.
    pub fn with_account_override(
        mut self,
        account_id: impl Into<String>,
        action: impl Into<String>,
        limit: Limit,
    ) -> Self {
        self.accounts.entry(account_id.into()).or_default().insert(action.into(), limit);
        self
    }

    /// Effective limit and durability for `action`.
    pub fn resolve(&self, action: &Action) -> Result<ActionLimit, LimitError> {
        let base = self
            .actions
            .get(&action.action)
            .ok_or_else(|| LimitError::UnknownAction { action: action.action.clone() })?;
        let limit = self
            .accounts
            .get(&action.account_id)
            .and_then(|overrides| overrides.get(&action.action))
            .copied()
            .unwrap_or(base.limit);
        Ok(ActionLimit { limit, durability: base.durability })
    }
}
