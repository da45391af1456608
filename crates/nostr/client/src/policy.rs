//! Per-relay read/write policy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Read/write permission pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimplePolicy {
    #[serde(default = "default_true")]
    pub read: bool,
    #[serde(default = "default_true")]
    pub write: bool,
}

impl Default for SimplePolicy {
    fn default() -> Self {
        Self {
            read: true,
            write: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Policy of one relay in the pool.
///
/// `read` decides whether the relay is bound to new subscriptions and `write`
/// whether it receives published events. An entry in `per_subscription`
/// replaces `read` for that subscription id; its `write` half is unused since
/// publishing is not scoped to a subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    #[serde(flatten)]
    pub base: SimplePolicy,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub per_subscription: HashMap<String, SimplePolicy>,
}

impl Policy {
    /// Read and write.
    pub fn read_write() -> Self {
        Self::default()
    }

    pub fn read_only() -> Self {
        Self::new(true, false)
    }

    pub fn write_only() -> Self {
        Self::new(false, true)
    }

    pub fn new(read: bool, write: bool) -> Self {
        Self {
            base: SimplePolicy { read, write },
            per_subscription: HashMap::new(),
        }
    }

    /// Add an override for one subscription id.
    pub fn with_override(mut self, subscription_id: impl Into<String>, policy: SimplePolicy) -> Self {
        self.per_subscription.insert(subscription_id.into(), policy);
        self
    }

    pub fn read(&self) -> bool {
        self.base.read
    }

    pub fn write(&self) -> bool {
        self.base.write
    }

    /// Whether the relay is bound to a newly created subscription.
    pub fn can_read(&self, subscription_id: &str) -> bool {
        self.per_subscription
            .get(subscription_id)
            .map_or(self.base.read, |o| o.read)
    }

    /// Whether a newly added relay joins an existing subscription. Joining is
    /// unconditional unless an override turns reading off.
    pub fn joins_existing(&self, subscription_id: &str) -> bool {
        self.per_subscription
            .get(subscription_id)
            .is_none_or(|o| o.read)
    }

    /// The explicit read override for a subscription, if any.
    pub fn read_override(&self, subscription_id: &str) -> Option<bool> {
        self.per_subscription.get(subscription_id).map(|o| o.read)
    }
}
