//! Per-tier hourly request budgets.

use ratline_access::Identity;
use serde::{Deserialize, Serialize};

/// Requests allowed per identity per hourly epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficBudgets {
    /// Budget per remote address for unauthenticated callers.
    pub anonymous: u32,
    /// Budget per user.
    pub authenticated: u32,
    /// Budget per user in an administrator group.
    pub administrator: u32,
}

impl TrafficBudgets {
    /// The budget that applies to `identity`.
    #[must_use]
    pub fn for_identity(&self, identity: &Identity) -> u32 {
        match identity {
            Identity::Anonymous(_) => self.anonymous,
            Identity::Authenticated(user) if user.is_admin() => self.administrator,
            Identity::Authenticated(_) => self.authenticated,
        }
    }
}

impl Default for TrafficBudgets {
    fn default() -> Self {
        Self {
            anonymous: 360,
            authenticated: 3600,
            administrator: 10000,
        }
    }
}
