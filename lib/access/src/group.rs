//! Permission groups.
//!
//! A group bundles permission strings (`rescues.write`, `rats.read.me`, ...)
//! and may carry the administrator flag. Lower priority numbers take
//! precedence when an identity belongs to several groups.

use ratline_core::GroupId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A permission group an identity can be a member of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    id: GroupId,
    name: String,
    /// Lower value means higher precedence.
    priority: i32,
    #[serde(default)]
    permissions: BTreeSet<String>,
    #[serde(default)]
    is_administrator: bool,
}

impl Group {
    /// Creates a group with no permissions.
    #[must_use]
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            id: GroupId::new(),
            name: name.into(),
            priority,
            permissions: BTreeSet::new(),
            is_administrator: false,
        }
    }

    /// Adds granted permissions.
    #[must_use]
    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    /// Marks the group as administrative.
    #[must_use]
    pub fn administrator(mut self) -> Self {
        self.is_administrator = true;
        self
    }

    #[must_use]
    pub fn id(&self) -> GroupId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    #[must_use]
    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    #[must_use]
    pub fn is_administrator(&self) -> bool {
        self.is_administrator
    }

    /// Returns true if this group grants the permission.
    #[must_use]
    pub fn grants(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_group_grants_nothing() {
        let group = Group::new("default", 100);
        assert!(group.permissions().is_empty());
        assert!(!group.is_administrator());
        assert!(!group.grants("rescues.read"));
    }

    #[test]
    fn grants_listed_permissions() {
        let group = Group::new("rat", 50).with_permissions(["rescues.read", "rescues.write.me"]);
        assert!(group.grants("rescues.read"));
        assert!(group.grants("rescues.write.me"));
        assert!(!group.grants("rescues.write"));
    }

    #[test]
    fn deserializes_from_config_shape() {
        let json = serde_json::json!({
            "id": GroupId::new(),
            "name": "admin",
            "priority": 0,
            "permissions": ["users.write"],
            "isAdministrator": true
        });
        let group: Group = serde_json::from_value(json).expect("deserialize");
        assert!(group.is_administrator());
        assert!(group.grants("users.write"));
    }
}
