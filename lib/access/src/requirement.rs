//! Permission requirements.
//!
//! A requirement names the permissions that satisfy it through the group
//! tier (any one suffices) and through the self tier (all are needed, and
//! only when the caller is linked to the entity). Calling code ANDs
//! several requirements by resolving each in turn.

use crate::resource::ResourceType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The permissions an operation demands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequirement {
    #[serde(default)]
    group: BTreeSet<String>,
    #[serde(default, rename = "self")]
    self_access: BTreeSet<String>,
    #[serde(default = "default_admin_override")]
    admin_override: bool,
}

fn default_admin_override() -> bool {
    true
}

impl PermissionRequirement {
    /// A requirement satisfied by holding any of the given permissions.
    #[must_use]
    pub fn group<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            group: permissions.into_iter().map(Into::into).collect(),
            self_access: BTreeSet::new(),
            admin_override: true,
        }
    }

    /// A requirement every caller satisfies.
    #[must_use]
    pub fn public() -> Self {
        Self::group(Vec::<String>::new())
    }

    /// Requirement for writing to a resource: `<resource>.write`, or
    /// `<resource>.write.me` for linked callers.
    #[must_use]
    pub fn write(resource: ResourceType) -> Self {
        Self::group([format!("{resource}.write")])
            .with_self_permissions([format!("{resource}.write.me")])
    }

    /// Requirement for reading a resource: `<resource>.read`, or
    /// `<resource>.read.me` for linked callers.
    #[must_use]
    pub fn read(resource: ResourceType) -> Self {
        Self::group([format!("{resource}.read")])
            .with_self_permissions([format!("{resource}.read.me")])
    }

    /// Adds the permissions a linked caller must hold to pass via self tier.
    #[must_use]
    pub fn with_self_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.self_access
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    /// Stops administrators from passing unconditionally.
    #[must_use]
    pub fn without_admin_override(mut self) -> Self {
        self.admin_override = false;
        self
    }

    #[must_use]
    pub fn group_permissions(&self) -> &BTreeSet<String> {
        &self.group
    }

    #[must_use]
    pub fn self_permissions(&self) -> &BTreeSet<String> {
        &self.self_access
    }

    #[must_use]
    pub fn admin_override(&self) -> bool {
        self.admin_override
    }

    /// Returns true if the requirement names no permissions at all.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.group.is_empty() && self.self_access.is_empty()
    }
}

impl fmt::Display for PermissionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_public() {
            return write!(f, "public");
        }
        let join = |set: &BTreeSet<String>| set.iter().cloned().collect::<Vec<_>>().join(", ");
        write!(f, "any of [{}]", join(&self.group))?;
        if !self.self_access.is_empty() {
            write!(f, " or self with [{}]", join(&self.self_access))?;
        }
        Ok(())
    }
}
