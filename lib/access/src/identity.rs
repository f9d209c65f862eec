//! Caller identities.
//!
//! Identities are supplied per request by the authentication layer and are
//! never persisted here. An authenticated identity carries its groups, the
//! rats it owns (used for ownership checks) and, when the request came in
//! through an OAuth token, the token scope that narrows its permissions.

use crate::group::Group;
use ratline_core::{RatId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;

/// Scope entry granting every permission the identity's groups grant.
pub const SCOPE_WILDCARD: &str = "*";

/// The caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Identity {
    /// A logged-in user.
    Authenticated(AuthenticatedIdentity),
    /// An unauthenticated network origin.
    Anonymous(AnonymousIdentity),
}

impl Identity {
    /// Creates an anonymous identity for a remote address.
    #[must_use]
    pub fn anonymous(remote_address: IpAddr) -> Self {
        Self::Anonymous(AnonymousIdentity { remote_address })
    }

    /// Returns the authenticated identity, if any.
    #[must_use]
    pub fn as_authenticated(&self) -> Option<&AuthenticatedIdentity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            Self::Anonymous(_) => None,
        }
    }

    /// Returns true if the caller belongs to an administrator group.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.as_authenticated()
            .is_some_and(AuthenticatedIdentity::is_admin)
    }

    /// Returns true if the caller effectively holds the permission.
    ///
    /// Anonymous callers hold no permissions.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.as_authenticated()
            .is_some_and(|identity| identity.has_permission(permission))
    }

    /// Returns true if the caller holds at least one of the permissions.
    #[must_use]
    pub fn has_any_permission<'a, I>(&self, permissions: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        permissions
            .into_iter()
            .any(|permission| self.has_permission(permission))
    }
}

impl From<AuthenticatedIdentity> for Identity {
    fn from(identity: AuthenticatedIdentity) -> Self {
        Self::Authenticated(identity)
    }
}

/// An unauthenticated caller, known only by its network address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnonymousIdentity {
    remote_address: IpAddr,
}

impl AnonymousIdentity {
    #[must_use]
    pub fn remote_address(&self) -> IpAddr {
        self.remote_address
    }
}

/// A logged-in user together with everything access decisions need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedIdentity {
    user_id: UserId,
    groups: Vec<Group>,
    #[serde(default)]
    rats: Vec<RatId>,
    /// OAuth token scope; `None` for first-party sessions.
    #[serde(default)]
    scope: Option<BTreeSet<String>>,
}

impl AuthenticatedIdentity {
    /// Creates an identity with the given group memberships.
    #[must_use]
    pub fn new(user_id: UserId, groups: Vec<Group>) -> Self {
        Self {
            user_id,
            groups,
            rats: Vec::new(),
            scope: None,
        }
    }

    /// Sets the rats owned by this user.
    #[must_use]
    pub fn with_rats<I>(mut self, rats: I) -> Self
    where
        I: IntoIterator<Item = RatId>,
    {
        self.rats = rats.into_iter().collect();
        self
    }

    /// Restricts the identity to an OAuth token scope.
    #[must_use]
    pub fn with_scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = Some(scope.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    #[must_use]
    pub fn rats(&self) -> &[RatId] {
        &self.rats
    }

    #[must_use]
    pub fn scope(&self) -> Option<&BTreeSet<String>> {
        self.scope.as_ref()
    }

    /// Returns true if any group membership carries the administrator flag.
    ///
    /// Token scope does not affect administrator status.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.groups.iter().any(Group::is_administrator)
    }

    /// Returns the highest-precedence group (lowest priority number).
    ///
    /// When several groups share the lowest priority the first listed wins.
    #[must_use]
    pub fn effective_group(&self) -> Option<&Group> {
        self.groups.iter().min_by_key(|group| group.priority())
    }

    /// Returns the effective permission set: the union of group
    /// permissions, narrowed to the token scope when one is present.
    #[must_use]
    pub fn permissions(&self) -> BTreeSet<&str> {
        self.groups
            .iter()
            .flat_map(|group| group.permissions().iter())
            .map(String::as_str)
            .filter(|permission| self.scope_allows(permission))
            .collect()
    }

    /// Returns true if the permission is effectively held.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.scope_allows(permission) && self.groups.iter().any(|group| group.grants(permission))
    }

    /// Returns true if every listed permission is effectively held.
    #[must_use]
    pub fn has_all_permissions<'a, I>(&self, permissions: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        permissions
            .into_iter()
            .all(|permission| self.has_permission(permission))
    }

    /// Returns true if the rat belongs to this user.
    #[must_use]
    pub fn owns_rat(&self, rat: RatId) -> bool {
        self.rats.contains(&rat)
    }

    fn scope_allows(&self, permission: &str) -> bool {
        match &self.scope {
            None => true,
            Some(scope) => scope.contains(SCOPE_WILDCARD) || scope.contains(permission),
        }
    }
}
