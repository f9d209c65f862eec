//! Permission resolution.
//!
//! Computes the caller's relationship tier to an entity and checks it
//! against a requirement. Tiers are tried from the top:
//!
//! 1. administrative: member of an administrator group (unless the
//!    requirement opts out of the override)
//! 2. group: holds any of the requirement's group permissions
//! 3. self: linked to the entity, inside the resource's self window, and
//!    holding every self permission of the requirement
//! 4. anonymous: only public requirements pass
//!
//! Resolution never mutates anything and never retries.

use crate::entity::EntitySnapshot;
use crate::error::AccessError;
use crate::identity::Identity;
use crate::requirement::PermissionRequirement;
use crate::resource::ResourceRegistry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The relationship level of a caller to an entity, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// No special relationship.
    Anonymous,
    /// Directly linked to the entity within its self window.
    #[serde(rename = "self")]
    Owner,
    /// Holds a permission named for the resource.
    Group,
    /// Member of an administrator group.
    Administrative,
}

/// Resolves caller tiers using the self windows of registered resources.
#[derive(Debug, Clone)]
pub struct PermissionResolver {
    registry: Arc<ResourceRegistry>,
}

impl PermissionResolver {
    /// Creates a resolver over the given resource definitions.
    #[must_use]
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the resource definitions this resolver consults.
    #[must_use]
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Resolves the caller's tier for `requirement` against `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Forbidden`] carrying the unmet requirement.
    pub fn resolve(
        &self,
        identity: &Identity,
        entity: Option<&EntitySnapshot>,
        requirement: &PermissionRequirement,
    ) -> Result<Tier, AccessError> {
        self.resolve_at(identity, entity, requirement, Utc::now())
    }

    /// Like [`resolve`](Self::resolve), evaluating self windows at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Forbidden`] carrying the unmet requirement.
    pub fn resolve_at(
        &self,
        identity: &Identity,
        entity: Option<&EntitySnapshot>,
        requirement: &PermissionRequirement,
        now: DateTime<Utc>,
    ) -> Result<Tier, AccessError> {
        if requirement.admin_override() && identity.is_admin() {
            return Ok(Tier::Administrative);
        }

        if identity.has_any_permission(requirement.group_permissions()) {
            return Ok(Tier::Group);
        }

        if let Some(entity) = entity
            && !requirement.self_permissions().is_empty()
            && self.is_self(identity, entity, now)
            && identity
                .as_authenticated()
                .is_some_and(|caller| caller.has_all_permissions(requirement.self_permissions()))
        {
            return Ok(Tier::Owner);
        }

        if requirement.is_public() {
            return Ok(Tier::Anonymous);
        }

        Err(AccessError::Forbidden {
            requirement: requirement.clone(),
        })
    }

    /// Returns true if the caller is linked to the entity and the entity's
    /// self window still holds. Unregistered resource types never grant
    /// self access.
    #[must_use]
    pub fn is_self(&self, identity: &Identity, entity: &EntitySnapshot, now: DateTime<Utc>) -> bool {
        let Some(caller) = identity.as_authenticated() else {
            return false;
        };
        let Some(definition) = self.registry.get(entity.resource_type()) else {
            return false;
        };
        entity.is_linked_to(caller) && definition.self_window().holds(entity, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Owner;
    use crate::group::Group;
    use crate::identity::AuthenticatedIdentity;
    use crate::resource::ResourceType;
    use chrono::TimeDelta;
    use ratline_core::{RatId, RescueId, UserId};

    fn resolver() -> PermissionResolver {
        PermissionResolver::new(Arc::new(ResourceRegistry::builtin()))
    }

    fn rat_identity(rat: RatId) -> Identity {
        AuthenticatedIdentity::new(
            UserId::new(),
            vec![Group::new("rat", 50).with_permissions(["rescues.write.me"])],
        )
        .with_rats([rat])
        .into()
    }

    fn rescue_for(rat: RatId, age: TimeDelta, now: DateTime<Utc>) -> EntitySnapshot {
        EntitySnapshot::new(ResourceType::Rescues, RescueId::new().to_string(), now - age)
            .with_owner(Owner::Rat(rat))
    }

    #[test]
    fn administrator_always_passes() {
        let admin: Identity =
            AuthenticatedIdentity::new(UserId::new(), vec![Group::new("admin", 0).administrator()])
                .into();
        let requirement = PermissionRequirement::group(["something.nobody.has"]);
        let now = Utc::now();
        let unrelated = rescue_for(RatId::new(), TimeDelta::days(30), now);

        assert_eq!(
            resolver().resolve_at(&admin, Some(&unrelated), &requirement, now),
            Ok(Tier::Administrative)
        );
        assert_eq!(
            resolver().resolve_at(&admin, None, &requirement, now),
            Ok(Tier::Administrative)
        );
    }

    #[test]
    fn administrator_override_can_be_excluded() {
        let admin: Identity =
            AuthenticatedIdentity::new(UserId::new(), vec![Group::new("admin", 0).administrator()])
                .into();
        let requirement = PermissionRequirement::group(["users.write"]).without_admin_override();
        assert!(resolver().resolve(&admin, None, &requirement).is_err());
    }

    #[test]
    fn group_permission_passes_without_entity() {
        let overseer: Identity = AuthenticatedIdentity::new(
            UserId::new(),
            vec![Group::new("overseer", 10).with_permissions(["rescues.write"])],
        )
        .into();
        let requirement = PermissionRequirement::write(ResourceType::Rescues);
        assert_eq!(resolver().resolve(&overseer, None, &requirement), Ok(Tier::Group));
    }

    #[test]
    fn self_tier_within_window() {
        let rat = RatId::new();
        let now = Utc::now();
        let requirement = PermissionRequirement::write(ResourceType::Rescues);
        let fresh = rescue_for(rat, TimeDelta::minutes(10), now);

        assert_eq!(
            resolver().resolve_at(&rat_identity(rat), Some(&fresh), &requirement, now),
            Ok(Tier::Owner)
        );
    }

    #[test]
    fn self_tier_lapses_after_window() {
        let rat = RatId::new();
        let now = Utc::now();
        let requirement = PermissionRequirement::write(ResourceType::Rescues);
        let stale = rescue_for(rat, TimeDelta::hours(2), now);

        let err = resolver()
            .resolve_at(&rat_identity(rat), Some(&stale), &requirement, now)
            .unwrap_err();
        assert_eq!(err, AccessError::Forbidden { requirement });
    }

    #[test]
    fn open_rescue_keeps_self_tier() {
        let rat = RatId::new();
        let now = Utc::now();
        let requirement = PermissionRequirement::write(ResourceType::Rescues);
        let open = rescue_for(rat, TimeDelta::hours(2), now).with_open(true);

        assert_eq!(
            resolver().resolve_at(&rat_identity(rat), Some(&open), &requirement, now),
            Ok(Tier::Owner)
        );
    }

    #[test]
    fn self_tier_requires_self_permissions() {
        let rat = RatId::new();
        let now = Utc::now();
        let identity: Identity = AuthenticatedIdentity::new(UserId::new(), Vec::new())
            .with_rats([rat])
            .into();
        let requirement = PermissionRequirement::write(ResourceType::Rescues);
        let fresh = rescue_for(rat, TimeDelta::minutes(1), now);

        assert!(resolver().resolve_at(&identity, Some(&fresh), &requirement, now).is_err());
    }

    #[test]
    fn self_tier_needs_declared_self_permissions() {
        let rat = RatId::new();
        let now = Utc::now();
        let requirement = PermissionRequirement::group(["rescues.write"]);
        let fresh = rescue_for(rat, TimeDelta::minutes(1), now);

        assert!(resolver().resolve_at(&rat_identity(rat), Some(&fresh), &requirement, now).is_err());
    }

    #[test]
    fn unrelated_caller_is_forbidden() {
        let now = Utc::now();
        let requirement = PermissionRequirement::write(ResourceType::Rescues);
        let other = rescue_for(RatId::new(), TimeDelta::minutes(1), now);

        assert!(resolver().resolve_at(&rat_identity(RatId::new()), Some(&other), &requirement, now).is_err());
    }

    #[test]
    fn anonymous_passes_only_public() {
        let anonymous = Identity::anonymous("198.51.100.7".parse().expect("ip"));
        assert_eq!(
            resolver().resolve(&anonymous, None, &PermissionRequirement::public()),
            Ok(Tier::Anonymous)
        );
        assert!(resolver()
            .resolve(&anonymous, None, &PermissionRequirement::read(ResourceType::Rescues))
            .is_err());
    }

    #[test]
    fn tiers_are_ordered() {
        assert!(Tier::Administrative > Tier::Group);
        assert!(Tier::Group > Tier::Owner);
        assert!(Tier::Owner > Tier::Anonymous);
    }
}
