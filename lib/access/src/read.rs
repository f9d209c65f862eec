//! Read-side attribute filtering.
//!
//! Rendering code asks which attributes of an entity the caller may see.
//! Read tiers reuse [`FieldTier`]; unlike writes, `internal` attributes are
//! visible to holders of `<resource>.internal` and to administrators.

use crate::entity::EntitySnapshot;
use crate::field::{FieldTier, FieldTierMap};
use crate::identity::Identity;
use crate::requirement::PermissionRequirement;
use crate::resolver::{PermissionResolver, Tier};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// What a caller is able to see of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadAccess {
    tier: Option<Tier>,
    internal: bool,
}

impl ReadAccess {
    /// Returns true if an attribute at `tier` is visible.
    #[must_use]
    pub fn permits(&self, tier: FieldTier) -> bool {
        match tier {
            FieldTier::Public => true,
            FieldTier::Owner => self.tier >= Some(Tier::Owner),
            FieldTier::Group => self.tier >= Some(Tier::Group),
            FieldTier::Internal => self.internal,
            FieldTier::Sudo => self.tier == Some(Tier::Administrative),
        }
    }

    /// The caller's read tier, `None` if it satisfies no read requirement.
    #[must_use]
    pub fn tier(&self) -> Option<Tier> {
        self.tier
    }
}

/// Removes attributes a caller may not read.
#[derive(Debug, Clone)]
pub struct ReadFilter {
    resolver: PermissionResolver,
}

impl ReadFilter {
    #[must_use]
    pub fn new(resolver: PermissionResolver) -> Self {
        Self { resolver }
    }

    /// Computes the caller's read access to `entity` at `now`.
    #[must_use]
    pub fn access_at(&self, identity: &Identity, entity: &EntitySnapshot, now: DateTime<Utc>) -> ReadAccess {
        let resource = entity.resource_type();
        let tier = self
            .resolver
            .resolve_at(identity, Some(entity), &PermissionRequirement::read(resource), now)
            .ok();
        let internal =
            identity.is_admin() || identity.has_permission(&format!("{resource}.internal"));
        ReadAccess { tier, internal }
    }

    /// Returns the attributes visible to the caller, dropping the rest.
    #[must_use]
    pub fn filter_attributes(
        &self,
        identity: &Identity,
        entity: &EntitySnapshot,
        tiers: &FieldTierMap,
        attributes: Map<String, Value>,
    ) -> Map<String, Value> {
        let access = self.access_at(identity, entity, Utc::now());
        attributes
            .into_iter()
            .filter(|(field, _)| access.permits(tiers.tier_of(field)))
            .collect()
    }
}
