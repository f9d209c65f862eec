//! Per-field write authorization.
//!
//! Every field of an update payload is checked before anything is applied:
//! a single disallowed field rejects the whole payload. Fields missing from
//! the resource's tier map fall back to the map's default, which for write
//! maps is `internal` so unknown fields are never externally writable.

use crate::entity::EntitySnapshot;
use crate::error::AccessError;
use crate::identity::Identity;
use crate::requirement::PermissionRequirement;
use crate::resolver::{PermissionResolver, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum caller standing needed to touch a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldTier {
    /// Anyone.
    Public,
    /// The linked caller within the self window, or any higher tier.
    #[serde(rename = "self")]
    Owner,
    /// Holders of the resource permission, or administrators.
    Group,
    /// Service-level only.
    Internal,
    /// Administrators only.
    Sudo,
}

/// Field name to tier table for one resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTierMap {
    #[serde(default)]
    fields: BTreeMap<String, FieldTier>,
    default: FieldTier,
}

impl FieldTierMap {
    /// Creates an empty map whose unlisted fields take `default`.
    #[must_use]
    pub fn new(default: FieldTier) -> Self {
        Self {
            fields: BTreeMap::new(),
            default,
        }
    }

    /// An empty write map: every field is internal.
    #[must_use]
    pub fn write_default() -> Self {
        Self::new(FieldTier::Internal)
    }

    /// Assigns a tier to a field.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, tier: FieldTier) -> Self {
        self.fields.insert(field.into(), tier);
        self
    }

    /// Tier for the field, or the map default when unlisted.
    #[must_use]
    pub fn tier_of(&self, field: &str) -> FieldTier {
        self.fields.get(field).copied().unwrap_or(self.default)
    }

    #[must_use]
    pub fn default_tier(&self) -> FieldTier {
        self.default
    }
}

/// Write-side field check for a caller standing at `caller` (or `None`
/// when the caller does not satisfy the resource requirement at all).
pub(crate) fn tier_permits_write(tier: FieldTier, caller: Option<Tier>) -> bool {
    match tier {
        FieldTier::Public => true,
        FieldTier::Internal => false,
        FieldTier::Sudo => caller == Some(Tier::Administrative),
        FieldTier::Group => caller >= Some(Tier::Group),
        FieldTier::Owner => caller >= Some(Tier::Owner),
    }
}

/// Enforces field tiers across an update payload.
#[derive(Debug, Clone)]
pub struct FieldAccessGuard {
    resolver: PermissionResolver,
}

impl FieldAccessGuard {
    #[must_use]
    pub fn new(resolver: PermissionResolver) -> Self {
        Self { resolver }
    }

    /// Authorizes every field in `fields` for writing, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::FieldForbidden`] naming the first field the
    /// caller may not write.
    pub fn authorize_fields<I, S>(
        &self,
        identity: &Identity,
        entity: &EntitySnapshot,
        tiers: &FieldTierMap,
        fields: I,
    ) -> Result<(), AccessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.authorize_fields_at(identity, entity, tiers, fields, Utc::now())
    }

    /// Like [`authorize_fields`](Self::authorize_fields), evaluating self
    /// windows at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::FieldForbidden`] naming the first field the
    /// caller may not write.
    pub fn authorize_fields_at<I, S>(
        &self,
        identity: &Identity,
        entity: &EntitySnapshot,
        tiers: &FieldTierMap,
        fields: I,
        now: DateTime<Utc>,
    ) -> Result<(), AccessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let requirement = PermissionRequirement::write(entity.resource_type());
        let caller = self
            .resolver
            .resolve_at(identity, Some(entity), &requirement, now)
            .ok();

        for field in fields {
            let field = field.as_ref();
            if !tier_permits_write(tiers.tier_of(field), caller) {
                return Err(AccessError::FieldForbidden {
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Authorizes the attribute keys of a JSONAPI update document.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::FieldForbidden`] naming the first attribute the
    /// caller may not write.
    pub fn authorize_attributes(
        &self,
        identity: &Identity,
        entity: &EntitySnapshot,
        tiers: &FieldTierMap,
        attributes: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), AccessError> {
        self.authorize_fields(identity, entity, tiers, attributes.keys())
    }
}
