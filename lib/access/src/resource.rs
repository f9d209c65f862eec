//! Resource types and their access definitions.

use crate::entity::SelfWindow;
use crate::field::{FieldTier, FieldTierMap};
use crate::relationship::{
    Cardinality, RelationshipDescriptor, RelationshipGuard, RelationshipOperation,
    RelationshipTable,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::Duration;

/// Rescues stay writable by their assigned rats for this long after creation.
pub const RESCUE_SELF_WINDOW: Duration = Duration::from_secs(3600);

const TIMESTAMPS: [&str; 3] = ["createdAt", "updatedAt", "deletedAt"];

/// Resource collections exposed by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceType {
    Users,
    Rats,
    Rescues,
    Ships,
    Groups,
    Clients,
}

impl ResourceType {
    /// The collection name, which is also the permission prefix.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Rats => "rats",
            Self::Rescues => "rescues",
            Self::Ships => "ships",
            Self::Groups => "groups",
            Self::Clients => "clients",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything the decision layer knows about one resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    resource_type: ResourceType,
    self_window: SelfWindow,
    write_tiers: FieldTierMap,
    read_tiers: FieldTierMap,
    #[serde(default)]
    relationships: RelationshipTable,
}

impl ResourceDefinition {
    /// A definition with no writable fields, group-only reads and no
    /// relationships.
    #[must_use]
    pub fn new(resource_type: ResourceType, self_window: SelfWindow) -> Self {
        Self {
            resource_type,
            self_window,
            write_tiers: FieldTierMap::write_default(),
            read_tiers: FieldTierMap::new(FieldTier::Group),
            relationships: RelationshipTable::new(),
        }
    }

    #[must_use]
    pub fn with_write_tiers(mut self, tiers: FieldTierMap) -> Self {
        self.write_tiers = tiers;
        self
    }

    #[must_use]
    pub fn with_read_tiers(mut self, tiers: FieldTierMap) -> Self {
        self.read_tiers = tiers;
        self
    }

    #[must_use]
    pub fn with_relationship(mut self, name: impl Into<String>, descriptor: RelationshipDescriptor) -> Self {
        self.relationships.insert(name.into(), descriptor);
        self
    }

    #[must_use]
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    #[must_use]
    pub fn self_window(&self) -> SelfWindow {
        self.self_window
    }

    #[must_use]
    pub fn write_tiers(&self) -> &FieldTierMap {
        &self.write_tiers
    }

    #[must_use]
    pub fn read_tiers(&self) -> &FieldTierMap {
        &self.read_tiers
    }

    #[must_use]
    pub fn relationships(&self) -> &RelationshipTable {
        &self.relationships
    }
}

/// Lookup of resource definitions by type.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    definitions: HashMap<ResourceType, ResourceDefinition>,
}

impl ResourceRegistry {
    /// An empty registry. Unregistered types never grant self access.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The users, rescues and ships definitions the API ships with.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(users());
        registry.register(rescues());
        registry.register(ships());
        registry
    }

    /// Adds or replaces a definition.
    pub fn register(&mut self, definition: ResourceDefinition) {
        self.definitions.insert(definition.resource_type(), definition);
    }

    #[must_use]
    pub fn get(&self, resource_type: ResourceType) -> Option<&ResourceDefinition> {
        self.definitions.get(&resource_type)
    }
}

fn permissions(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

fn with_timestamps(tiers: FieldTierMap) -> FieldTierMap {
    TIMESTAMPS
        .into_iter()
        .fold(tiers, |tiers, field| tiers.with(field, FieldTier::Internal))
}

fn users() -> ResourceDefinition {
    let write = with_timestamps(
        FieldTierMap::write_default()
            .with("data", FieldTier::Group)
            .with("stripeId", FieldTier::Group)
            .with("email", FieldTier::Sudo)
            .with("password", FieldTier::Sudo)
            .with("status", FieldTier::Sudo)
            .with("suspended", FieldTier::Sudo)
            .with("frontierId", FieldTier::Internal),
    );
    let read = FieldTierMap::new(FieldTier::Owner).with("password", FieldTier::Internal);

    ResourceDefinition::new(ResourceType::Users, SelfWindow::Unbounded)
        .with_write_tiers(write)
        .with_read_tiers(read)
        .with_relationship(
            "rats",
            RelationshipDescriptor::many(
                ResourceType::Rats,
                RelationshipGuard::Permissions(permissions(&["rats.write"])),
            ),
        )
        .with_relationship(
            "displayRat",
            RelationshipDescriptor::with_operations(
                ResourceType::Rats,
                Cardinality::One,
                RelationshipGuard::OwnedRatsOr(permissions(&["rats.write"])),
                [RelationshipOperation::Patch],
            ),
        )
        .with_relationship(
            "groups",
            RelationshipDescriptor::many(
                ResourceType::Groups,
                RelationshipGuard::Permissions(permissions(&["groups.write"])),
            ),
        )
        .with_relationship(
            "clients",
            RelationshipDescriptor::many(
                ResourceType::Clients,
                RelationshipGuard::Permissions(permissions(&["clients.write"])),
            ),
        )
}

fn rescues() -> ResourceDefinition {
    let assigned = [
        "client",
        "clientNick",
        "clientLanguage",
        "codeRed",
        "notes",
        "platform",
        "system",
        "title",
        "unidentifiedRats",
        "status",
        "outcome",
        "quotes",
    ];
    let write = assigned
        .into_iter()
        .fold(FieldTierMap::write_default(), |tiers, field| {
            tiers.with(field, FieldTier::Owner)
        })
        .with("data", FieldTier::Group)
        .with("commandIdentifier", FieldTier::Group);
    let read = FieldTierMap::new(FieldTier::Group).with("deletedAt", FieldTier::Internal);

    ResourceDefinition::new(
        ResourceType::Rescues,
        SelfWindow::AgeOrOpen {
            max_age: RESCUE_SELF_WINDOW,
        },
    )
    .with_write_tiers(with_timestamps(write))
    .with_read_tiers(read)
    .with_relationship(
        "rats",
        RelationshipDescriptor::many(ResourceType::Rats, RelationshipGuard::EntityWrite),
    )
    .with_relationship(
        "firstLimpet",
        RelationshipDescriptor::one(ResourceType::Rats, RelationshipGuard::EntityWrite),
    )
}

fn ships() -> ResourceDefinition {
    let write = with_timestamps(
        FieldTierMap::write_default()
            .with("name", FieldTier::Group)
            .with("shipType", FieldTier::Group)
            .with("shipId", FieldTier::Internal),
    );

    ResourceDefinition::new(ResourceType::Ships, SelfWindow::Unbounded)
        .with_write_tiers(write)
        .with_read_tiers(FieldTierMap::new(FieldTier::Public))
        .with_relationship(
            "rat",
            RelationshipDescriptor::one(ResourceType::Rats, RelationshipGuard::Unrestricted),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_type_display_is_collection_name() {
        assert_eq!(ResourceType::Rescues.to_string(), "rescues");
        assert_eq!(
            serde_json::to_string(&ResourceType::Users).expect("serialize"),
            "\"users\""
        );
    }

    #[test]
    fn builtin_registers_users_rescues_ships() {
        let registry = ResourceRegistry::builtin();
        assert!(registry.get(ResourceType::Users).is_some());
        assert!(registry.get(ResourceType::Rescues).is_some());
        assert!(registry.get(ResourceType::Ships).is_some());
        assert!(registry.get(ResourceType::Groups).is_none());
    }

    #[test]
    fn timestamps_are_never_writable() {
        let registry = ResourceRegistry::builtin();
        for resource in [ResourceType::Users, ResourceType::Rescues, ResourceType::Ships] {
            let definition = registry.get(resource).expect("registered");
            for field in TIMESTAMPS {
                assert_eq!(definition.write_tiers().tier_of(field), FieldTier::Internal);
            }
        }
    }

    #[test]
    fn rescue_self_window_is_age_or_open() {
        let registry = ResourceRegistry::builtin();
        let rescues = registry.get(ResourceType::Rescues).expect("registered");
        assert_eq!(
            rescues.self_window(),
            SelfWindow::AgeOrOpen {
                max_age: Duration::from_secs(3600)
            }
        );
    }

    #[test]
    fn display_rat_is_patch_only() {
        let registry = ResourceRegistry::builtin();
        let users = registry.get(ResourceType::Users).expect("registered");
        let display_rat = users.relationships().get("displayRat").expect("declared");
        assert_eq!(display_rat.cardinality(), Cardinality::One);
        assert!(display_rat.supports(RelationshipOperation::Patch));
        assert!(!display_rat.supports(RelationshipOperation::Add));
        assert!(!display_rat.supports(RelationshipOperation::Remove));
    }

    #[test]
    fn definitions_deserialize_from_json() {
        let definition: ResourceDefinition = serde_json::from_value(serde_json::json!({
            "resourceType": "rats",
            "selfWindow": { "type": "unbounded" },
            "writeTiers": { "fields": { "name": "self" }, "default": "internal" },
            "readTiers": { "default": "public" }
        }))
        .expect("deserialize");
        assert_eq!(definition.write_tiers().tier_of("name"), FieldTier::Owner);
        assert_eq!(definition.write_tiers().tier_of("odyssey"), FieldTier::Internal);
        assert!(definition.relationships().is_empty());
    }
}
