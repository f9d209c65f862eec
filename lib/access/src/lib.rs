//! Access decisions for the ratline API.
//!
//! This crate provides:
//!
//! - **Identities and groups**: who is calling and what they hold
//! - **Permission resolver**: administrative, group, self and anonymous tiers
//! - **Field guard**: all-or-nothing per-field write authorization
//! - **Read filter**: per-field read visibility
//! - **Relationship mutator**: add/patch/remove with cardinality and guards
//!
//! Every decision is a pure function of the caller identity and an entity
//! snapshot. Nothing here logs or retries; callers translate
//! [`AccessError`] into responses.

pub mod entity;
pub mod error;
pub mod field;
pub mod group;
pub mod identity;
pub mod read;
pub mod relationship;
pub mod requirement;
pub mod resolver;
pub mod resource;

pub use entity::{EntitySnapshot, Owner, SelfWindow};
pub use error::AccessError;
pub use field::{FieldAccessGuard, FieldTier, FieldTierMap};
pub use group::Group;
pub use identity::{AnonymousIdentity, AuthenticatedIdentity, Identity, SCOPE_WILDCARD};
pub use read::{ReadAccess, ReadFilter};
pub use relationship::{
    Cardinality, MutationError, RelationshipChange, RelationshipDescriptor, RelationshipGuard,
    RelationshipMutator, RelationshipOperation, RelationshipStore, RelationshipTable,
};
pub use requirement::PermissionRequirement;
pub use resolver::{PermissionResolver, Tier};
pub use resource::{ResourceDefinition, ResourceRegistry, ResourceType};
