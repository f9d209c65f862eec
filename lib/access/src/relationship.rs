//! Relationship mutation.
//!
//! JSONAPI relationship endpoints (`POST|PATCH|DELETE
//! /<resource>/:id/relationships/<name>`) all go through
//! [`RelationshipMutator`]. It looks up the relationship descriptor,
//! applies the descriptor's guard, enforces cardinality, computes the
//! resulting linkage from the entity snapshot and only then hands the
//! actual linkage change to the resource's [`RelationshipStore`].
//!
//! Adds of identifiers already present and removals of absent ones are
//! no-ops that never reach the store.

use crate::entity::EntitySnapshot;
use crate::error::AccessError;
use crate::identity::Identity;
use crate::requirement::PermissionRequirement;
use crate::resolver::PermissionResolver;
use crate::resource::ResourceType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ratline_core::RatId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Relationship descriptors of one resource type, keyed by name.
pub type RelationshipTable = BTreeMap<String, RelationshipDescriptor>;

/// A relationship sub-operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipOperation {
    /// Link additional identifiers.
    Add,
    /// Replace the linkage.
    Patch,
    /// Unlink identifiers.
    Remove,
}

impl fmt::Display for RelationshipOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Add => "add",
            Self::Patch => "patch",
            Self::Remove => "remove",
        };
        write!(f, "{name}")
    }
}

/// To-one or to-many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

/// Who may change a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "permissions", rename_all = "camelCase")]
pub enum RelationshipGuard {
    /// No check beyond whatever the handler already did.
    Unrestricted,
    /// Any one of the permissions.
    Permissions(BTreeSet<String>),
    /// Every target is a rat the caller owns, or any one of the permissions.
    OwnedRatsOr(BTreeSet<String>),
    /// The caller may write the entity itself (self tier included).
    EntityWrite,
}

/// Configuration of one relationship on a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDescriptor {
    target: ResourceType,
    cardinality: Cardinality,
    operations: BTreeSet<RelationshipOperation>,
    guard: RelationshipGuard,
}

impl RelationshipDescriptor {
    /// A to-many relationship supporting add, patch and remove.
    #[must_use]
    pub fn many(target: ResourceType, guard: RelationshipGuard) -> Self {
        Self::with_operations(
            target,
            Cardinality::Many,
            guard,
            [
                RelationshipOperation::Add,
                RelationshipOperation::Patch,
                RelationshipOperation::Remove,
            ],
        )
    }

    /// A to-one relationship supporting add, patch and remove.
    #[must_use]
    pub fn one(target: ResourceType, guard: RelationshipGuard) -> Self {
        Self::with_operations(
            target,
            Cardinality::One,
            guard,
            [
                RelationshipOperation::Add,
                RelationshipOperation::Patch,
                RelationshipOperation::Remove,
            ],
        )
    }

    /// A relationship supporting only the listed operations.
    #[must_use]
    pub fn with_operations<I>(
        target: ResourceType,
        cardinality: Cardinality,
        guard: RelationshipGuard,
        operations: I,
    ) -> Self
    where
        I: IntoIterator<Item = RelationshipOperation>,
    {
        Self {
            target,
            cardinality,
            operations: operations.into_iter().collect(),
            guard,
        }
    }

    #[must_use]
    pub fn target(&self) -> ResourceType {
        self.target
    }

    #[must_use]
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    #[must_use]
    pub fn guard(&self) -> &RelationshipGuard {
        &self.guard
    }

    #[must_use]
    pub fn supports(&self, operation: RelationshipOperation) -> bool {
        self.operations.contains(&operation)
    }
}

/// A validated, authorized relationship change ready for the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipChange {
    /// Relationship name.
    pub relationship: String,
    /// Requested operation.
    pub operation: RelationshipOperation,
    /// Identifiers to hand to the store callback.
    pub linkage: BTreeSet<String>,
    /// Linkage before the change.
    pub current: BTreeSet<String>,
    /// Linkage after the change.
    pub resulting: BTreeSet<String>,
}

impl RelationshipChange {
    /// Returns true if applying the change would not alter the linkage.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.resulting == self.current
    }
}

/// Persistence callbacks of a resource's relationships.
///
/// Implementations touch storage; the mutator never retries them and
/// surfaces their errors unchanged.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Storage error type.
    type Error: Send;

    /// Links `ids` to the entity.
    async fn add(
        &self,
        entity: &EntitySnapshot,
        relationship: &str,
        ids: &BTreeSet<String>,
    ) -> Result<(), Self::Error>;

    /// Replaces the entity's linkage with `ids`.
    async fn patch(
        &self,
        entity: &EntitySnapshot,
        relationship: &str,
        ids: &BTreeSet<String>,
    ) -> Result<(), Self::Error>;

    /// Unlinks `ids` from the entity.
    async fn remove(
        &self,
        entity: &EntitySnapshot,
        relationship: &str,
        ids: &BTreeSet<String>,
    ) -> Result<(), Self::Error>;
}

/// Failure of [`RelationshipMutator::mutate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationError<E> {
    /// Rejected before reaching the store.
    Access(AccessError),
    /// The store callback failed.
    Store(E),
}

impl<E: fmt::Display> fmt::Display for MutationError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "relationship store failed: {e}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for MutationError<E> {}

impl<E> From<AccessError> for MutationError<E> {
    fn from(e: AccessError) -> Self {
        Self::Access(e)
    }
}

/// Applies add/patch/remove operations to named relationships.
#[derive(Debug, Clone)]
pub struct RelationshipMutator {
    resolver: PermissionResolver,
}

impl RelationshipMutator {
    #[must_use]
    pub fn new(resolver: PermissionResolver) -> Self {
        Self { resolver }
    }

    /// Validates and authorizes a change, computing the resulting linkage.
    ///
    /// # Errors
    ///
    /// - [`AccessError::UnsupportedRelationship`] for unknown names
    /// - [`AccessError::UnsupportedOperation`] if the descriptor lacks `operation`
    /// - [`AccessError::RelationshipForbidden`] if the guard rejects the caller
    /// - [`AccessError::Cardinality`] for to-one add/patch without exactly one id
    pub fn plan<I, S>(
        &self,
        identity: &Identity,
        entity: &EntitySnapshot,
        relationships: &RelationshipTable,
        name: &str,
        operation: RelationshipOperation,
        ids: I,
    ) -> Result<RelationshipChange, AccessError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.plan_at(identity, entity, relationships, name, operation, ids, Utc::now())
    }

    /// Like [`plan`](Self::plan), evaluating self windows at `now`.
    ///
    /// # Errors
    ///
    /// See [`plan`](Self::plan).
    #[expect(clippy::too_many_arguments)]
    pub fn plan_at<I, S>(
        &self,
        identity: &Identity,
        entity: &EntitySnapshot,
        relationships: &RelationshipTable,
        name: &str,
        operation: RelationshipOperation,
        ids: I,
        now: DateTime<Utc>,
    ) -> Result<RelationshipChange, AccessError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let descriptor =
            relationships
                .get(name)
                .ok_or_else(|| AccessError::UnsupportedRelationship {
                    resource: entity.resource_type(),
                    relationship: name.to_string(),
                })?;

        if !descriptor.supports(operation) {
            return Err(AccessError::UnsupportedOperation {
                relationship: name.to_string(),
                operation,
            });
        }

        let requested: BTreeSet<String> = ids.into_iter().map(Into::into).collect();

        if !self.guard_permits(descriptor.guard(), identity, entity, &requested, now) {
            return Err(AccessError::RelationshipForbidden {
                relationship: name.to_string(),
            });
        }

        let current = entity.related(name).cloned().unwrap_or_default();
        let (linkage, resulting) = match (descriptor.cardinality(), operation) {
            (Cardinality::One, RelationshipOperation::Add | RelationshipOperation::Patch) => {
                if requested.len() != 1 {
                    return Err(AccessError::Cardinality {
                        relationship: name.to_string(),
                        received: requested.len(),
                    });
                }
                (requested.clone(), requested)
            }
            (Cardinality::One, RelationshipOperation::Remove) => (current.clone(), BTreeSet::new()),
            (Cardinality::Many, RelationshipOperation::Add) => {
                let added: BTreeSet<String> = requested.difference(&current).cloned().collect();
                let resulting = current.union(&added).cloned().collect();
                (added, resulting)
            }
            (Cardinality::Many, RelationshipOperation::Patch) => (requested.clone(), requested),
            (Cardinality::Many, RelationshipOperation::Remove) => {
                let removed: BTreeSet<String> = requested.intersection(&current).cloned().collect();
                let resulting = current.difference(&removed).cloned().collect();
                (removed, resulting)
            }
        };

        Ok(RelationshipChange {
            relationship: name.to_string(),
            operation,
            linkage,
            current,
            resulting,
        })
    }

    /// Plans the change and delegates it to the store, returning the
    /// resulting linkage for re-rendering.
    ///
    /// # Errors
    ///
    /// [`MutationError::Access`] for any rejection from [`plan`](Self::plan);
    /// [`MutationError::Store`] with the store's error, unchanged.
    #[expect(clippy::too_many_arguments)]
    pub async fn mutate<St, I, S>(
        &self,
        identity: &Identity,
        entity: &EntitySnapshot,
        relationships: &RelationshipTable,
        name: &str,
        operation: RelationshipOperation,
        ids: I,
        store: &St,
    ) -> Result<BTreeSet<String>, MutationError<St::Error>>
    where
        St: RelationshipStore + ?Sized,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let change = self.plan(identity, entity, relationships, name, operation, ids)?;
        if change.is_noop() {
            return Ok(change.resulting);
        }

        let stored = match change.operation {
            RelationshipOperation::Add => store.add(entity, name, &change.linkage).await,
            RelationshipOperation::Patch => store.patch(entity, name, &change.linkage).await,
            RelationshipOperation::Remove => store.remove(entity, name, &change.linkage).await,
        };
        stored.map_err(MutationError::Store)?;

        Ok(change.resulting)
    }

    fn guard_permits(
        &self,
        guard: &RelationshipGuard,
        identity: &Identity,
        entity: &EntitySnapshot,
        ids: &BTreeSet<String>,
        now: DateTime<Utc>,
    ) -> bool {
        if identity.is_admin() {
            return true;
        }
        match guard {
            RelationshipGuard::Unrestricted => true,
            RelationshipGuard::Permissions(permissions) => identity.has_any_permission(permissions),
            RelationshipGuard::OwnedRatsOr(permissions) => {
                let owns_all = identity.as_authenticated().is_some_and(|caller| {
                    !ids.is_empty()
                        && ids.iter().all(|id| {
                            id.parse::<RatId>()
                                .is_ok_and(|rat| caller.owns_rat(rat))
                        })
                });
                owns_all || identity.has_any_permission(permissions)
            }
            RelationshipGuard::EntityWrite => self
                .resolver
                .resolve_at(
                    identity,
                    Some(entity),
                    &PermissionRequirement::write(entity.resource_type()),
                    now,
                )
                .is_ok(),
        }
    }
}
