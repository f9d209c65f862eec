//! Immutable entity snapshots.
//!
//! Resource handlers fetch an entity once and hand the decision layer a
//! snapshot of the parts that matter for access: creation time, ownership
//! links, open/closed state and current relationship linkage. Decisions are
//! pure functions of the snapshot; nothing is re-fetched mid-decision.

use crate::identity::AuthenticatedIdentity;
use crate::resource::ResourceType;
use chrono::{DateTime, Utc};
use ratline_core::{RatId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// A direct ownership link from an entity to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Owner {
    /// Owned by a user (creator, or the user record itself).
    User(UserId),
    /// Owned by whoever owns the rat (assigned rat, first limpet, ship pilot).
    Rat(RatId),
}

/// When a linked caller keeps self access to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SelfWindow {
    /// Self access never lapses.
    Unbounded,
    /// Self access holds while the entity is younger than `max_age`.
    Age { max_age: Duration },
    /// Self access holds while the entity is open.
    Open,
    /// Self access holds while the entity is young OR still open.
    AgeOrOpen { max_age: Duration },
}

impl SelfWindow {
    /// Returns true if the window is still open for the entity at `now`.
    #[must_use]
    pub fn holds(&self, entity: &EntitySnapshot, now: DateTime<Utc>) -> bool {
        match *self {
            Self::Unbounded => true,
            Self::Age { max_age } => entity.age_at(now) < max_age,
            Self::Open => entity.is_open(),
            Self::AgeOrOpen { max_age } => entity.is_open() || entity.age_at(now) < max_age,
        }
    }
}

/// Access-relevant view of a stored entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    resource_type: ResourceType,
    id: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    owners: Vec<Owner>,
    #[serde(default)]
    open: bool,
    #[serde(default)]
    relationships: BTreeMap<String, BTreeSet<String>>,
}

impl EntitySnapshot {
    /// Creates a closed snapshot with no owners and no relationships.
    #[must_use]
    pub fn new(resource_type: ResourceType, id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            resource_type,
            id: id.into(),
            created_at,
            owners: Vec::new(),
            open: false,
            relationships: BTreeMap::new(),
        }
    }

    /// Adds an ownership link.
    #[must_use]
    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owners.push(owner);
        self
    }

    /// Marks the entity open or closed.
    #[must_use]
    pub fn with_open(mut self, open: bool) -> Self {
        self.open = open;
        self
    }

    /// Records the current linkage of a relationship.
    #[must_use]
    pub fn with_relationship<I, S>(mut self, name: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relationships
            .insert(name.into(), ids.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn owners(&self) -> &[Owner] {
        &self.owners
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Returns the current linkage of a relationship, if recorded.
    #[must_use]
    pub fn related(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.relationships.get(name)
    }

    /// Age of the entity at `now`. Entities dated in the future have age zero.
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or_default()
    }

    /// Returns true if the caller is directly linked to the entity.
    #[must_use]
    pub fn is_linked_to(&self, identity: &AuthenticatedIdentity) -> bool {
        self.owners.iter().any(|owner| match owner {
            Owner::User(user_id) => *user_id == identity.user_id(),
            Owner::Rat(rat_id) => identity.owns_rat(*rat_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use ratline_core::RescueId;

    const HOUR: Duration = Duration::from_secs(3600);

    fn rescue(age: TimeDelta, now: DateTime<Utc>) -> EntitySnapshot {
        EntitySnapshot::new(ResourceType::Rescues, RescueId::new().to_string(), now - age)
    }

    #[test]
    fn linked_through_rat_or_user() {
        let rat = RatId::new();
        let user = UserId::new();
        let identity = AuthenticatedIdentity::new(user, Vec::new()).with_rats([rat]);
        let now = Utc::now();

        assert!(rescue(TimeDelta::zero(), now).with_owner(Owner::Rat(rat)).is_linked_to(&identity));
        assert!(rescue(TimeDelta::zero(), now).with_owner(Owner::User(user)).is_linked_to(&identity));
        assert!(!rescue(TimeDelta::zero(), now)
            .with_owner(Owner::Rat(RatId::new()))
            .is_linked_to(&identity));
    }

    #[test]
    fn age_window_lapses() {
        let now = Utc::now();
        let window = SelfWindow::Age { max_age: HOUR };
        assert!(window.holds(&rescue(TimeDelta::minutes(10), now), now));
        assert!(!window.holds(&rescue(TimeDelta::hours(2), now), now));
    }

    #[test]
    fn age_or_open_keeps_open_entities() {
        let now = Utc::now();
        let window = SelfWindow::AgeOrOpen { max_age: HOUR };
        let old = rescue(TimeDelta::hours(5), now);
        assert!(!window.holds(&old, now));
        assert!(window.holds(&old.with_open(true), now));
    }

    #[test]
    fn future_entities_have_zero_age() {
        let now = Utc::now();
        let snapshot = rescue(TimeDelta::minutes(-5), now);
        assert_eq!(snapshot.age_at(now), Duration::ZERO);
    }
}
