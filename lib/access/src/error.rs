//! Error types for access decisions.
//!
//! All variants are permanent for the request that produced them: the
//! resource handler translates them to a response and nothing here is
//! retried.

use crate::relationship::RelationshipOperation;
use crate::requirement::PermissionRequirement;
use crate::resource::ResourceType;
use std::fmt;

/// A rejected access decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// The caller does not satisfy the requirement.
    Forbidden { requirement: PermissionRequirement },
    /// The caller may not write this field; nothing in the payload applies.
    FieldForbidden { field: String },
    /// The relationship guard rejected the caller.
    RelationshipForbidden { relationship: String },
    /// The resource type declares no such relationship.
    UnsupportedRelationship {
        resource: ResourceType,
        relationship: String,
    },
    /// The relationship exists but does not accept this operation.
    UnsupportedOperation {
        relationship: String,
        operation: RelationshipOperation,
    },
    /// A to-one relationship was given other than exactly one identifier.
    Cardinality { relationship: String, received: usize },
}

impl AccessError {
    /// Returns true for authorization rejections (as opposed to requests
    /// that could never succeed for anyone).
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            Self::Forbidden { .. } | Self::FieldForbidden { .. } | Self::RelationshipForbidden { .. }
        )
    }
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forbidden { requirement } => {
                write!(f, "forbidden: requires {requirement}")
            }
            Self::FieldForbidden { field } => {
                write!(f, "forbidden: field '{field}' is not writable by caller")
            }
            Self::RelationshipForbidden { relationship } => {
                write!(f, "forbidden: relationship '{relationship}' is not writable by caller")
            }
            Self::UnsupportedRelationship {
                resource,
                relationship,
            } => {
                write!(f, "resource '{resource}' has no relationship '{relationship}'")
            }
            Self::UnsupportedOperation {
                relationship,
                operation,
            } => {
                write!(f, "relationship '{relationship}' does not support {operation}")
            }
            Self::Cardinality {
                relationship,
                received,
            } => {
                write!(
                    f,
                    "relationship '{relationship}' is to-one but {received} identifiers were given"
                )
            }
        }
    }
}

impl std::error::Error for AccessError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_forbidden_names_field() {
        let err = AccessError::FieldForbidden {
            field: "createdAt".to_string(),
        };
        assert!(err.to_string().contains("createdAt"));
        assert!(err.is_forbidden());
    }

    #[test]
    fn unsupported_relationship_names_resource() {
        let err = AccessError::UnsupportedRelationship {
            resource: ResourceType::Users,
            relationship: "ships".to_string(),
        };
        assert!(err.to_string().contains("users"));
        assert!(err.to_string().contains("ships"));
        assert!(!err.is_forbidden());
    }

    #[test]
    fn cardinality_reports_count() {
        let err = AccessError::Cardinality {
            relationship: "displayRat".to_string(),
            received: 2,
        };
        assert!(err.to_string().contains("2 identifiers"));
    }
}
