//! Error types for the dispatch layer.
//!
//! [`ApiError`] turns access and budget rejections into JSONAPI error
//! documents. [`StartupError`] is the context for process startup failures,
//! carried in a rootcause report.

use axum::Json;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use ratline_access::{AccessError, MutationError};
use ratline_traffic::RateLimitStatus;
use serde_json::{Value, json};
use std::fmt;

pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// A request rejected before or during handling.
#[derive(Debug)]
pub enum ApiError {
    /// The caller's hourly budget is spent.
    RateLimited { status: RateLimitStatus },
    /// Coffee-pot commands are not served.
    Teapot,
    /// An access decision rejected the request.
    Access(AccessError),
    /// A relationship store failed.
    Store { details: String },
}

impl ApiError {
    /// HTTP status for the error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Teapot => StatusCode::IM_A_TEAPOT,
            Self::Access(error) => match error {
                AccessError::Forbidden { .. }
                | AccessError::FieldForbidden { .. }
                | AccessError::RelationshipForbidden { .. } => StatusCode::FORBIDDEN,
                AccessError::UnsupportedRelationship { .. }
                | AccessError::UnsupportedOperation { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                AccessError::Cardinality { .. } => StatusCode::BAD_REQUEST,
            },
            Self::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON pointer into the request document that caused the error.
    fn pointer(&self) -> Option<String> {
        match self {
            Self::Access(AccessError::FieldForbidden { field }) => {
                Some(format!("/data/attributes/{field}"))
            }
            Self::Access(
                AccessError::RelationshipForbidden { .. }
                | AccessError::UnsupportedRelationship { .. }
                | AccessError::UnsupportedOperation { .. },
            ) => Some("/relationships".to_string()),
            Self::Access(AccessError::Cardinality { .. }) => Some("/data".to_string()),
            _ => None,
        }
    }

    /// The JSONAPI error document for the response body.
    #[must_use]
    pub fn document(&self) -> Value {
        let status = self.status_code();
        let mut error = json!({
            "status": status.as_str(),
            "title": status.canonical_reason().unwrap_or("Error"),
            "detail": self.to_string(),
        });
        if let Some(pointer) = self.pointer() {
            error["source"] = json!({ "pointer": pointer });
        }
        json!({ "errors": [error] })
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited { status } => {
                write!(
                    f,
                    "rate limit of {} requests per hour exceeded, resets at {}",
                    status.total,
                    status.resets_at.to_rfc3339()
                )
            }
            Self::Teapot => write!(f, "the server refuses to brew coffee because it is a teapot"),
            Self::Access(error) => write!(f, "{error}"),
            // Store details stay in the logs.
            Self::Store { .. } => write!(f, "the relationship could not be updated"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<AccessError> for ApiError {
    fn from(error: AccessError) -> Self {
        Self::Access(error)
    }
}

impl<E: fmt::Display> From<MutationError<E>> for ApiError {
    fn from(error: MutationError<E>) -> Self {
        match error {
            MutationError::Access(error) => Self::Access(error),
            MutationError::Store(error) => Self::Store {
                details: error.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Access(error @ AccessError::UnsupportedRelationship { .. }) => {
                tracing::warn!(%error, "Request for undeclared relationship");
            }
            Self::Access(error) if error.is_forbidden() => {
                tracing::debug!(%error, "Access denied");
            }
            Self::Store { details } => {
                tracing::warn!(%details, "Relationship store failed");
            }
            _ => {}
        }

        let mut response = (self.status_code(), Json(self.document())).into_response();
        if let Self::RateLimited { status } = &self {
            insert_rate_limit_headers(response.headers_mut(), status);
        }
        response
    }
}

/// Adds the `X-RateLimit-*` headers describing `status`.
pub fn insert_rate_limit_headers(headers: &mut HeaderMap, status: &RateLimitStatus) {
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(status.total));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(status.remaining));
    if let Ok(reset) = HeaderValue::from_str(&status.resets_at.to_rfc3339()) {
        headers.insert(RATE_LIMIT_RESET, reset);
    }
}

/// Process startup failures.
#[derive(Debug)]
pub enum StartupError {
    /// Configuration could not be loaded.
    Config { details: String },
    /// The listener could not bind.
    Bind { address: String, details: String },
    /// The server stopped with an I/O error.
    Serve { details: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "failed to load configuration: {details}"),
            Self::Bind { address, details } => {
                write!(f, "failed to bind to '{address}': {details}")
            }
            Self::Serve { details } => write!(f, "server error: {details}"),
        }
    }
}

impl std::error::Error for StartupError {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ratline_access::{PermissionRequirement, RelationshipOperation, ResourceType};

    #[test]
    fn field_forbidden_points_at_attribute() {
        let error = ApiError::from(AccessError::FieldForbidden {
            field: "status".to_string(),
        });
        assert_eq!(error.status_code(), StatusCode::FORBIDDEN);

        let document = error.document();
        assert_eq!(document["errors"][0]["status"], "403");
        assert_eq!(document["errors"][0]["source"]["pointer"], "/data/attributes/status");
    }

    #[test]
    fn forbidden_requirement_is_403() {
        let error = ApiError::from(AccessError::Forbidden {
            requirement: PermissionRequirement::write(ResourceType::Rescues),
        });
        assert_eq!(error.status_code(), StatusCode::FORBIDDEN);
        assert!(error.to_string().contains("rescues.write"));
    }

    #[test]
    fn relationship_errors_map_to_client_statuses() {
        let unsupported = ApiError::from(AccessError::UnsupportedRelationship {
            resource: ResourceType::Ships,
            relationship: "groups".to_string(),
        });
        let operation = ApiError::from(AccessError::UnsupportedOperation {
            relationship: "displayRat".to_string(),
            operation: RelationshipOperation::Add,
        });
        let cardinality = ApiError::from(AccessError::Cardinality {
            relationship: "rat".to_string(),
            received: 2,
        });

        assert_eq!(unsupported.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(operation.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(cardinality.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_details_are_not_exposed() {
        let error = ApiError::from(MutationError::<String>::Store("deadlock detected".to_string()));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!error.document().to_string().contains("deadlock"));
    }

    #[test]
    fn rate_limited_response_carries_headers() {
        let status = RateLimitStatus {
            exceeded: true,
            remaining: 0,
            total: 360,
            resets_at: Utc::now(),
        };
        let response = ApiError::RateLimited { status }.into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RATE_LIMIT_LIMIT], "360");
        assert_eq!(response.headers()[RATE_LIMIT_REMAINING], "0");
        assert!(response.headers().contains_key(RATE_LIMIT_RESET));
    }
}
