//! Request budget middleware.
//!
//! Runs before any handler. The caller is whoever an earlier layer put in
//! the request extensions as an [`Identity`]; without one the request is
//! anonymous and keyed by its peer address.

use crate::app::AppState;
use crate::error::{ApiError, insert_rate_limit_headers};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use ratline_access::Identity;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Content type answered with 418 before any budget is spent.
pub const COFFEE_POT_COMMAND: &str = "application/coffee-pot-command";

/// Identifies the caller, checks its budget and annotates the response.
pub async fn rate_limit(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if is_coffee_pot_command(&request) {
        return ApiError::Teapot.into_response();
    }

    let identity = caller(&request);
    let status = state.traffic.check(&identity, true);
    if status.exceeded {
        tracing::debug!(
            total = status.total,
            resets_at = %status.resets_at,
            "Request budget exceeded"
        );
        return ApiError::RateLimited { status }.into_response();
    }

    request.extensions_mut().insert(identity);
    let mut response = next.run(request).await;
    insert_rate_limit_headers(response.headers_mut(), &status);
    response
}

fn is_coffee_pot_command(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(COFFEE_POT_COMMAND))
}

/// The caller's identity. Requests without a known peer share one bucket.
fn caller(request: &Request) -> Identity {
    if let Some(identity) = request.extensions().get::<Identity>() {
        return identity.clone();
    }
    let address = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |ConnectInfo(peer)| peer.ip());
    Identity::anonymous(address)
}
