//! Owner identity middleware.
//!
//! Token verification happens upstream (gateway or auth proxy); by the
//! time a request reaches this service the authenticated principal is
//! carried in the `X-Owner-Id` header. The middleware parses it and puts
//! the [`OwnerId`] into request extensions for the handlers.

use axum::{
    Json,
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use wallet_types::OwnerId;

pub const OWNER_HEADER: &str = "x-owner-id";

/// Parses the owner header. Accepts a bare UUID or `Bearer <uuid>`.
fn extract_owner(header: Option<&str>) -> Option<OwnerId> {
    let value = header?.trim();
    let value = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    value.parse::<OwnerId>().ok().filter(|owner| !owner.is_nil())
}

/// Rejects requests without a valid owner identity.
///
/// Endpoints that bypass the check:
/// - `/health` - Health check endpoint
pub async fn owner_middleware(mut request: Request<Body>, next: Next) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let header = request
        .headers()
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok());

    match extract_owner(header) {
        Some(owner) => {
            request.extensions_mut().insert(owner);
            next.run(request).await
        }
        None => unauthorized_response("Missing or invalid owner identity"),
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": message,
            "code": 401
        })),
    )
        .into_response()
}
