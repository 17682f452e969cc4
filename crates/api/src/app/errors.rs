use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use rolegate_auth::{AuthzError, GatewayError, TokenError};

/// Every authentication failure looks the same to the client; the reason is
/// logged by the gateway.
pub fn gateway_error_to_response(err: &GatewayError) -> axum::response::Response {
    match err {
        GatewayError::Token(TokenError::Signing(_)) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "token could not be issued",
        ),
        GatewayError::ApplicationMismatch => json_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "token is not valid for this application",
        ),
        _ => unauthorized(),
    }
}

pub fn authz_error_to_response(err: &AuthzError) -> axum::response::Response {
    match err {
        AuthzError::Forbidden(_) => json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string()),
    }
}

pub fn unauthorized() -> axum::response::Response {
    json_error(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        "authentication failed",
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
