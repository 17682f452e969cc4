//! Login and refresh endpoints.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;

use rolegate_auth::BasicCredentials;

use crate::app::AppState;
use crate::app::errors::{gateway_error_to_response, json_error, unauthorized};
use crate::middleware::application_name;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// POST /auth/login - Exchange Basic credentials for a token pair
///
/// The application comes from `X-Application-Name`.
pub async fn login(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let application = match application_name(&headers) {
        Ok(Some(app)) => app,
        Ok(None) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                "missing_application",
                "X-Application-Name header is required",
            );
        }
        Err(resp) => return resp,
    };

    let Some(credentials) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(BasicCredentials::from_authorization_header)
    else {
        return unauthorized();
    };

    match state
        .gateway
        .login(&credentials, &application, Utc::now())
        .await
    {
        Ok(pair) => (StatusCode::OK, Json(pair)).into_response(),
        Err(e) => gateway_error_to_response(&e),
    }
}

/// POST /auth/refresh - Rotate a refresh token into a new token pair
pub async fn refresh(
    State(state): State<AppState>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) if !request.refresh_token.trim().is_empty() => request,
        Ok(_) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "refreshToken must not be empty",
            );
        }
        Err(rejection) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                rejection.body_text(),
            );
        }
    };

    match state
        .gateway
        .refresh(request.refresh_token.trim(), Utc::now())
        .await
    {
        Ok(pair) => (StatusCode::OK, Json(pair)).into_response(),
        Err(e) => gateway_error_to_response(&e),
    }
}
