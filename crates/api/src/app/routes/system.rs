use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use rolegate_auth::Principal;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /whoami - The principal the access token resolves to
pub async fn whoami(Extension(principal): Extension<Principal>) -> impl IntoResponse {
    Json(serde_json::json!({
        "subject": principal.subject().as_str(),
        "application": principal.application().as_str(),
        "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
    }))
}
