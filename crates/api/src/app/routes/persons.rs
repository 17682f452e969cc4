//! Person records, guarded by the `AccessPerson` capability.

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use rolegate_auth::{Capability, Principal};
use rolegate_core::Username;

use crate::app::AppState;
use crate::app::errors::{authz_error_to_response, json_error};

/// GET /persons/:username - Readable by the person themselves and by administrators
pub async fn get_person(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(username): Path<String>,
) -> Response {
    let Ok(owner) = Username::new(username) else {
        return json_error(StatusCode::BAD_REQUEST, "invalid_username", "invalid username");
    };

    if let Err(e) = state
        .authorizer
        .authorize(&principal, Capability::AccessPerson { owner: &owner })
    {
        tracing::info!(subject = %principal.subject(), owner = %owner, "person access denied");
        return authz_error_to_response(&e);
    }

    Json(serde_json::json!({
        "username": owner.as_str(),
        "application": principal.application().as_str(),
        "requestedBy": principal.subject().as_str(),
    }))
    .into_response()
}
