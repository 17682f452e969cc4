use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};

use rolegate_auth::JWKS_CACHE_CONTROL;

use crate::app::AppState;

/// GET /.well-known/jwks.json - Public keys for verifying issued tokens
///
/// Answers `304 Not Modified` when `If-None-Match` covers the current ETag.
pub async fn jwks(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let publisher = &state.jwks;
    let cache_headers = [
        (header::CACHE_CONTROL, JWKS_CACHE_CONTROL.to_string()),
        (header::ETAG, publisher.etag().to_string()),
    ];

    let not_modified = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| publisher.matches(v));
    if not_modified {
        return (StatusCode::NOT_MODIFIED, cache_headers).into_response();
    }

    let set = publisher.publish();
    (cache_headers, Json(set.as_ref())).into_response()
}
