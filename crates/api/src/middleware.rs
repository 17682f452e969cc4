use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use rolegate_auth::AuthorizationGateway;
use rolegate_core::ApplicationName;

use crate::app::errors::{gateway_error_to_response, json_error, unauthorized};

/// Header naming the client application a request is made for.
pub const APPLICATION_HEADER: &str = "x-application-name";

#[derive(Clone)]
pub struct AuthState {
    pub gateway: Arc<AuthorizationGateway>,
}

/// Verify the bearer token and attach the resulting `Principal` to the request.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers()).ok_or_else(unauthorized)?;
    let application = application_name(req.headers())?;

    let principal = state
        .gateway
        .authenticate(token, application.as_ref(), Utc::now())
        .map_err(|e| {
            tracing::debug!(reason = e.reason(), error = %e, "access token rejected");
            gateway_error_to_response(&e)
        })?;

    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

pub(crate) fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let (scheme, token) = header.to_str().ok()?.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

/// The optional `X-Application-Name` header; present but invalid is a 400.
pub(crate) fn application_name(headers: &HeaderMap) -> Result<Option<ApplicationName>, Response> {
    let Some(value) = headers.get(APPLICATION_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| ApplicationName::new(v).ok())
        .map(Some)
        .ok_or_else(|| {
            json_error(
                axum::http::StatusCode::BAD_REQUEST,
                "invalid_application",
                "X-Application-Name is not a valid application name",
            )
        })
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_requires_scheme_and_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer a.b.c"));
        assert_eq!(extract_bearer(&headers), Some("a.b.c"));
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        for value in ["bearer a.b.c", "BEARER a.b.c", "BeArEr  a.b.c"] {
            headers.insert("authorization", HeaderValue::from_static(value));
            assert_eq!(extract_bearer(&headers), Some("a.b.c"), "{value}");
        }

        headers.insert("authorization", HeaderValue::from_static("Bearera.b.c"));
        assert_eq!(extract_bearer(&headers), None);
    }

    #[test]
    fn application_header_is_optional_but_validated() {
        let mut headers = HeaderMap::new();
        assert!(matches!(application_name(&headers), Ok(None)));

        headers.insert(APPLICATION_HEADER, HeaderValue::from_static("portal"));
        assert!(matches!(
            application_name(&headers),
            Ok(Some(app)) if app.as_str() == "portal"
        ));

        headers.insert(APPLICATION_HEADER, HeaderValue::from_static(" portal"));
        assert!(application_name(&headers).is_err());
    }
}
