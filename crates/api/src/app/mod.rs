//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `state.rs`: shared services built from configuration
//! - `routes/`: HTTP routes + handlers
//! - `errors.rs`: consistent error responses

use axum::{
    Router,
    routing::{get, post},
};

use crate::middleware;

pub mod errors;
pub mod routes;
pub mod state;

pub use state::AppState;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(state: AppState) -> Router {
    let auth_state = middleware::AuthState {
        gateway: state.gateway.clone(),
    };

    // Protected routes: require a valid access token.
    let protected = routes::router().route_layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/refresh", post(routes::auth::refresh))
        .route("/.well-known/jwks.json", get(routes::jwks::jwks))
        .merge(protected)
        .with_state(state)
}
