use axum::{Router, routing::get};

use crate::app::AppState;

pub mod auth;
pub mod jwks;
pub mod persons;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/persons/:username", get(persons::get_person))
}
