use std::sync::Arc;

use axum::{routing::get, Router};

use shared_config::AppConfig;

use crate::handlers;

/// Read-only vet routes. Schedules are public, like clinic opening hours.
pub fn vet_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/{vet_id}", get(handlers::get_veterinarian))
        .route("/{vet_id}/availability", get(handlers::get_weekly_availability))
        .route("/{vet_id}/slots", get(handlers::get_candidate_slots))
        .with_state(state)
}
