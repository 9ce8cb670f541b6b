// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AppointmentState};

pub fn appointment_routes(state: Arc<AppointmentState>) -> Router {
    // Every appointment operation requires authentication
    let protected_routes = Router::new()
        .route("/", post(handlers::create_appointment))
        .route("/slots", get(handlers::get_available_slots))
        .route("/calendar/resync", post(handlers::resync_calendar))
        .route("/{public_id}", get(handlers::get_appointment))
        .route("/{public_id}/reschedule", patch(handlers::reschedule_appointment))
        .route("/{public_id}/cancel", post(handlers::cancel_appointment))

        // Clinic-side transitions
        .route("/{public_id}/confirm", post(handlers::confirm_appointment))
        .route("/{public_id}/check-in", post(handlers::check_in_appointment))
        .route("/{public_id}/complete", post(handlers::complete_appointment))
        .route("/{public_id}/status", put(handlers::change_appointment_status)) // Admin only

        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
