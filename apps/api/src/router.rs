use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::{appointment_routes, AppointmentBookingService, AppointmentState};
use shared_config::AppConfig;
use vet_cell::router::vet_routes;

pub fn create_router(config: Arc<AppConfig>, booking: Arc<AppointmentBookingService>) -> Router {
    let appointment_state = Arc::new(AppointmentState {
        booking,
        config: config.clone(),
    });

    Router::new()
        .route("/", get(|| async { "Vet scheduling API is running!" }))
        .nest("/appointments", appointment_routes(appointment_state))
        .nest("/vets", vet_routes(config))
}
