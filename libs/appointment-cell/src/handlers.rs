// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, CreateAppointmentRequest, RescheduleAppointmentRequest, Requester, SlotQuery,
    StatusOverrideRequest,
};
use crate::services::booking::AppointmentBookingService;

/// Shared by every appointment route. The booking service is built once at
/// startup so the per-vet locks and the outbox are process-wide.
pub struct AppointmentState {
    pub booking: Arc<AppointmentBookingService>,
    pub config: Arc<AppConfig>,
}

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound
            | AppointmentError::PetNotFound
            | AppointmentError::VetNotFound
            | AppointmentError::ClinicNotFound => AppError::NotFound(e.to_string()),
            AppointmentError::VetConflict | AppointmentError::OwnerConflict => AppError::Conflict(e.to_string()),
            AppointmentError::InvalidState { .. } => AppError::InvalidState(e.to_string()),
            AppointmentError::Unauthorized => AppError::Forbidden(e.to_string()),
            AppointmentError::ValidationError(msg) => AppError::BadRequest(msg),
            AppointmentError::MissingRelation(_) | AppointmentError::SideEffectFailed(_) => {
                AppError::PartiallyApplied(e.to_string())
            }
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

fn requester(user: &User) -> Result<Requester, AppError> {
    Requester::try_from(user).map_err(|_| AppError::Auth("Invalid user id in token".to_string()))
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let requester = requester(&user)?;

    let appointment = state.booking.create_appointment(requester, request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment_id": appointment.public_id,
        "appointment": appointment,
        "message": "Appointment requested"
    })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(public_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let requester = requester(&user)?;

    let appointment = state
        .booking
        .reschedule_appointment(requester, public_id, request)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment rescheduled"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(public_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let requester = requester(&user)?;

    let appointment_id = state.booking.cancel_appointment(requester, public_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment_id": appointment_id,
        "message": "Appointment cancelled"
    })))
}

// ==============================================================================
// STATUS TRANSITIONS
// ==============================================================================

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(public_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let requester = requester(&user)?;

    let appointment_id = state.booking.confirm_appointment(requester, public_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment_id": appointment_id,
        "message": "Appointment confirmed"
    })))
}

#[axum::debug_handler]
pub async fn check_in_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(public_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let requester = requester(&user)?;

    let appointment = state.booking.check_in_appointment(requester, public_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(public_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let requester = requester(&user)?;

    let appointment = state.booking.complete_appointment(requester, public_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

/// Admin-only overwrite; bypasses the state machine.
#[axum::debug_handler]
pub async fn change_appointment_status(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(public_id): Path<Uuid>,
    Json(request): Json<StatusOverrideRequest>,
) -> Result<Json<Value>, AppError> {
    let requester = requester(&user)?;

    let appointment = state
        .booking
        .change_status(requester, public_id, request.status)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

// ==============================================================================
// QUERIES
// ==============================================================================

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(public_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let requester = requester(&user)?;

    let details = state.booking.get_appointment(requester, public_id).await?;

    Ok(Json(json!(details)))
}

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppointmentState>>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    debug!("Slot table for vet {} on {}", query.vet_id, query.date);

    let slots = state
        .booking
        .available_slots(query.vet_id, query.clinic_id, query.date)
        .await?;

    Ok(Json(json!({
        "vet_id": query.vet_id,
        "clinic_id": query.clinic_id,
        "date": query.date,
        "slots": slots
    })))
}

#[axum::debug_handler]
pub async fn resync_calendar(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let requester = requester(&user)?;

    let report = state.booking.resync_calendar(requester).await?;

    Ok(Json(json!({
        "success": true,
        "report": report
    })))
}
