use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::error::AppError;

use crate::models::{TimeSlot, VetError};
use crate::services::availability::{AvailabilityResolver, SupabaseAvailabilityStore};
use crate::services::directory::{SupabaseVetDirectory, VetDirectory};

#[derive(Debug, Deserialize)]
pub struct CandidateSlotsQuery {
    pub clinic_id: Uuid,
    pub date: NaiveDate,
}

impl From<VetError> for AppError {
    fn from(e: VetError) -> Self {
        match e {
            VetError::NotFound => AppError::NotFound(e.to_string()),
            VetError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

fn resolver(config: &AppConfig) -> AvailabilityResolver {
    let supabase = Arc::new(SupabaseClient::new(config));
    AvailabilityResolver::new(Arc::new(SupabaseAvailabilityStore::new(supabase)))
}

#[axum::debug_handler]
pub async fn get_veterinarian(
    State(state): State<Arc<AppConfig>>,
    Path(vet_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let directory = SupabaseVetDirectory::new(Arc::new(SupabaseClient::new(&state)));

    let vet = directory
        .get_veterinarian(vet_id)
        .await?
        .ok_or(VetError::NotFound)?;

    Ok(Json(json!(vet)))
}

#[axum::debug_handler]
pub async fn get_weekly_availability(
    State(state): State<Arc<AppConfig>>,
    Path(vet_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let windows = resolver(&state).weekly_schedule(vet_id).await?;

    Ok(Json(json!({
        "vet_id": vet_id,
        "availability": windows
    })))
}

#[axum::debug_handler]
pub async fn get_candidate_slots(
    State(state): State<Arc<AppConfig>>,
    Path(vet_id): Path<Uuid>,
    Query(query): Query<CandidateSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let slots: Vec<TimeSlot> = resolver(&state)
        .resolve_slots(vet_id, query.clinic_id, query.date)
        .await?
        .map(TimeSlot::open)
        .collect();

    Ok(Json(json!({
        "vet_id": vet_id,
        "clinic_id": query.clinic_id,
        "date": query.date,
        "slots": slots,
        "note": "Candidate slots from the weekly schedule. Bookings are not applied; use /appointments/slots."
    })))
}
