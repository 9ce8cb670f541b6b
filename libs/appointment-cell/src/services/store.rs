use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentFilter, AppointmentPatch, AppointmentStatus,
    NewAppointment, Pet, UserProfile,
};

// ==============================================================================
// COLLABORATOR TRAITS
// ==============================================================================

/// Persistence boundary for appointments. Every write is scoped by public id.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn create(&self, appointment: &NewAppointment) -> Result<Appointment, AppointmentError>;

    /// Returns `None` when no appointment has this public id.
    async fn update(&self, public_id: Uuid, patch: &AppointmentPatch) -> Result<Option<Appointment>, AppointmentError>;

    async fn find_unique(&self, public_id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    /// Ordered by start time.
    async fn find_many(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, AppointmentError>;
}

#[async_trait]
pub trait PetDirectory: Send + Sync {
    async fn get_pet(&self, public_id: Uuid) -> Result<Option<Pet>, AppointmentError>;

    async fn get_pet_by_id(&self, pet_id: Uuid) -> Result<Option<Pet>, AppointmentError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, AppointmentError>;
}

// ==============================================================================
// SUPABASE IMPLEMENTATIONS
// ==============================================================================

async fn first_row<T: DeserializeOwned>(supabase: &SupabaseClient, path: &str) -> Result<Option<T>, AppointmentError> {
    let result: Vec<Value> = supabase.request(Method::GET, path, None, None).await?;

    match result.into_iter().next() {
        Some(row) => Ok(Some(serde_json::from_value(row)?)),
        None => Ok(None),
    }
}

pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// PostgREST query for a filter. Owner filtering joins through `pets`.
    pub fn query_path(filter: &AppointmentFilter) -> String {
        let mut path = if filter.owner_user_id.is_some() {
            "/rest/v1/appointments?select=*,pets!inner(owner_user_id)".to_string()
        } else {
            "/rest/v1/appointments?select=*".to_string()
        };

        if let Some(owner) = filter.owner_user_id {
            path.push_str(&format!("&pets.owner_user_id=eq.{}", owner));
        }
        if let Some(vet_id) = filter.vet_id {
            path.push_str(&format!("&vet_id=eq.{}", vet_id));
        }
        if let Some(from) = filter.from {
            path.push_str(&format!("&appointment_date=gte.{}", urlencoding::encode(&from.to_rfc3339())));
        }
        if let Some(to) = filter.to {
            path.push_str(&format!("&appointment_date=lt.{}", urlencoding::encode(&to.to_rfc3339())));
        }
        if filter.exclude_cancelled {
            path.push_str(&format!("&status=neq.{}", AppointmentStatus::Cancelled));
        }

        path.push_str("&order=appointment_date.asc");
        path
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn create(&self, appointment: &NewAppointment) -> Result<Appointment, AppointmentError> {
        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                None,
                Some(json!(appointment)),
                Some(SupabaseClient::return_representation()),
            )
            .await?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Failed to create appointment".to_string()))?;

        let created: Appointment = serde_json::from_value(row)?;
        info!("Appointment {} stored with id {}", created.public_id, created.id);
        Ok(created)
    }

    async fn update(&self, public_id: Uuid, patch: &AppointmentPatch) -> Result<Option<Appointment>, AppointmentError> {
        debug!("Updating appointment {}", public_id);

        let mut body = json!(patch);
        body["updated_at"] = json!(chrono::Utc::now().to_rfc3339());

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &format!("/rest/v1/appointments?public_id=eq.{}", public_id),
                None,
                Some(body),
                Some(SupabaseClient::return_representation()),
            )
            .await?;

        match result.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    async fn find_unique(&self, public_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        first_row(&self.supabase, &format!("/rest/v1/appointments?public_id=eq.{}", public_id)).await
    }

    async fn find_many(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, AppointmentError> {
        let path = Self::query_path(filter);
        debug!("Querying appointments: {}", path);

        let result: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;

        let appointments = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()?;

        Ok(appointments)
    }
}

pub struct SupabasePetDirectory {
    supabase: Arc<SupabaseClient>,
}

impl SupabasePetDirectory {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl PetDirectory for SupabasePetDirectory {
    async fn get_pet(&self, public_id: Uuid) -> Result<Option<Pet>, AppointmentError> {
        first_row(&self.supabase, &format!("/rest/v1/pets?public_id=eq.{}", public_id)).await
    }

    async fn get_pet_by_id(&self, pet_id: Uuid) -> Result<Option<Pet>, AppointmentError> {
        first_row(&self.supabase, &format!("/rest/v1/pets?id=eq.{}", pet_id)).await
    }
}

pub struct SupabaseUserDirectory {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseUserDirectory {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl UserDirectory for SupabaseUserDirectory {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, AppointmentError> {
        first_row(&self.supabase, &format!("/rest/v1/profiles?id=eq.{}", user_id)).await
    }
}
