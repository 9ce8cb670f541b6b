// libs/appointment-cell/src/models.rs
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use notification_cell::NotificationError;
use shared_models::auth::User;
use vet_cell::models::{Clinic, Veterinarian, VetError};

pub const DEFAULT_DURATION_MINUTES: i32 = 30;

/// Half-width of the window used by the booking-time conflict check.
pub const BOOKING_WINDOW_MINUTES: i64 = 30;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: i64,
    pub public_id: Uuid,
    pub pet_id: Uuid,
    pub vet_id: Uuid,
    pub clinic_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    #[serde(default)]
    pub duration_minutes: Option<i32>,
    pub appointment_type: AppointmentType,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: AppointmentMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES) as i64)
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.appointment_date + self.duration()
    }
}

/// Cross-system correlation ids. Keys other than the calendar event id are
/// kept as-is so writes never drop them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppointmentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_event_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Requested,
    Confirmed,
    CheckedIn,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }

    /// Statuses whose appointment belongs on the owner's calendar.
    pub fn is_on_calendar(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Requested | AppointmentStatus::Confirmed | AppointmentStatus::CheckedIn
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Requested => write!(f, "requested"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::CheckedIn => write!(f, "checked_in"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    #[serde(alias = "wellness", alias = "checkup")]
    WellnessExam,
    Vaccination,
    BehavioralConsult,
    Dental,
    SurgeryConsult,
    FollowUp,
    Emergency,
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentType::WellnessExam => write!(f, "Wellness exam"),
            AppointmentType::Vaccination => write!(f, "Vaccination"),
            AppointmentType::BehavioralConsult => write!(f, "Behavioral consult"),
            AppointmentType::Dental => write!(f, "Dental"),
            AppointmentType::SurgeryConsult => write!(f, "Surgery consult"),
            AppointmentType::FollowUp => write!(f, "Follow-up"),
            AppointmentType::Emergency => write!(f, "Emergency"),
        }
    }
}

// ==============================================================================
// RELATED RECORDS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pet {
    pub id: Uuid,
    pub public_id: Uuid,
    pub owner_user_id: Uuid,
    pub name: String,
    pub species: Option<String>,
    pub breed: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: Option<String>,
    pub full_name: Option<String>,
    /// OAuth token for the user's external calendar; `None` when sync is off.
    pub calendar_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentDetails {
    pub appointment: Appointment,
    pub pet: Option<Pet>,
    pub veterinarian: Option<Veterinarian>,
    pub clinic: Option<Clinic>,
}

/// Identity of the caller, passed explicitly into every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub user_id: Uuid,
    pub is_admin: bool,
}

impl Requester {
    pub fn user(user_id: Uuid) -> Self {
        Self { user_id, is_admin: false }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self { user_id, is_admin: true }
    }
}

impl TryFrom<&User> for Requester {
    type Error = AppointmentError;

    fn try_from(user: &User) -> Result<Self, Self::Error> {
        let user_id = Uuid::parse_str(&user.id)
            .map_err(|_| AppointmentError::ValidationError("Invalid user id".to_string()))?;

        Ok(Self {
            user_id,
            is_admin: user.is_admin(),
        })
    }
}

// ==============================================================================
// REQUEST / PERSISTENCE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    /// Public id of the pet.
    pub pet_id: Uuid,
    pub vet_id: Uuid,
    pub clinic_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub appointment_type: AppointmentType,
    pub notes: Option<String>,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_start_time: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusOverrideRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotQuery {
    pub vet_id: Uuid,
    pub clinic_id: Uuid,
    pub date: NaiveDate,
}

/// Row inserted on booking.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewAppointment {
    pub public_id: Uuid,
    pub pet_id: Uuid,
    pub vet_id: Uuid,
    pub clinic_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub duration_minutes: i32,
    pub appointment_type: AppointmentType,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
    pub metadata: AppointmentMetadata,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AppointmentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AppointmentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AppointmentMetadata>,
}

impl AppointmentPatch {
    pub fn status(status: AppointmentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn metadata(metadata: AppointmentMetadata) -> Self {
        Self {
            metadata: Some(metadata),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentFilter {
    pub vet_id: Option<Uuid>,
    /// Matches appointments of any pet owned by this user.
    pub owner_user_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub exclude_cancelled: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResyncReport {
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Pet not found")]
    PetNotFound,

    #[error("Veterinarian not found")]
    VetNotFound,

    #[error("Clinic not found")]
    ClinicNotFound,

    #[error("The veterinarian already has an appointment around this time")]
    VetConflict,

    #[error("The pet owner already has an appointment around this time")]
    OwnerConflict,

    #[error("cannot {action} a {status} appointment")]
    InvalidState { action: &'static str, status: AppointmentStatus },

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("{0} data missing")]
    MissingRelation(&'static str),

    #[error("Appointment was updated but a follow-up step failed: {0}")]
    SideEffectFailed(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<VetError> for AppointmentError {
    fn from(e: VetError) -> Self {
        match e {
            VetError::NotFound => AppointmentError::VetNotFound,
            VetError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
        }
    }
}

impl From<NotificationError> for AppointmentError {
    fn from(e: NotificationError) -> Self {
        AppointmentError::SideEffectFailed(e.to_string())
    }
}

impl From<anyhow::Error> for AppointmentError {
    fn from(e: anyhow::Error) -> Self {
        AppointmentError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for AppointmentError {
    fn from(e: serde_json::Error) -> Self {
        AppointmentError::DatabaseError(format!("Failed to parse row: {}", e))
    }
}
