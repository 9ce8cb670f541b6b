use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Length of one bookable slot, and the stride between slot starts.
pub const SLOT_MINUTES: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Veterinarian {
    pub id: Uuid,
    pub user_id: Uuid,
    pub clinic_id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clinic {
    pub id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

/// Recurring weekly working hours of one vet at one clinic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub vet_id: Uuid,
    pub clinic_id: Uuid,
    pub day_of_week: i32, // 0 = Sunday, 1 = Monday, etc.
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_available: bool,
}

/// A candidate slot on a concrete date. Computed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start_time: DateTime<Utc>,
    pub is_available: bool,
    pub status: Option<String>,
    pub appointment_id: Option<Uuid>,
}

impl TimeSlot {
    pub fn open(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            is_available: true,
            status: None,
            appointment_id: None,
        }
    }

    pub fn booked(start_time: DateTime<Utc>, appointment_id: Uuid) -> Self {
        Self {
            start_time,
            is_available: false,
            status: Some("booked".to_string()),
            appointment_id: Some(appointment_id),
        }
    }
}

#[derive(Error, Debug)]
pub enum VetError {
    #[error("Veterinarian not found")]
    NotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for VetError {
    fn from(e: anyhow::Error) -> Self {
        VetError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for VetError {
    fn from(e: serde_json::Error) -> Self {
        VetError::DatabaseError(format!("Failed to parse row: {}", e))
    }
}
