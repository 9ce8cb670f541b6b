use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ==============================================================================
// EMAIL
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailTemplate {
    AppointmentRequested,
    AppointmentConfirmed,
    AppointmentCancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub template: EmailTemplate,
    pub to: String,
    pub subject: String,
    pub data: serde_json::Value,
}

// ==============================================================================
// IN-APP NOTIFICATIONS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AppointmentRescheduled,
    AppointmentCancelled,
    AppointmentConfirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub link: Option<String>,
}

// ==============================================================================
// CALENDAR
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub summary: String,
    pub description: String,
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Email provider not configured")]
    NotConfigured,

    #[error("Email delivery failed: {message}")]
    EmailFailed { message: String },

    #[error("Notification could not be stored: {message}")]
    NotificationFailed { message: String },

    #[error("Calendar API error: {message}")]
    CalendarFailed { message: String },
}

