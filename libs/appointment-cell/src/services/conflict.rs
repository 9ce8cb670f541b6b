use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentError, AppointmentFilter, AppointmentStatus, BOOKING_WINDOW_MINUTES,
};
use crate::services::store::AppointmentStore;

/// Half-open interval overlap: `[a_start, a_end)` and `[b_start, b_end)`.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

fn is_candidate(appointment: &Appointment, exclude_id: Option<i64>) -> bool {
    appointment.status != AppointmentStatus::Cancelled && Some(appointment.id) != exclude_id
}

/// Appointments whose own `[start, start + duration)` overlaps the candidate.
/// Drives the slot table.
pub fn interval_conflicts<'a>(
    candidate_start: DateTime<Utc>,
    candidate_duration_minutes: i64,
    existing: &'a [Appointment],
    exclude_id: Option<i64>,
) -> Vec<&'a Appointment> {
    let candidate_end = candidate_start + Duration::minutes(candidate_duration_minutes);

    existing
        .iter()
        .filter(|a| is_candidate(a, exclude_id))
        .filter(|a| overlaps(candidate_start, candidate_end, a.appointment_date, a.end_time()))
        .collect()
}

/// Booking-time check: an appointment conflicts when its start lies strictly
/// within `BOOKING_WINDOW_MINUTES` of the candidate start, whatever either
/// duration is.
pub fn booking_window_conflicts<'a>(
    candidate_start: DateTime<Utc>,
    existing: &'a [Appointment],
    exclude_id: Option<i64>,
) -> Vec<&'a Appointment> {
    let window = Duration::minutes(BOOKING_WINDOW_MINUTES);
    let (lower, upper) = (candidate_start - window, candidate_start + window);

    existing
        .iter()
        .filter(|a| is_candidate(a, exclude_id))
        .filter(|a| a.appointment_date > lower && a.appointment_date < upper)
        .collect()
}

pub struct ConflictDetectionService {
    store: Arc<dyn AppointmentStore>,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    fn window_filter(start: DateTime<Utc>) -> AppointmentFilter {
        let window = Duration::minutes(BOOKING_WINDOW_MINUTES);
        AppointmentFilter {
            from: Some(start - window),
            to: Some(start + window),
            exclude_cancelled: true,
            ..AppointmentFilter::default()
        }
    }

    /// Fails with `VetConflict` when the vet has another appointment around `start`.
    pub async fn check_vet(
        &self,
        vet_id: Uuid,
        start: DateTime<Utc>,
        exclude_id: Option<i64>,
    ) -> Result<(), AppointmentError> {
        debug!("Checking vet {} for conflicts at {}", vet_id, start);

        let existing = self
            .store
            .find_many(&AppointmentFilter {
                vet_id: Some(vet_id),
                ..Self::window_filter(start)
            })
            .await?;

        let conflicts = booking_window_conflicts(start, &existing, exclude_id);
        if let Some(first) = conflicts.first() {
            warn!("Vet {} already booked at {} (appointment {})", vet_id, first.appointment_date, first.public_id);
            return Err(AppointmentError::VetConflict);
        }

        Ok(())
    }

    /// Fails with `OwnerConflict` when any pet of `owner_user_id` has another
    /// appointment around `start`.
    pub async fn check_owner(
        &self,
        owner_user_id: Uuid,
        start: DateTime<Utc>,
        exclude_id: Option<i64>,
    ) -> Result<(), AppointmentError> {
        debug!("Checking owner {} for conflicts at {}", owner_user_id, start);

        let existing = self
            .store
            .find_many(&AppointmentFilter {
                owner_user_id: Some(owner_user_id),
                ..Self::window_filter(start)
            })
            .await?;

        let conflicts = booking_window_conflicts(start, &existing, exclude_id);
        if let Some(first) = conflicts.first() {
            warn!("Owner {} already booked at {} (appointment {})", owner_user_id, first.appointment_date, first.public_id);
            return Err(AppointmentError::OwnerConflict);
        }

        Ok(())
    }
}
