mod common;

use assert_matches::assert_matches;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use appointment_cell::models::*;
use appointment_cell::services::conflict::{
    booking_window_conflicts, interval_conflicts, overlaps, ConflictDetectionService,
};

use common::{at, Fixture};

fn appointment(id: i64, start: DateTime<Utc>, duration: Option<i32>, status: AppointmentStatus) -> Appointment {
    Appointment {
        id,
        public_id: Uuid::new_v4(),
        pet_id: Uuid::new_v4(),
        vet_id: Uuid::new_v4(),
        clinic_id: Uuid::new_v4(),
        appointment_date: start,
        duration_minutes: duration,
        appointment_type: AppointmentType::Dental,
        notes: None,
        status,
        metadata: AppointmentMetadata::default(),
        created_at: start,
        updated_at: start,
    }
}

#[test]
fn touching_intervals_do_not_overlap() {
    let (nine, half_nine, ten) = (at(2025, 5, 1, 9, 0), at(2025, 5, 1, 9, 30), at(2025, 5, 1, 10, 0));

    assert!(!overlaps(nine, half_nine, half_nine, ten));
    assert!(overlaps(nine, ten, half_nine, ten));
}

#[test]
fn booking_window_is_strict_on_both_sides() {
    let candidate = at(2025, 5, 1, 10, 0);
    let existing = vec![
        appointment(1, at(2025, 5, 1, 9, 30), Some(30), AppointmentStatus::Confirmed),
        appointment(2, at(2025, 5, 1, 9, 31), Some(30), AppointmentStatus::Confirmed),
        appointment(3, at(2025, 5, 1, 10, 29), Some(30), AppointmentStatus::Confirmed),
        appointment(4, at(2025, 5, 1, 10, 30), Some(30), AppointmentStatus::Confirmed),
    ];

    let ids: Vec<i64> = booking_window_conflicts(candidate, &existing, None).iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![2, 3]);
}

#[test]
fn booking_window_ignores_duration() {
    // A long surgery starting an hour earlier still runs past 10:00
    let existing = vec![appointment(1, at(2025, 5, 1, 9, 0), Some(120), AppointmentStatus::Confirmed)];

    assert!(booking_window_conflicts(at(2025, 5, 1, 10, 0), &existing, None).is_empty());
    assert_eq!(interval_conflicts(at(2025, 5, 1, 10, 0), 30, &existing, None).len(), 1);
}

#[test]
fn cancelled_and_excluded_appointments_never_conflict() {
    let start = at(2025, 5, 1, 10, 0);
    let existing = vec![
        appointment(1, start, Some(30), AppointmentStatus::Cancelled),
        appointment(2, start, Some(30), AppointmentStatus::Requested),
    ];

    assert!(booking_window_conflicts(start, &existing, Some(2)).is_empty());
    assert!(interval_conflicts(start, 30, &existing, Some(2)).is_empty());
}

#[test]
fn missing_duration_defaults_to_thirty_minutes() {
    let existing = vec![appointment(1, at(2025, 5, 1, 10, 0), None, AppointmentStatus::Confirmed)];

    assert_eq!(interval_conflicts(at(2025, 5, 1, 10, 29), 30, &existing, None).len(), 1);
    assert!(interval_conflicts(at(2025, 5, 1, 10, 30), 30, &existing, None).is_empty());
}

#[tokio::test]
async fn vet_check_only_sees_that_vet() {
    let fx = Fixture::new();
    fx.seed_for(fx.pet.id, Uuid::new_v4(), at(2025, 5, 1, 10, 0), AppointmentStatus::Confirmed, Some(30));

    let conflicts = ConflictDetectionService::new(fx.store.clone());

    assert!(conflicts.check_vet(fx.vet.id, at(2025, 5, 1, 10, 0), None).await.is_ok());
    assert_matches!(
        conflicts.check_owner(fx.owner_id, at(2025, 5, 1, 10, 0), None).await,
        Err(AppointmentError::OwnerConflict)
    );
}

#[tokio::test]
async fn vet_check_reports_conflict_and_honours_exclusion() {
    let fx = Fixture::new();
    let existing = fx.seed(at(2025, 5, 1, 10, 0), AppointmentStatus::Requested);

    let conflicts = ConflictDetectionService::new(fx.store.clone());

    assert_matches!(
        conflicts.check_vet(fx.vet.id, at(2025, 5, 1, 9, 45), None).await,
        Err(AppointmentError::VetConflict)
    );
    assert!(conflicts.check_vet(fx.vet.id, at(2025, 5, 1, 9, 45), Some(existing.id)).await.is_ok());
}
