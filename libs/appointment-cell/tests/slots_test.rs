mod common;

use std::sync::atomic::Ordering;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use uuid::Uuid;

use appointment_cell::models::*;

use common::{at, Fixture};

// 2030-06-03 is a Monday
const MONDAY: i32 = 1;

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 6, 3).unwrap()
}

#[tokio::test]
async fn slot_table_marks_overlapping_bookings() {
    let fx = Fixture::new();
    fx.weekly_window(MONDAY, (9, 0), (11, 0));

    let booked = fx.seed(at(2030, 6, 3, 9, 30), AppointmentStatus::Confirmed);
    fx.seed(at(2030, 6, 3, 10, 0), AppointmentStatus::Cancelled);
    let straddling = fx.seed(at(2030, 6, 3, 10, 45), AppointmentStatus::Requested);

    let slots = fx.service().available_slots(fx.vet.id, fx.clinic_id, monday()).await.unwrap();

    let starts: Vec<_> = slots.iter().map(|s| s.start_time).collect();
    assert_eq!(
        starts,
        vec![at(2030, 6, 3, 9, 0), at(2030, 6, 3, 9, 30), at(2030, 6, 3, 10, 0), at(2030, 6, 3, 10, 30)]
    );

    assert!(slots[0].is_available);
    assert!(!slots[1].is_available);
    assert_eq!(slots[1].appointment_id, Some(booked.public_id));
    assert_eq!(slots[1].status.as_deref(), Some("booked"));
    assert!(slots[2].is_available, "cancelled bookings free the slot");
    assert_eq!(slots[3].appointment_id, Some(straddling.public_id));
}

#[tokio::test]
async fn long_appointment_blocks_every_slot_it_covers() {
    let fx = Fixture::new();
    fx.weekly_window(MONDAY, (9, 0), (11, 0));
    fx.seed_for(fx.pet.id, fx.vet.id, at(2030, 6, 3, 9, 0), AppointmentStatus::Confirmed, Some(90));

    let slots = fx.service().available_slots(fx.vet.id, fx.clinic_id, monday()).await.unwrap();

    let open: Vec<bool> = slots.iter().map(|s| s.is_available).collect();
    assert_eq!(open, vec![false, false, false, true]);
}

#[tokio::test]
async fn other_vets_bookings_are_ignored() {
    let fx = Fixture::new();
    fx.weekly_window(MONDAY, (9, 0), (10, 0));
    fx.seed_for(fx.pet.id, Uuid::new_v4(), at(2030, 6, 3, 9, 0), AppointmentStatus::Confirmed, Some(30));

    let slots = fx.service().available_slots(fx.vet.id, fx.clinic_id, monday()).await.unwrap();

    assert_eq!(slots.len(), 2);
    assert!(slots.iter().all(|s| s.is_available));
}

#[tokio::test]
async fn no_window_for_the_day_means_no_slots() {
    let fx = Fixture::new();
    fx.weekly_window(MONDAY + 1, (9, 0), (17, 0));

    let slots = fx.service().available_slots(fx.vet.id, fx.clinic_id, monday()).await.unwrap();

    assert!(slots.is_empty());
}

#[tokio::test]
async fn unknown_vet_or_clinic_is_not_found() {
    let fx = Fixture::new();
    fx.weekly_window(MONDAY, (9, 0), (10, 0));
    let service = fx.service();

    assert_matches!(
        service.available_slots(Uuid::new_v4(), fx.clinic_id, monday()).await,
        Err(AppointmentError::VetNotFound)
    );
    assert_matches!(
        service.available_slots(fx.vet.id, Uuid::new_v4(), monday()).await,
        Err(AppointmentError::ClinicNotFound)
    );
}

// ==============================================================================
// CALENDAR RESYNC
// ==============================================================================

#[tokio::test]
async fn resync_pushes_active_upcoming_appointments() {
    let fx = Fixture::new();

    fx.seed(at(2030, 6, 3, 9, 0), AppointmentStatus::Requested);
    let linked = fx.seed(at(2030, 6, 4, 9, 0), AppointmentStatus::Confirmed);
    fx.link_calendar_event(&linked, "evt-existing");
    fx.seed(at(2030, 6, 5, 9, 0), AppointmentStatus::NoShow);
    fx.seed(at(2030, 6, 6, 9, 0), AppointmentStatus::Cancelled);
    fx.seed(at(2020, 6, 6, 9, 0), AppointmentStatus::Confirmed);

    let report = fx.service().resync_calendar(fx.owner()).await.unwrap();

    assert_eq!(report, ResyncReport { synced: 2, skipped: 1, failed: 0 });
    assert_eq!(fx.calendar.counts(), (1, 1, 0));
}

#[tokio::test]
async fn resync_without_calendar_token_skips_everything() {
    let fx = Fixture::new();
    fx.users.add(UserProfile {
        id: fx.owner_id,
        email: Some("owner@example.com".to_string()),
        full_name: None,
        calendar_token: None,
    });
    fx.seed(at(2030, 6, 3, 9, 0), AppointmentStatus::Requested);
    fx.seed(at(2030, 6, 4, 9, 0), AppointmentStatus::Confirmed);

    let report = fx.service().resync_calendar(fx.owner()).await.unwrap();

    assert_eq!(report, ResyncReport { synced: 0, skipped: 2, failed: 0 });
    assert_eq!(fx.calendar.counts(), (0, 0, 0));
}

#[tokio::test]
async fn resync_counts_calendar_failures() {
    let fx = Fixture::new();
    fx.calendar.fail.store(true, Ordering::SeqCst);
    fx.seed(at(2030, 6, 3, 9, 0), AppointmentStatus::Requested);
    fx.seed(at(2030, 6, 4, 9, 0), AppointmentStatus::CheckedIn);

    let report = fx.service().resync_calendar(fx.owner()).await.unwrap();

    assert_eq!(report, ResyncReport { synced: 0, skipped: 0, failed: 2 });
}
