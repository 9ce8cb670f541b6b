mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::Utc;
use mockall::mock;
use uuid::Uuid;

use appointment_cell::models::*;
use appointment_cell::services::booking::{AppointmentBookingService, BookingCollaborators, EffectDelivery};
use appointment_cell::services::store::AppointmentStore;

use common::{at, Fixture};

mock! {
    pub Store {}

    #[async_trait]
    impl AppointmentStore for Store {
        async fn create(&self, appointment: &NewAppointment) -> Result<Appointment, AppointmentError>;
        async fn update(&self, public_id: Uuid, patch: &AppointmentPatch) -> Result<Option<Appointment>, AppointmentError>;
        async fn find_unique(&self, public_id: Uuid) -> Result<Option<Appointment>, AppointmentError>;
        async fn find_many(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, AppointmentError>;
    }
}

fn stored(fx: &Fixture, status: AppointmentStatus) -> Appointment {
    Appointment {
        id: 7,
        public_id: Uuid::new_v4(),
        pet_id: fx.pet.id,
        vet_id: fx.vet.id,
        clinic_id: fx.clinic_id,
        appointment_date: at(2025, 5, 1, 10, 0),
        duration_minutes: Some(30),
        appointment_type: AppointmentType::FollowUp,
        notes: None,
        status,
        metadata: AppointmentMetadata::default(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn service_with_store(fx: &Fixture, store: MockStore) -> AppointmentBookingService {
    let collaborators = BookingCollaborators {
        store: Arc::new(store),
        ..fx.collaborators()
    };
    AppointmentBookingService::new(collaborators, EffectDelivery::Inline, false)
}

#[tokio::test]
async fn rejected_reschedule_never_touches_the_store() {
    let fx = Fixture::new();
    let appointment = stored(&fx, AppointmentStatus::Completed);
    let public_id = appointment.public_id;

    let mut store = MockStore::new();
    store
        .expect_find_unique()
        .withf(move |id| *id == public_id)
        .times(1)
        .returning(move |_| Ok(Some(appointment.clone())));
    store.expect_find_many().never();
    store.expect_update().never();
    store.expect_create().never();

    let result = service_with_store(&fx, store)
        .reschedule_appointment(
            fx.owner(),
            public_id,
            RescheduleAppointmentRequest {
                new_start_time: at(2025, 6, 1, 14, 0),
                notes: None,
            },
        )
        .await;

    assert_matches!(result, Err(AppointmentError::InvalidState { action: "reschedule", status: AppointmentStatus::Completed }));
}

#[tokio::test]
async fn row_deleted_between_read_and_write_is_not_found() {
    let fx = Fixture::new();
    let appointment = stored(&fx, AppointmentStatus::Confirmed);
    let public_id = appointment.public_id;

    let mut store = MockStore::new();
    store
        .expect_find_unique()
        .returning(move |_| Ok(Some(appointment.clone())));
    store
        .expect_update()
        .withf(|_, patch| patch.status == Some(AppointmentStatus::CheckedIn))
        .times(1)
        .returning(|_, _| Ok(None));

    let result = service_with_store(&fx, store).check_in_appointment(fx.vet_user(), public_id).await;

    assert_matches!(result, Err(AppointmentError::NotFound));
}

#[tokio::test]
async fn store_failure_surfaces_as_database_error() {
    let fx = Fixture::new();

    let mut store = MockStore::new();
    store
        .expect_find_many()
        .returning(|_| Err(AppointmentError::DatabaseError("connection reset".to_string())));
    store.expect_create().never();

    let result = service_with_store(&fx, store)
        .create_appointment(fx.owner(), fx.create_request(at(2025, 5, 1, 9, 0)))
        .await;

    assert_matches!(result, Err(AppointmentError::DatabaseError(msg)) if msg == "connection reset");
}
