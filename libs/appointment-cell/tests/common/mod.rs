#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use appointment_cell::models::*;
use appointment_cell::services::booking::{AppointmentBookingService, BookingCollaborators, EffectDelivery};
use appointment_cell::services::store::{AppointmentStore, PetDirectory, UserDirectory};
use notification_cell::{
    CalendarEvent, CalendarSync, EmailDispatcher, EmailMessage, Notification, NotificationDispatcher,
    NotificationError,
};
use vet_cell::models::{AvailabilityWindow, Clinic, Veterinarian, VetError};
use vet_cell::services::availability::AvailabilityStore;
use vet_cell::services::directory::VetDirectory;

pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap()
}

// ==============================================================================
// FAKE COLLABORATORS
// ==============================================================================

#[derive(Default)]
pub struct FakePets {
    pets: Mutex<Vec<Pet>>,
}

impl FakePets {
    pub fn add(&self, pet: Pet) {
        self.pets.lock().unwrap().push(pet);
    }

    pub fn owner_of(&self, pet_id: Uuid) -> Option<Uuid> {
        self.pets.lock().unwrap().iter().find(|p| p.id == pet_id).map(|p| p.owner_user_id)
    }
}

#[async_trait]
impl PetDirectory for FakePets {
    async fn get_pet(&self, public_id: Uuid) -> Result<Option<Pet>, AppointmentError> {
        Ok(self.pets.lock().unwrap().iter().find(|p| p.public_id == public_id).cloned())
    }

    async fn get_pet_by_id(&self, pet_id: Uuid) -> Result<Option<Pet>, AppointmentError> {
        Ok(self.pets.lock().unwrap().iter().find(|p| p.id == pet_id).cloned())
    }
}

pub struct FakeAppointmentStore {
    rows: Mutex<Vec<Appointment>>,
    pets: Arc<FakePets>,
    next_id: AtomicI64,
    pub writes: AtomicUsize,
}

impl FakeAppointmentStore {
    pub fn new(pets: Arc<FakePets>) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            pets,
            next_id: AtomicI64::new(1),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, mut appointment: Appointment) -> Appointment {
        appointment.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.rows.lock().unwrap().push(appointment.clone());
        appointment
    }

    pub fn get(&self, public_id: Uuid) -> Option<Appointment> {
        self.rows.lock().unwrap().iter().find(|a| a.public_id == public_id).cloned()
    }

    pub fn replace(&self, appointment: Appointment) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|a| a.public_id == appointment.public_id) {
            *row = appointment;
        }
    }

    pub fn all(&self) -> Vec<Appointment> {
        self.rows.lock().unwrap().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AppointmentStore for FakeAppointmentStore {
    async fn create(&self, new: &NewAppointment) -> Result<Appointment, AppointmentError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        Ok(self.insert(Appointment {
            id: 0,
            public_id: new.public_id,
            pet_id: new.pet_id,
            vet_id: new.vet_id,
            clinic_id: new.clinic_id,
            appointment_date: new.appointment_date,
            duration_minutes: Some(new.duration_minutes),
            appointment_type: new.appointment_type,
            notes: new.notes.clone(),
            status: new.status,
            metadata: new.metadata.clone(),
            created_at: now,
            updated_at: now,
        }))
    }

    async fn update(&self, public_id: Uuid, patch: &AppointmentPatch) -> Result<Option<Appointment>, AppointmentError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|a| a.public_id == public_id) else {
            return Ok(None);
        };

        if let Some(date) = patch.appointment_date {
            row.appointment_date = date;
        }
        if let Some(notes) = &patch.notes {
            row.notes = Some(notes.clone());
        }
        if let Some(status) = patch.status {
            row.status = status;
        }
        if let Some(metadata) = &patch.metadata {
            row.metadata = metadata.clone();
        }
        row.updated_at = Utc::now();

        Ok(Some(row.clone()))
    }

    async fn find_unique(&self, public_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.get(public_id))
    }

    async fn find_many(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, AppointmentError> {
        let mut matched: Vec<Appointment> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|a| filter.vet_id.map_or(true, |v| a.vet_id == v))
            .filter(|a| filter.owner_user_id.map_or(true, |o| self.pets.owner_of(a.pet_id) == Some(o)))
            .filter(|a| filter.from.map_or(true, |from| a.appointment_date >= from))
            .filter(|a| filter.to.map_or(true, |to| a.appointment_date < to))
            .filter(|a| !filter.exclude_cancelled || a.status != AppointmentStatus::Cancelled)
            .cloned()
            .collect();

        matched.sort_by_key(|a| a.appointment_date);
        Ok(matched)
    }
}

#[derive(Default)]
pub struct FakeUsers {
    profiles: Mutex<HashMap<Uuid, UserProfile>>,
}

impl FakeUsers {
    pub fn add(&self, profile: UserProfile) {
        self.profiles.lock().unwrap().insert(profile.id, profile);
    }

    pub fn remove(&self, user_id: Uuid) {
        self.profiles.lock().unwrap().remove(&user_id);
    }
}

#[async_trait]
impl UserDirectory for FakeUsers {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, AppointmentError> {
        Ok(self.profiles.lock().unwrap().get(&user_id).cloned())
    }
}

#[derive(Default)]
pub struct FakeVets {
    vets: Mutex<Vec<Veterinarian>>,
    clinics: Mutex<Vec<Clinic>>,
}

impl FakeVets {
    pub fn add_vet(&self, vet: Veterinarian) {
        self.vets.lock().unwrap().push(vet);
    }

    pub fn remove_vet(&self, vet_id: Uuid) {
        self.vets.lock().unwrap().retain(|v| v.id != vet_id);
    }

    pub fn add_clinic(&self, clinic: Clinic) {
        self.clinics.lock().unwrap().push(clinic);
    }
}

#[async_trait]
impl VetDirectory for FakeVets {
    async fn get_veterinarian(&self, vet_id: Uuid) -> Result<Option<Veterinarian>, VetError> {
        Ok(self.vets.lock().unwrap().iter().find(|v| v.id == vet_id).cloned())
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Veterinarian>, VetError> {
        Ok(self.vets.lock().unwrap().iter().find(|v| v.user_id == user_id).cloned())
    }

    async fn get_clinic(&self, clinic_id: Uuid) -> Result<Option<Clinic>, VetError> {
        Ok(self.clinics.lock().unwrap().iter().find(|c| c.id == clinic_id).cloned())
    }
}

#[derive(Default)]
pub struct FakeAvailability {
    windows: Mutex<Vec<AvailabilityWindow>>,
}

impl FakeAvailability {
    pub fn add(&self, window: AvailabilityWindow) {
        self.windows.lock().unwrap().push(window);
    }
}

#[async_trait]
impl AvailabilityStore for FakeAvailability {
    async fn list_availability(&self, vet_id: Uuid) -> Result<Vec<AvailabilityWindow>, VetError> {
        Ok(self.windows.lock().unwrap().iter().filter(|w| w.vet_id == vet_id).cloned().collect())
    }
}

#[derive(Default)]
pub struct FakeEmail {
    pub sent: Mutex<Vec<EmailMessage>>,
    pub fail: AtomicBool,
}

impl FakeEmail {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl EmailDispatcher for FakeEmail {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotificationError::EmailFailed { message: "provider unavailable".to_string() });
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeNotifications {
    pub created: Mutex<Vec<Notification>>,
    pub fail: AtomicBool,
}

impl FakeNotifications {
    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationDispatcher for FakeNotifications {
    async fn create_notification(&self, notification: &Notification) -> Result<(), NotificationError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotificationError::NotificationFailed { message: "insert rejected".to_string() });
        }
        self.created.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeCalendar {
    pub added: AtomicUsize,
    pub updated: AtomicUsize,
    pub deleted: AtomicUsize,
    pub fail: AtomicBool,
}

impl FakeCalendar {
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.added.load(Ordering::SeqCst),
            self.updated.load(Ordering::SeqCst),
            self.deleted.load(Ordering::SeqCst),
        )
    }

    fn check(&self) -> Result<(), NotificationError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotificationError::CalendarFailed { message: "503 Service Unavailable".to_string() });
        }
        Ok(())
    }
}

#[async_trait]
impl CalendarSync for FakeCalendar {
    async fn add_event(&self, _token: &str, _event: &CalendarEvent) -> Result<String, NotificationError> {
        self.check()?;
        let n = self.added.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("evt-{}", n))
    }

    async fn update_event(&self, _token: &str, _event_id: &str, _event: &CalendarEvent) -> Result<(), NotificationError> {
        self.check()?;
        self.updated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_event(&self, _token: &str, _event_id: &str) -> Result<(), NotificationError> {
        self.check()?;
        self.deleted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ==============================================================================
// FIXTURE
// ==============================================================================

/// One owner with one pet, one vet at one clinic, and all collaborators
/// in memory.
pub struct Fixture {
    pub pets: Arc<FakePets>,
    pub store: Arc<FakeAppointmentStore>,
    pub users: Arc<FakeUsers>,
    pub vets: Arc<FakeVets>,
    pub availability: Arc<FakeAvailability>,
    pub email: Arc<FakeEmail>,
    pub notifications: Arc<FakeNotifications>,
    pub calendar: Arc<FakeCalendar>,
    pub owner_id: Uuid,
    pub pet: Pet,
    pub vet: Veterinarian,
    pub clinic_id: Uuid,
}

impl Fixture {
    pub fn new() -> Self {
        let pets = Arc::new(FakePets::default());
        let store = Arc::new(FakeAppointmentStore::new(Arc::clone(&pets)));
        let users = Arc::new(FakeUsers::default());
        let vets = Arc::new(FakeVets::default());

        let owner_id = Uuid::new_v4();
        let clinic_id = Uuid::new_v4();

        users.add(UserProfile {
            id: owner_id,
            email: Some("owner@example.com".to_string()),
            full_name: Some("Sam Owner".to_string()),
            calendar_token: Some("calendar-token".to_string()),
        });

        let pet = Pet {
            id: Uuid::new_v4(),
            public_id: Uuid::new_v4(),
            owner_user_id: owner_id,
            name: "Biscuit".to_string(),
            species: Some("dog".to_string()),
            breed: None,
        };
        pets.add(pet.clone());

        let vet = Veterinarian {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            clinic_id,
            full_name: "Dr. Rivera".to_string(),
            email: Some("rivera@clinic.test".to_string()),
            specialization: None,
            license_number: None,
        };
        vets.add_vet(vet.clone());
        vets.add_clinic(Clinic {
            id: clinic_id,
            name: "Downtown Animal Clinic".to_string(),
            address: Some("1 Main St".to_string()),
            phone: None,
        });

        Self {
            pets,
            store,
            users,
            vets,
            availability: Arc::new(FakeAvailability::default()),
            email: Arc::new(FakeEmail::default()),
            notifications: Arc::new(FakeNotifications::default()),
            calendar: Arc::new(FakeCalendar::default()),
            owner_id,
            pet,
            vet,
            clinic_id,
        }
    }

    pub fn collaborators(&self) -> BookingCollaborators {
        BookingCollaborators {
            store: self.store.clone(),
            pets: self.pets.clone(),
            users: self.users.clone(),
            vets: self.vets.clone(),
            availability: self.availability.clone(),
            email: self.email.clone(),
            notifications: self.notifications.clone(),
            calendar: self.calendar.clone(),
        }
    }

    pub fn service(&self) -> AppointmentBookingService {
        AppointmentBookingService::new(self.collaborators(), EffectDelivery::Inline, true)
    }

    pub fn service_with(&self, delivery: EffectDelivery) -> AppointmentBookingService {
        AppointmentBookingService::new(self.collaborators(), delivery, true)
    }

    pub fn owner(&self) -> Requester {
        Requester::user(self.owner_id)
    }

    pub fn vet_user(&self) -> Requester {
        Requester::user(self.vet.user_id)
    }

    pub fn admin() -> Requester {
        Requester::admin(Uuid::new_v4())
    }

    pub fn stranger() -> Requester {
        Requester::user(Uuid::new_v4())
    }

    pub fn create_request(&self, start: DateTime<Utc>) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            pet_id: self.pet.public_id,
            vet_id: self.vet.id,
            clinic_id: self.clinic_id,
            appointment_date: start,
            appointment_type: AppointmentType::WellnessExam,
            notes: None,
            duration_minutes: None,
        }
    }

    /// Inserts an appointment for the fixture's pet and vet directly into
    /// the store.
    pub fn seed(&self, start: DateTime<Utc>, status: AppointmentStatus) -> Appointment {
        self.seed_for(self.pet.id, self.vet.id, start, status, Some(30))
    }

    pub fn seed_for(
        &self,
        pet_id: Uuid,
        vet_id: Uuid,
        start: DateTime<Utc>,
        status: AppointmentStatus,
        duration_minutes: Option<i32>,
    ) -> Appointment {
        let now = Utc::now();
        self.store.insert(Appointment {
            id: 0,
            public_id: Uuid::new_v4(),
            pet_id,
            vet_id,
            clinic_id: self.clinic_id,
            appointment_date: start,
            duration_minutes,
            appointment_type: AppointmentType::Vaccination,
            notes: None,
            status,
            metadata: AppointmentMetadata::default(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Links a calendar event to an existing appointment.
    pub fn link_calendar_event(&self, appointment: &Appointment, event_id: &str) -> Appointment {
        let mut linked = appointment.clone();
        linked.metadata.calendar_event_id = Some(event_id.to_string());
        self.store.replace(linked.clone());
        linked
    }

    pub fn weekly_window(&self, day_of_week: i32, start: (u32, u32), end: (u32, u32)) {
        self.availability.add(AvailabilityWindow {
            id: Uuid::new_v4(),
            vet_id: self.vet.id,
            clinic_id: self.clinic_id,
            day_of_week,
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            is_available: true,
        });
    }
}
