// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use notification_cell::{
    CalendarSync, EmailDispatcher, EmailTemplate, GoogleCalendarClient, HttpEmailClient,
    NotificationDispatcher, NotificationKind, SupabaseNotificationStore,
};
use shared_config::{AppConfig, SideEffectMode};
use shared_database::supabase::SupabaseClient;
use vet_cell::models::{TimeSlot, SLOT_MINUTES};
use vet_cell::services::availability::{AvailabilityResolver, AvailabilityStore, SupabaseAvailabilityStore};
use vet_cell::services::directory::{SupabaseVetDirectory, VetDirectory};

use crate::models::{
    Appointment, AppointmentDetails, AppointmentError, AppointmentFilter, AppointmentPatch,
    AppointmentStatus, CreateAppointmentRequest, NewAppointment, RescheduleAppointmentRequest,
    Requester, ResyncReport, DEFAULT_DURATION_MINUTES,
};
use crate::services::conflict::{interval_conflicts, ConflictDetectionService};
use crate::services::lifecycle::{AppointmentLifecycleService, LifecycleAction};
use crate::services::locks::VetBookingLocks;
use crate::services::outbox::{OutboxEntry, OutboxQueue};
use crate::services::side_effects::{CalendarOutcome, SideEffect, SideEffectDispatcher};
use crate::services::store::{
    AppointmentStore, PetDirectory, SupabaseAppointmentStore, SupabasePetDirectory,
    SupabaseUserDirectory, UserDirectory,
};

/// External collaborators the orchestrator is built from.
pub struct BookingCollaborators {
    pub store: Arc<dyn AppointmentStore>,
    pub pets: Arc<dyn PetDirectory>,
    pub users: Arc<dyn UserDirectory>,
    pub vets: Arc<dyn VetDirectory>,
    pub availability: Arc<dyn AvailabilityStore>,
    pub email: Arc<dyn EmailDispatcher>,
    pub notifications: Arc<dyn NotificationDispatcher>,
    pub calendar: Arc<dyn CalendarSync>,
}

/// Where side effects go once a mutation is committed.
pub enum EffectDelivery {
    /// Run in the request; failures are reported to the caller.
    Inline,
    /// Queue for the outbox worker; the caller only sees the mutation result.
    Outbox(Arc<dyn OutboxQueue>),
}

pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    pets: Arc<dyn PetDirectory>,
    users: Arc<dyn UserDirectory>,
    vets: Arc<dyn VetDirectory>,
    resolver: AvailabilityResolver,
    conflicts: ConflictDetectionService,
    lifecycle: AppointmentLifecycleService,
    dispatcher: Arc<SideEffectDispatcher>,
    delivery: EffectDelivery,
    locks: Option<VetBookingLocks>,
}

impl AppointmentBookingService {
    pub fn new(collaborators: BookingCollaborators, delivery: EffectDelivery, serialize_bookings: bool) -> Self {
        let BookingCollaborators {
            store,
            pets,
            users,
            vets,
            availability,
            email,
            notifications,
            calendar,
        } = collaborators;

        let dispatcher = Arc::new(SideEffectDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&pets),
            Arc::clone(&users),
            Arc::clone(&vets),
            email,
            notifications,
            calendar,
        ));

        Self {
            conflicts: ConflictDetectionService::new(Arc::clone(&store)),
            resolver: AvailabilityResolver::new(availability),
            lifecycle: AppointmentLifecycleService::new(),
            locks: serialize_bookings.then(VetBookingLocks::new),
            store,
            pets,
            users,
            vets,
            dispatcher,
            delivery,
        }
    }

    /// Wires the Supabase, email and calendar clients from configuration.
    pub fn from_config(config: &AppConfig, outbox: Option<Arc<dyn OutboxQueue>>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        let collaborators = BookingCollaborators {
            store: Arc::new(SupabaseAppointmentStore::new(Arc::clone(&supabase))),
            pets: Arc::new(SupabasePetDirectory::new(Arc::clone(&supabase))),
            users: Arc::new(SupabaseUserDirectory::new(Arc::clone(&supabase))),
            vets: Arc::new(SupabaseVetDirectory::new(Arc::clone(&supabase))),
            availability: Arc::new(SupabaseAvailabilityStore::new(Arc::clone(&supabase))),
            email: Arc::new(HttpEmailClient::new(config)),
            notifications: Arc::new(SupabaseNotificationStore::new(Arc::clone(&supabase))),
            calendar: Arc::new(GoogleCalendarClient::new(config)),
        };

        let delivery = match (config.side_effect_mode, outbox) {
            (SideEffectMode::Outbox, Some(queue)) => EffectDelivery::Outbox(queue),
            (SideEffectMode::Outbox, None) => {
                warn!("Outbox mode requested without a queue, running side effects inline");
                EffectDelivery::Inline
            }
            (SideEffectMode::Inline, _) => EffectDelivery::Inline,
        };

        Self::new(collaborators, delivery, config.serialize_bookings)
    }

    pub fn dispatcher(&self) -> Arc<SideEffectDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    // ==============================================================================
    // BOOKING
    // ==============================================================================

    #[instrument(skip(self, request), fields(pet = %request.pet_id, vet = %request.vet_id))]
    pub async fn create_appointment(
        &self,
        requester: Requester,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let duration_minutes = request.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
        if duration_minutes <= 0 {
            return Err(AppointmentError::ValidationError(
                "duration_minutes must be greater than zero".to_string(),
            ));
        }

        let pet = self
            .pets
            .get_pet(request.pet_id)
            .await?
            .ok_or(AppointmentError::PetNotFound)?;

        if !requester.is_admin && pet.owner_user_id != requester.user_id {
            return Err(AppointmentError::Unauthorized);
        }

        let appointment = {
            let _guard = self.lock_vet(request.vet_id).await;

            self.conflicts.check_vet(request.vet_id, request.appointment_date, None).await?;
            self.conflicts.check_owner(pet.owner_user_id, request.appointment_date, None).await?;

            self.store
                .create(&NewAppointment {
                    public_id: Uuid::new_v4(),
                    pet_id: pet.id,
                    vet_id: request.vet_id,
                    clinic_id: request.clinic_id,
                    appointment_date: request.appointment_date,
                    duration_minutes,
                    appointment_type: request.appointment_type,
                    notes: request.notes,
                    status: AppointmentStatus::Requested,
                    metadata: Default::default(),
                })
                .await?
        };

        info!("Appointment {} booked for {} with vet {}", appointment.public_id, pet.name, appointment.vet_id);

        // Booking stands once stored; follow-ups are best-effort.
        let effects = [
            SideEffect::CalendarPush,
            SideEffect::Email { template: EmailTemplate::AppointmentRequested },
        ];
        if let Err(e) = self.dispatch(&appointment, &effects).await {
            warn!("Post-booking side effects failed for {}: {}", appointment.public_id, e);
        }

        Ok(appointment)
    }

    #[instrument(skip(self, request))]
    pub async fn reschedule_appointment(
        &self,
        requester: Requester,
        public_id: Uuid,
        request: RescheduleAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.load(public_id).await?;
        self.lifecycle.validate(current.status, LifecycleAction::Reschedule)?;

        let pet = self
            .pets
            .get_pet_by_id(current.pet_id)
            .await?
            .ok_or(AppointmentError::MissingRelation("Pet"))?;

        let updated = {
            let _guard = self.lock_vet(current.vet_id).await;

            self.conflicts.check_vet(current.vet_id, request.new_start_time, Some(current.id)).await?;
            self.conflicts.check_owner(pet.owner_user_id, request.new_start_time, Some(current.id)).await?;

            if !requester.is_admin && pet.owner_user_id != requester.user_id {
                return Err(AppointmentError::Unauthorized);
            }

            let patch = AppointmentPatch {
                appointment_date: Some(request.new_start_time),
                notes: request.notes,
                ..AppointmentPatch::default()
            };

            self.store
                .update(public_id, &patch)
                .await?
                .ok_or(AppointmentError::NotFound)?
        };

        info!("Appointment {} moved from {} to {}", public_id, current.appointment_date, updated.appointment_date);

        let effects = [
            SideEffect::CalendarPush,
            SideEffect::NotifyOwner { notification: NotificationKind::AppointmentRescheduled },
        ];
        self.dispatch(&updated, &effects).await?;

        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn cancel_appointment(&self, requester: Requester, public_id: Uuid) -> Result<Uuid, AppointmentError> {
        let current = self.load(public_id).await?;

        if !self.is_participant(&requester, &current).await? {
            return Err(AppointmentError::Unauthorized);
        }

        if current.status != AppointmentStatus::Cancelled
            && !self.lifecycle.can_transition(&current.status, &AppointmentStatus::Cancelled)
        {
            warn!("Cancelling appointment {} from {} status", public_id, current.status);
        }

        let updated = self
            .store
            .update(public_id, &AppointmentPatch::status(AppointmentStatus::Cancelled))
            .await?
            .ok_or(AppointmentError::NotFound)?;

        info!("Appointment {} cancelled", public_id);

        let effects = [
            SideEffect::CalendarDelete,
            SideEffect::NotifyOwner { notification: NotificationKind::AppointmentCancelled },
            SideEffect::Email { template: EmailTemplate::AppointmentCancelled },
        ];
        self.dispatch(&updated, &effects).await?;

        Ok(public_id)
    }

    #[instrument(skip(self))]
    pub async fn confirm_appointment(&self, requester: Requester, public_id: Uuid) -> Result<Uuid, AppointmentError> {
        let current = self.load(public_id).await?;
        self.lifecycle.validate(current.status, LifecycleAction::Confirm)?;

        if !requester.is_admin && !self.is_appointment_vet(&requester, &current).await? {
            return Err(AppointmentError::Unauthorized);
        }

        let updated = self
            .store
            .update(public_id, &AppointmentPatch::status(AppointmentStatus::Confirmed))
            .await?
            .ok_or(AppointmentError::NotFound)?;

        info!("Appointment {} confirmed", public_id);

        // The status is already stored; missing records are still reported.
        let pet = self
            .pets
            .get_pet_by_id(updated.pet_id)
            .await?
            .ok_or(AppointmentError::MissingRelation("Pet"))?;
        self.vets
            .get_veterinarian(updated.vet_id)
            .await?
            .ok_or(AppointmentError::MissingRelation("Veterinarian"))?;
        self.users
            .get_profile(pet.owner_user_id)
            .await?
            .ok_or(AppointmentError::MissingRelation("Owner"))?;

        let effects = [
            SideEffect::Email { template: EmailTemplate::AppointmentConfirmed },
            SideEffect::CalendarPush,
            SideEffect::NotifyOwner { notification: NotificationKind::AppointmentConfirmed },
        ];
        self.dispatch(&updated, &effects).await?;

        Ok(public_id)
    }

    pub async fn check_in_appointment(&self, requester: Requester, public_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.advance(requester, public_id, LifecycleAction::CheckIn).await
    }

    pub async fn complete_appointment(&self, requester: Requester, public_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.advance(requester, public_id, LifecycleAction::Complete).await
    }

    /// Administrative overwrite. Skips the state machine entirely.
    #[instrument(skip(self))]
    pub async fn change_status(
        &self,
        requester: Requester,
        public_id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        if !requester.is_admin {
            return Err(AppointmentError::Unauthorized);
        }

        let current = self.load(public_id).await?;
        warn!(
            "Admin {} overwriting status of {} from {} to {}",
            requester.user_id, public_id, current.status, status
        );

        self.store
            .update(public_id, &AppointmentPatch::status(status))
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    // ==============================================================================
    // QUERIES
    // ==============================================================================

    pub async fn get_appointment(&self, requester: Requester, public_id: Uuid) -> Result<AppointmentDetails, AppointmentError> {
        let appointment = self.load(public_id).await?;

        if !self.is_participant(&requester, &appointment).await? {
            return Err(AppointmentError::Unauthorized);
        }

        Ok(AppointmentDetails {
            pet: self.pets.get_pet_by_id(appointment.pet_id).await?,
            veterinarian: self.vets.get_veterinarian(appointment.vet_id).await?,
            clinic: self.vets.get_clinic(appointment.clinic_id).await?,
            appointment,
        })
    }

    /// Candidate slots for the day, each marked against the vet's bookings by
    /// true interval overlap.
    pub async fn available_slots(
        &self,
        vet_id: Uuid,
        clinic_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, AppointmentError> {
        if self.vets.get_veterinarian(vet_id).await?.is_none() {
            return Err(AppointmentError::VetNotFound);
        }
        if self.vets.get_clinic(clinic_id).await?.is_none() {
            return Err(AppointmentError::ClinicNotFound);
        }

        let starts = self.resolver.resolve_slots(vet_id, clinic_id, date).await?;

        let day_start = date.and_time(NaiveTime::MIN).and_utc();
        let existing = self
            .store
            .find_many(&AppointmentFilter {
                vet_id: Some(vet_id),
                // Long appointments from the previous day can still overlap
                from: Some(day_start - Duration::days(1)),
                to: Some(day_start + Duration::days(1)),
                exclude_cancelled: true,
                ..AppointmentFilter::default()
            })
            .await?;

        let slots: Vec<TimeSlot> = starts
            .map(|start| match interval_conflicts(start, SLOT_MINUTES, &existing, None).first() {
                Some(booked) => TimeSlot::booked(start, booked.public_id),
                None => TimeSlot::open(start),
            })
            .collect();

        debug!("{} slots for vet {} on {}", slots.len(), vet_id, date);
        Ok(slots)
    }

    /// Pushes the requester's upcoming appointments to their calendar, one at
    /// a time to stay inside the provider's rate limits.
    #[instrument(skip(self))]
    pub async fn resync_calendar(&self, requester: Requester) -> Result<ResyncReport, AppointmentError> {
        let profile = self
            .users
            .get_profile(requester.user_id)
            .await?
            .ok_or(AppointmentError::MissingRelation("Owner"))?;

        let upcoming = self
            .store
            .find_many(&AppointmentFilter {
                owner_user_id: Some(requester.user_id),
                from: Some(Utc::now()),
                exclude_cancelled: true,
                ..AppointmentFilter::default()
            })
            .await?;

        let mut report = ResyncReport::default();

        if profile.calendar_token.is_none() {
            report.skipped = upcoming.len();
            return Ok(report);
        }

        for appointment in &upcoming {
            if !appointment.status.is_on_calendar() {
                report.skipped += 1;
                continue;
            }

            let pet = match self.pets.get_pet_by_id(appointment.pet_id).await {
                Ok(Some(pet)) => pet,
                Ok(None) => {
                    report.failed += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Pet lookup failed for {}: {}", appointment.public_id, e);
                    report.failed += 1;
                    continue;
                }
            };

            match self.dispatcher.push_calendar(appointment, &pet, &profile).await {
                Ok(CalendarOutcome::Synced) => report.synced += 1,
                Ok(CalendarOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!("Calendar sync failed for {}: {}", appointment.public_id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Calendar resync for {}: {} synced, {} skipped, {} failed",
            requester.user_id, report.synced, report.skipped, report.failed
        );
        Ok(report)
    }

    // ==============================================================================
    // HELPERS
    // ==============================================================================

    async fn load(&self, public_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.store
            .find_unique(public_id)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    async fn lock_vet(&self, vet_id: Uuid) -> Option<OwnedMutexGuard<()>> {
        match &self.locks {
            Some(locks) => Some(locks.acquire(vet_id).await),
            None => None,
        }
    }

    async fn advance(
        &self,
        requester: Requester,
        public_id: Uuid,
        action: LifecycleAction,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.load(public_id).await?;

        let Some(target) = self.lifecycle.validate(current.status, action)? else {
            return Ok(current);
        };

        if !requester.is_admin && !self.is_appointment_vet(&requester, &current).await? {
            return Err(AppointmentError::Unauthorized);
        }

        let updated = self
            .store
            .update(public_id, &AppointmentPatch::status(target))
            .await?
            .ok_or(AppointmentError::NotFound)?;

        info!("Appointment {} moved from {} to {}", public_id, current.status, target);
        Ok(updated)
    }

    async fn is_appointment_vet(&self, requester: &Requester, appointment: &Appointment) -> Result<bool, AppointmentError> {
        let vet = self.vets.find_by_user(requester.user_id).await?;
        Ok(vet.map(|v| v.id == appointment.vet_id).unwrap_or(false))
    }

    async fn is_participant(&self, requester: &Requester, appointment: &Appointment) -> Result<bool, AppointmentError> {
        if requester.is_admin {
            return Ok(true);
        }

        let owns_pet = self
            .pets
            .get_pet_by_id(appointment.pet_id)
            .await?
            .map(|pet| pet.owner_user_id == requester.user_id)
            .unwrap_or(false);

        if owns_pet {
            return Ok(true);
        }

        self.is_appointment_vet(requester, appointment).await
    }

    async fn dispatch(&self, appointment: &Appointment, effects: &[SideEffect]) -> Result<(), AppointmentError> {
        match &self.delivery {
            EffectDelivery::Inline => {
                let mut failures = Vec::new();

                for effect in effects {
                    if let Err(e) = self.dispatcher.execute(appointment, *effect).await {
                        warn!("Side effect {} failed for {}: {}", effect, appointment.public_id, e);
                        failures.push(format!("{}: {}", effect, e));
                    }
                }

                if failures.is_empty() {
                    Ok(())
                } else {
                    Err(AppointmentError::SideEffectFailed(failures.join("; ")))
                }
            }
            EffectDelivery::Outbox(queue) => {
                for effect in effects {
                    let entry = OutboxEntry::new(appointment.public_id, *effect);
                    queue
                        .push(&entry)
                        .await
                        .map_err(|e| AppointmentError::SideEffectFailed(format!("could not queue {}: {}", effect, e)))?;
                }
                debug!("Queued {} side effects for {}", effects.len(), appointment.public_id);
                Ok(())
            }
        }
    }
}
