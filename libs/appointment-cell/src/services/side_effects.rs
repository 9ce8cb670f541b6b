use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use notification_cell::{
    CalendarEvent, CalendarSync, EmailDispatcher, EmailMessage, EmailTemplate, Notification,
    NotificationDispatcher, NotificationKind,
};
use vet_cell::services::directory::VetDirectory;

use crate::models::{Appointment, AppointmentError, AppointmentPatch, Pet, UserProfile};
use crate::services::store::{AppointmentStore, PetDirectory, UserDirectory};

/// Follow-up work triggered by a committed appointment mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SideEffect {
    /// Create the owner's calendar event, or update it when one is linked.
    CalendarPush,
    CalendarDelete,
    NotifyOwner { notification: NotificationKind },
    Email { template: EmailTemplate },
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideEffect::CalendarPush => write!(f, "calendar_push"),
            SideEffect::CalendarDelete => write!(f, "calendar_delete"),
            SideEffect::NotifyOwner { notification } => write!(f, "notify_owner:{:?}", notification),
            SideEffect::Email { template } => write!(f, "email:{:?}", template),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarOutcome {
    Synced,
    /// The owner has not connected a calendar.
    Skipped,
}

/// Executes side effects against the external collaborators. Shared by the
/// inline path and the outbox worker.
pub struct SideEffectDispatcher {
    store: Arc<dyn AppointmentStore>,
    pets: Arc<dyn PetDirectory>,
    users: Arc<dyn UserDirectory>,
    vets: Arc<dyn VetDirectory>,
    email: Arc<dyn EmailDispatcher>,
    notifications: Arc<dyn NotificationDispatcher>,
    calendar: Arc<dyn CalendarSync>,
}

impl SideEffectDispatcher {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        pets: Arc<dyn PetDirectory>,
        users: Arc<dyn UserDirectory>,
        vets: Arc<dyn VetDirectory>,
        email: Arc<dyn EmailDispatcher>,
        notifications: Arc<dyn NotificationDispatcher>,
        calendar: Arc<dyn CalendarSync>,
    ) -> Self {
        Self { store, pets, users, vets, email, notifications, calendar }
    }

    /// Loads the current appointment state and runs `effect` against it.
    pub async fn execute_by_id(&self, public_id: Uuid, effect: SideEffect) -> Result<(), AppointmentError> {
        let appointment = self
            .store
            .find_unique(public_id)
            .await?
            .ok_or(AppointmentError::NotFound)?;

        self.execute(&appointment, effect).await
    }

    #[instrument(skip(self, appointment), fields(appointment = %appointment.public_id))]
    pub async fn execute(&self, appointment: &Appointment, effect: SideEffect) -> Result<(), AppointmentError> {
        debug!("Running side effect {}", effect);

        match effect {
            SideEffect::CalendarPush => {
                let (pet, owner) = self.owner_context(appointment).await?;
                self.push_calendar(appointment, &pet, &owner).await.map(|_| ())
            }
            SideEffect::CalendarDelete => self.delete_calendar(appointment).await,
            SideEffect::NotifyOwner { notification } => self.notify_owner(appointment, notification).await,
            SideEffect::Email { template } => self.send_email(appointment, template).await,
        }
    }

    async fn owner_context(&self, appointment: &Appointment) -> Result<(Pet, UserProfile), AppointmentError> {
        let pet = self
            .pets
            .get_pet_by_id(appointment.pet_id)
            .await?
            .ok_or(AppointmentError::MissingRelation("Pet"))?;

        let owner = self
            .users
            .get_profile(pet.owner_user_id)
            .await?
            .ok_or(AppointmentError::MissingRelation("Owner"))?;

        Ok((pet, owner))
    }

    async fn calendar_event(&self, appointment: &Appointment, pet: &Pet) -> Result<CalendarEvent, AppointmentError> {
        let vet = self.vets.get_veterinarian(appointment.vet_id).await?;
        let clinic = self.vets.get_clinic(appointment.clinic_id).await?;

        let vet_name = vet.map(|v| v.full_name).unwrap_or_else(|| "your veterinarian".to_string());

        Ok(CalendarEvent {
            summary: format!("Vet appointment: {}", pet.name),
            description: format!("{} with {}", appointment.appointment_type, vet_name),
            location: clinic.map(|c| match c.address {
                Some(address) => format!("{}, {}", c.name, address),
                None => c.name,
            }),
            start: appointment.appointment_date,
            end: appointment.end_time(),
        })
    }

    /// Upserts the owner's calendar event and records its id on the
    /// appointment. A no-op when the owner has no calendar token. An
    /// appointment that is no longer on the calendar has any linked event
    /// removed instead, so a late retry cannot resurrect it.
    pub async fn push_calendar(
        &self,
        appointment: &Appointment,
        pet: &Pet,
        owner: &UserProfile,
    ) -> Result<CalendarOutcome, AppointmentError> {
        if !appointment.status.is_on_calendar() {
            debug!("Not pushing {} appointment {}", appointment.status, appointment.public_id);
            self.remove_event(appointment, owner).await?;
            return Ok(CalendarOutcome::Skipped);
        }

        let Some(token) = owner.calendar_token.as_deref() else {
            debug!("Calendar sync disabled for user {}", owner.id);
            return Ok(CalendarOutcome::Skipped);
        };

        let event = self.calendar_event(appointment, pet).await?;

        match appointment.metadata.calendar_event_id.as_deref() {
            Some(event_id) => {
                self.calendar.update_event(token, event_id, &event).await?;
            }
            None => {
                let event_id = self.calendar.add_event(token, &event).await?;

                let mut metadata = appointment.metadata.clone();
                metadata.calendar_event_id = Some(event_id);
                self.store
                    .update(appointment.public_id, &AppointmentPatch::metadata(metadata))
                    .await?;
            }
        }

        Ok(CalendarOutcome::Synced)
    }

    async fn delete_calendar(&self, appointment: &Appointment) -> Result<(), AppointmentError> {
        if appointment.metadata.calendar_event_id.is_none() {
            debug!("No calendar event linked to {}", appointment.public_id);
            return Ok(());
        }

        let (_, owner) = self.owner_context(appointment).await?;
        self.remove_event(appointment, &owner).await
    }

    async fn remove_event(&self, appointment: &Appointment, owner: &UserProfile) -> Result<(), AppointmentError> {
        let Some(event_id) = appointment.metadata.calendar_event_id.as_deref() else {
            return Ok(());
        };

        if let Some(token) = owner.calendar_token.as_deref() {
            self.calendar.delete_event(token, event_id).await?;
        }

        let mut metadata = appointment.metadata.clone();
        metadata.calendar_event_id = None;
        self.store
            .update(appointment.public_id, &AppointmentPatch::metadata(metadata))
            .await?;

        Ok(())
    }

    async fn notify_owner(&self, appointment: &Appointment, kind: NotificationKind) -> Result<(), AppointmentError> {
        let pet = self
            .pets
            .get_pet_by_id(appointment.pet_id)
            .await?
            .ok_or(AppointmentError::MissingRelation("Pet"))?;

        let when = format_when(appointment);
        let (title, content) = match kind {
            NotificationKind::AppointmentRescheduled => (
                "Appointment rescheduled".to_string(),
                format!("{}'s appointment has been moved to {}", pet.name, when),
            ),
            NotificationKind::AppointmentCancelled => (
                "Appointment cancelled".to_string(),
                format!("{}'s appointment on {} has been cancelled", pet.name, when),
            ),
            NotificationKind::AppointmentConfirmed => (
                "Appointment confirmed".to_string(),
                format!("{}'s appointment on {} is confirmed", pet.name, when),
            ),
        };

        self.notifications
            .create_notification(&Notification {
                user_id: pet.owner_user_id,
                title,
                content,
                kind,
                link: Some(format!("/appointments/{}", appointment.public_id)),
            })
            .await?;

        Ok(())
    }

    async fn send_email(&self, appointment: &Appointment, template: EmailTemplate) -> Result<(), AppointmentError> {
        let (pet, owner) = self.owner_context(appointment).await?;
        let to = owner.email.clone().ok_or(AppointmentError::MissingRelation("Owner email"))?;

        let vet = self.vets.get_veterinarian(appointment.vet_id).await?;
        let clinic = self.vets.get_clinic(appointment.clinic_id).await?;

        let subject = match template {
            EmailTemplate::AppointmentRequested => format!("Appointment request received for {}", pet.name),
            EmailTemplate::AppointmentConfirmed => format!("{}'s appointment is confirmed", pet.name),
            EmailTemplate::AppointmentCancelled => format!("{}'s appointment was cancelled", pet.name),
        };

        let message = EmailMessage {
            template,
            to,
            subject,
            data: json!({
                "owner_name": owner.full_name,
                "pet_name": pet.name,
                "vet_name": vet.map(|v| v.full_name),
                "clinic_name": clinic.as_ref().map(|c| c.name.clone()),
                "clinic_address": clinic.and_then(|c| c.address),
                "appointment_type": appointment.appointment_type.to_string(),
                "date": appointment.appointment_date.format("%A, %B %-d, %Y").to_string(),
                "time": appointment.appointment_date.format("%H:%M").to_string(),
                "appointment_id": appointment.public_id,
            }),
        };

        self.email.send_email(&message).await?;
        info!("{:?} email sent for appointment {}", template, appointment.public_id);
        Ok(())
    }
}

fn format_when(appointment: &Appointment) -> String {
    appointment.appointment_date.format("%B %-d, %Y at %H:%M UTC").to_string()
}
