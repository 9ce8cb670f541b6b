// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

/// Operations gated by the appointment state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Confirm,
    CheckIn,
    Complete,
    Cancel,
    Reschedule,
}

impl LifecycleAction {
    pub fn verb(&self) -> &'static str {
        match self {
            LifecycleAction::Confirm => "confirm",
            LifecycleAction::CheckIn => "check in",
            LifecycleAction::Complete => "complete",
            LifecycleAction::Cancel => "cancel",
            LifecycleAction::Reschedule => "reschedule",
        }
    }

    /// Status the action moves to. Reschedule keeps the current status.
    pub fn target(&self) -> Option<AppointmentStatus> {
        match self {
            LifecycleAction::Confirm => Some(AppointmentStatus::Confirmed),
            LifecycleAction::CheckIn => Some(AppointmentStatus::CheckedIn),
            LifecycleAction::Complete => Some(AppointmentStatus::Completed),
            LifecycleAction::Cancel => Some(AppointmentStatus::Cancelled),
            LifecycleAction::Reschedule => None,
        }
    }
}

/// The guarded state machine. `no_show` is only reachable through the admin
/// status overwrite, which does not go through here.
pub struct AppointmentLifecycleService;

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub fn get_valid_transitions(&self, current_status: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Requested => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::CheckedIn,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::CheckedIn => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => vec![],
        }
    }

    pub fn can_transition(&self, from: &AppointmentStatus, to: &AppointmentStatus) -> bool {
        self.get_valid_transitions(from).contains(to)
    }

    /// Checks that `action` is allowed from `current_status` and returns the
    /// status to persist, or `None` when the status stays as it is.
    pub fn validate(
        &self,
        current_status: AppointmentStatus,
        action: LifecycleAction,
    ) -> Result<Option<AppointmentStatus>, AppointmentError> {
        debug!("Validating {} from {}", action.verb(), current_status);

        let allowed = match action.target() {
            Some(target) => self.can_transition(&current_status, &target),
            None => !current_status.is_terminal(),
        };

        if !allowed {
            warn!("Rejected {} on {} appointment", action.verb(), current_status);
            return Err(AppointmentError::InvalidState {
                action: action.verb(),
                status: current_status,
            });
        }

        Ok(action.target())
    }
}
