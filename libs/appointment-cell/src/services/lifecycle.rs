// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use crate::models::{ActorRole, AppointmentError, AppointmentStatus};

/// Status transition table keyed by current status, requested status and
/// the role of whoever asks. Cancellation and professional-driven updates
/// both go through it.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
        actor: ActorRole,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition {} -> {} for {:?}", current_status, new_status, actor);

        if !self.get_valid_transitions(current_status, actor).contains(&new_status) {
            warn!("Invalid status transition attempted by {:?}: {} -> {}", actor, current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    /// All statuses `actor` may move an appointment to from `current_status`.
    pub fn get_valid_transitions(
        &self,
        current_status: AppointmentStatus,
        actor: ActorRole,
    ) -> Vec<AppointmentStatus> {
        use AppointmentStatus::*;

        match actor {
            ActorRole::Patient => match current_status {
                Scheduled | Confirmed => vec![Cancelled],
                InProgress | Completed | Cancelled => vec![],
            },
            ActorRole::Professional => match current_status {
                Scheduled => vec![Confirmed, InProgress, Completed, Cancelled],
                Confirmed => vec![InProgress, Completed, Cancelled],
                InProgress => vec![Completed, Cancelled],
                // Terminal states
                Completed | Cancelled => vec![],
            },
        }
    }

    pub fn can_cancel(&self, current_status: AppointmentStatus, actor: ActorRole) -> bool {
        self.get_valid_transitions(current_status, actor)
            .contains(&AppointmentStatus::Cancelled)
    }
}
