// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use shared_models::UserRole;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, Requestor};

/// What a requestor is trying to do with an existing appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentAction {
    View,
    UpdateStatus,
    Cancel,
}

/// Appointment state machine. Authorization and transition legality are
/// checked separately so each can be exercised on its own.
#[derive(Debug, Default, Clone)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Capability check keyed on requestor role, identity and ownership.
    pub fn authorize(
        &self,
        requestor: &Requestor,
        appointment: &Appointment,
        action: AppointmentAction,
    ) -> Result<(), AppointmentError> {
        let owns_as_doctor = requestor.role == UserRole::Doctor && appointment.doctor_id == requestor.id;
        let owns_as_patient = requestor.role == UserRole::Patient && appointment.patient_id == requestor.id;

        let allowed = match action {
            AppointmentAction::UpdateStatus => owns_as_doctor,
            AppointmentAction::View | AppointmentAction::Cancel => owns_as_doctor || owns_as_patient,
        };

        if !allowed {
            warn!(
                "{} {} denied {:?} on appointment {}",
                requestor.role, requestor.id, action, appointment.id
            );
            let reason = match action {
                AppointmentAction::UpdateStatus => "only the appointment's doctor may change its status",
                AppointmentAction::Cancel => "only the appointment's patient or doctor may cancel it",
                AppointmentAction::View => "not a participant of this appointment",
            };
            return Err(AppointmentError::Forbidden(reason.to_string()));
        }

        Ok(())
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> &'static [AppointmentStatus] {
        match current_status {
            AppointmentStatus::Scheduled => &[
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            // Terminal states
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow => &[],
        }
    }
}
