// libs/appointment-cell/src/services/repository.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use shared_models::UserProfile;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, NewAppointment};

/// Result of a compare-and-set status write.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    /// The row held the expected status and now carries the new one.
    Applied(Appointment),
    /// The row exists but its status no longer matches the expectation.
    Stale(Appointment),
    Missing,
}

/// Appointment storage. Implementations must make `insert_scheduled` atomic
/// with respect to the one-active-appointment-per-doctor-and-instant rule.
#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    /// Inserts a SCHEDULED appointment, or fails with
    /// `AppointmentError::SchedulingConflict` when the doctor already holds a
    /// non-cancelled appointment at that instant.
    async fn insert_scheduled(&self, appointment: NewAppointment) -> Result<Appointment, AppointmentError>;

    /// Id of the non-cancelled appointment the doctor holds at `date`, if any.
    async fn find_active_at(&self, doctor_id: Uuid, date: DateTime<Utc>) -> Result<Option<Uuid>, AppointmentError>;

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    async fn compare_and_set_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        new_status: AppointmentStatus,
        notes: Option<String>,
    ) -> Result<StatusUpdate, AppointmentError>;

    /// Ordered by `date` ascending.
    async fn list_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>, AppointmentError>;

    /// Ordered by `date` ascending.
    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, AppointmentError>;
}

/// Read access to registered clinic users.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserProfile>, AppointmentError>;
}
