// libs/appointment-cell/src/services/memory.rs
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use shared_models::UserProfile;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, NewAppointment};
use crate::services::repository::{AppointmentRepository, StatusUpdate, UserDirectory};

/// Process-local appointment store. A single mutex serialises every write, so
/// the conflict check and the insert cannot interleave with another booking.
#[derive(Default)]
pub struct InMemoryAppointmentRepository {
    appointments: Mutex<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.appointments.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn sorted(mut appointments: Vec<Appointment>) -> Vec<Appointment> {
        appointments.sort_by_key(|apt| (apt.date, apt.created_at));
        appointments
    }
}

fn active_at(appointments: &HashMap<Uuid, Appointment>, doctor_id: Uuid, date: DateTime<Utc>) -> Option<Uuid> {
    appointments
        .values()
        .find(|apt| apt.doctor_id == doctor_id && apt.date == date && apt.holds_slot())
        .map(|apt| apt.id)
}

#[async_trait]
impl AppointmentRepository for InMemoryAppointmentRepository {
    async fn insert_scheduled(&self, appointment: NewAppointment) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.lock().await;

        if let Some(conflicting_id) = active_at(&appointments, appointment.doctor_id, appointment.date) {
            debug!("Slot already held by appointment {}", conflicting_id);
            return Err(AppointmentError::SchedulingConflict {
                conflicting_id: Some(conflicting_id),
            });
        }

        let created = appointment.into_appointment(Utc::now());
        appointments.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_active_at(&self, doctor_id: Uuid, date: DateTime<Utc>) -> Result<Option<Uuid>, AppointmentError> {
        Ok(active_at(&*self.appointments.lock().await, doctor_id, date))
    }

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.appointments.lock().await.get(&appointment_id).cloned())
    }

    async fn compare_and_set_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        new_status: AppointmentStatus,
        notes: Option<String>,
    ) -> Result<StatusUpdate, AppointmentError> {
        let mut appointments = self.appointments.lock().await;

        let Some(appointment) = appointments.get_mut(&appointment_id) else {
            return Ok(StatusUpdate::Missing);
        };

        if appointment.status != expected {
            return Ok(StatusUpdate::Stale(appointment.clone()));
        }

        appointment.status = new_status;
        if notes.is_some() {
            appointment.notes = notes;
        }
        appointment.updated_at = Utc::now();

        Ok(StatusUpdate::Applied(appointment.clone()))
    }

    async fn list_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.lock().await;
        Ok(Self::sorted(
            appointments.values().filter(|apt| apt.doctor_id == doctor_id).cloned().collect(),
        ))
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.lock().await;
        Ok(Self::sorted(
            appointments.values().filter(|apt| apt.patient_id == patient_id).cloned().collect(),
        ))
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<Uuid, UserProfile>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserProfile>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().map(|user| (user.id, user)).collect()),
        }
    }

    /// Loads a JSON array of `users` rows.
    pub fn from_seed_file(path: &Path) -> Result<Self, AppointmentError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            AppointmentError::Unavailable(format!("cannot read seed users {}: {}", path.display(), e))
        })?;
        let users: Vec<UserProfile> = serde_json::from_str(&raw).map_err(|e| {
            AppointmentError::Unavailable(format!("invalid seed users {}: {}", path.display(), e))
        })?;

        debug!("Seeded {} users from {}", users.len(), path.display());
        Ok(Self::with_users(users))
    }

    pub async fn insert(&self, user: UserProfile) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserProfile>, AppointmentError> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }
}
