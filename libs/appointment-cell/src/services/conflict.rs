// libs/appointment-cell/src/services/conflict.rs
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::AppointmentError;
use crate::services::repository::AppointmentRepository;

/// Exact-instant conflict lookups. Slots are atomic half-hour points, so two
/// appointments conflict only when doctor and instant are equal.
pub struct ConflictDetectionService {
    repository: Arc<dyn AppointmentRepository>,
}

impl ConflictDetectionService {
    pub fn new(repository: Arc<dyn AppointmentRepository>) -> Self {
        Self { repository }
    }

    /// Id of the non-cancelled appointment holding `instant` for the doctor.
    pub async fn find_conflict(
        &self,
        doctor_id: Uuid,
        instant: DateTime<Utc>,
    ) -> Result<Option<Uuid>, AppointmentError> {
        debug!("Checking conflicts for doctor {} at {}", doctor_id, instant);

        let conflict = self.repository.find_active_at(doctor_id, instant).await?;
        if let Some(conflicting_id) = conflict {
            warn!("Conflict detected for doctor {} at {}: appointment {}", doctor_id, instant, conflicting_id);
        }
        Ok(conflict)
    }

    /// Instants of the doctor's non-cancelled appointments, for slot listings.
    pub async fn occupied_instants(&self, doctor_id: Uuid) -> Result<HashSet<DateTime<Utc>>, AppointmentError> {
        Ok(self
            .repository
            .list_for_doctor(doctor_id)
            .await?
            .into_iter()
            .filter(|apt| apt.holds_slot())
            .map(|apt| apt.date)
            .collect())
    }
}
