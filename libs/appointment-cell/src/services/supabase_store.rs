// libs/appointment-cell/src/services/supabase_store.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, error, warn};
use uuid::Uuid;

use shared_database::{DatabaseError, SupabaseClient};
use shared_models::UserProfile;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, NewAppointment};
use crate::services::repository::{AppointmentRepository, StatusUpdate, UserDirectory};

const APPOINTMENTS: &str = "/rest/v1/appointments";
const USERS: &str = "/rest/v1/users";

/// PostgREST-backed appointment store. Double-booking is rejected by the
/// `appointments_doctor_slot_active` partial unique index, so the insert is
/// the atomic check.
pub struct SupabaseAppointmentRepository {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentRepository {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch(&self, path: &str) -> Result<Vec<Appointment>, AppointmentError> {
        self.supabase
            .request::<Vec<Appointment>>(Method::GET, path, None, None)
            .await
            .map_err(unavailable)
    }
}

fn encode_instant(date: DateTime<Utc>) -> String {
    urlencoding::encode(&date.to_rfc3339_opts(SecondsFormat::Secs, true)).into_owned()
}

fn unavailable(err: DatabaseError) -> AppointmentError {
    error!("Appointment store failure: {}", err);
    AppointmentError::Unavailable(err.to_string())
}

#[async_trait]
impl AppointmentRepository for SupabaseAppointmentRepository {
    async fn insert_scheduled(&self, appointment: NewAppointment) -> Result<Appointment, AppointmentError> {
        let now = Utc::now();
        let body = json!({
            "id": Uuid::new_v4(),
            "date": appointment.date.to_rfc3339(),
            "status": AppointmentStatus::Scheduled,
            "notes": appointment.notes,
            "patient_id": appointment.patient_id,
            "doctor_id": appointment.doctor_id,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let result = self
            .supabase
            .request_with_headers::<Vec<Appointment>>(
                Method::POST,
                APPOINTMENTS,
                None,
                Some(body),
                Some(SupabaseClient::return_representation()),
            )
            .await;

        match result {
            Ok(rows) => rows.into_iter().next().ok_or_else(|| {
                AppointmentError::Unavailable("Appointment insert returned no row".to_string())
            }),
            Err(DatabaseError::UniqueViolation(detail)) => {
                debug!("Insert rejected by slot index: {}", detail);
                let conflicting_id = self
                    .find_active_at(appointment.doctor_id, appointment.date)
                    .await
                    .unwrap_or_else(|e| {
                        warn!("Could not resolve conflicting appointment: {}", e);
                        None
                    });
                Err(AppointmentError::SchedulingConflict { conflicting_id })
            }
            Err(DatabaseError::ForeignKeyViolation(detail)) => {
                warn!("Insert referenced a missing user: {}", detail);
                Err(AppointmentError::NotFound(format!(
                    "patient {} or doctor {} no longer exists",
                    appointment.patient_id, appointment.doctor_id
                )))
            }
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn find_active_at(&self, doctor_id: Uuid, date: DateTime<Utc>) -> Result<Option<Uuid>, AppointmentError> {
        let path = format!(
            "{}?doctor_id=eq.{}&date=eq.{}&status=neq.{}&select=*&limit=1",
            APPOINTMENTS,
            doctor_id,
            encode_instant(date),
            AppointmentStatus::Cancelled
        );
        Ok(self.fetch(&path).await?.into_iter().next().map(|apt| apt.id))
    }

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!("{}?id=eq.{}", APPOINTMENTS, appointment_id);
        Ok(self.fetch(&path).await?.into_iter().next())
    }

    async fn compare_and_set_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        new_status: AppointmentStatus,
        notes: Option<String>,
    ) -> Result<StatusUpdate, AppointmentError> {
        let mut update = serde_json::Map::new();
        update.insert("status".to_string(), json!(new_status));
        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        if let Some(notes) = notes {
            update.insert("notes".to_string(), json!(notes));
        }

        // The status filter turns the PATCH into a single-row compare-and-set.
        let path = format!("{}?id=eq.{}&status=eq.{}", APPOINTMENTS, appointment_id, expected);
        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                None,
                Some(serde_json::Value::Object(update)),
                Some(SupabaseClient::return_representation()),
            )
            .await
            .map_err(unavailable)?;

        if let Some(updated) = rows.into_iter().next() {
            return Ok(StatusUpdate::Applied(updated));
        }

        Ok(match self.get(appointment_id).await? {
            Some(current) => StatusUpdate::Stale(current),
            None => StatusUpdate::Missing,
        })
    }

    async fn list_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!("{}?doctor_id=eq.{}&order=date.asc", APPOINTMENTS, doctor_id);
        self.fetch(&path).await
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!("{}?patient_id=eq.{}&order=date.asc", APPOINTMENTS, patient_id);
        self.fetch(&path).await
    }
}

pub struct SupabaseUserDirectory {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseUserDirectory {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl UserDirectory for SupabaseUserDirectory {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserProfile>, AppointmentError> {
        let path = format!("{}?id=eq.{}&select=id,name,email,role,specialty,created_at", USERS, user_id);
        let rows: Vec<UserProfile> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(unavailable)?;
        Ok(rows.into_iter().next())
    }
}
