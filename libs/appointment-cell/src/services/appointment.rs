// libs/appointment-cell/src/services/appointment.rs
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use shared_config::{AppConfig, StorageBackend};
use shared_database::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, AppointmentSummary, Requestor,
};
use crate::services::booking::{AppointmentBookingService, BookingOutcome};
use crate::services::memory::{InMemoryAppointmentRepository, InMemoryUserDirectory};
use crate::services::messages::{Locale, MessageTemplates};
use crate::services::notification::{
    DispatchReport, LogNotificationSender, NotificationDispatcher, NotificationSender,
    OutboxNotificationSender,
};
use crate::services::repository::{AppointmentRepository, UserDirectory};
use crate::services::supabase_store::{SupabaseAppointmentRepository, SupabaseUserDirectory};
use crate::services::validation::SchedulingRules;

/// A committed appointment mutation. `delivery` resolves once its
/// notifications have been attempted; dropping it leaves them running.
#[derive(Debug)]
pub struct Committed {
    pub appointment: Appointment,
    pub delivery: JoinHandle<DispatchReport>,
}

/// Entry point used by the HTTP layer: runs the booking transaction, then
/// hands the resulting notifications to the dispatcher.
pub struct AppointmentService {
    booking: AppointmentBookingService,
    dispatcher: NotificationDispatcher,
}

impl AppointmentService {
    pub fn new(
        repository: Arc<dyn AppointmentRepository>,
        users: Arc<dyn UserDirectory>,
        sender: Arc<dyn NotificationSender>,
        rules: SchedulingRules,
        templates: MessageTemplates,
    ) -> Self {
        Self {
            booking: AppointmentBookingService::new(repository, users, rules, templates),
            dispatcher: NotificationDispatcher::new(sender),
        }
    }

    /// Wires the storage backend and notification channel named by the config.
    pub fn from_config(config: &AppConfig) -> Self {
        let rules = SchedulingRules::from_config(config);
        let templates = MessageTemplates::new(
            Locale::from_config_value(&config.notification_locale),
            rules.clinic_offset,
        );

        let (repository, users, sender): (
            Arc<dyn AppointmentRepository>,
            Arc<dyn UserDirectory>,
            Arc<dyn NotificationSender>,
        ) = match config.storage_backend {
            StorageBackend::Supabase => {
                let supabase = Arc::new(SupabaseClient::new(config));
                (
                    Arc::new(SupabaseAppointmentRepository::new(Arc::clone(&supabase))),
                    Arc::new(SupabaseUserDirectory::new(Arc::clone(&supabase))),
                    Arc::new(OutboxNotificationSender::new(supabase, &config.notification_sender)),
                )
            }
            StorageBackend::Memory => (
                Arc::new(InMemoryAppointmentRepository::new()),
                Arc::new(seeded_directory(config.seed_users_file.as_deref())),
                Arc::new(LogNotificationSender),
            ),
        };

        info!("Appointment service using {:?} storage", config.storage_backend);
        Self::new(repository, users, sender, rules, templates)
    }

    pub fn rules(&self) -> &SchedulingRules {
        self.booking.rules()
    }

    pub async fn create_appointment(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        date: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<Committed, AppointmentError> {
        let outcome = self.booking.create(patient_id, doctor_id, date, notes).await?;
        Ok(self.commit(outcome))
    }

    pub async fn update_appointment_status(
        &self,
        appointment_id: Uuid,
        requestor: Requestor,
        new_status: AppointmentStatus,
        notes: Option<String>,
    ) -> Result<Committed, AppointmentError> {
        let outcome = self
            .booking
            .update_status(appointment_id, requestor, new_status, notes)
            .await?;
        Ok(self.commit(outcome))
    }

    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        requestor: Requestor,
    ) -> Result<Committed, AppointmentError> {
        let outcome = self.booking.cancel(appointment_id, requestor).await?;
        Ok(self.commit(outcome))
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        requestor: Requestor,
    ) -> Result<Appointment, AppointmentError> {
        self.booking.get(appointment_id, requestor).await
    }

    pub async fn list_appointments(&self, requestor: Requestor) -> Result<Vec<AppointmentSummary>, AppointmentError> {
        self.booking.list(requestor).await
    }

    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<DateTime<Utc>>, AppointmentError> {
        self.booking.available_slots(doctor_id, date).await
    }

    /// Id of the appointment currently holding the slot, if any.
    pub async fn check_slot(&self, doctor_id: Uuid, date: DateTime<Utc>) -> Result<Option<Uuid>, AppointmentError> {
        self.booking.check_slot(doctor_id, date).await
    }

    fn commit(&self, outcome: BookingOutcome) -> Committed {
        let BookingOutcome { appointment, notifications } = outcome;
        Committed {
            appointment,
            delivery: self.dispatcher.dispatch(notifications),
        }
    }
}

/// In-memory mode has no `users` table, so participants come from a seed file.
fn seeded_directory(path: Option<&str>) -> InMemoryUserDirectory {
    let Some(path) = path else {
        warn!("SEED_USERS_FILE not set, in-memory user directory starts empty");
        return InMemoryUserDirectory::new();
    };

    InMemoryUserDirectory::from_seed_file(Path::new(path)).unwrap_or_else(|e| {
        warn!("{}, in-memory user directory starts empty", e);
        InMemoryUserDirectory::new()
    })
}
