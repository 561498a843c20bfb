// libs/appointment-cell/src/services/booking.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_models::{UserProfile, UserRole};

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, AppointmentSummary, Counterpart,
    NewAppointment, Requestor,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::{AppointmentAction, AppointmentLifecycleService};
use crate::services::messages::MessageTemplates;
use crate::services::notification::NotificationIntent;
use crate::services::repository::{AppointmentRepository, StatusUpdate, UserDirectory};
use crate::services::validation::SchedulingRules;

/// A committed mutation plus the notifications it should trigger. Delivery
/// happens outside the transaction.
#[derive(Debug, Clone)]
pub struct BookingOutcome {
    pub appointment: Appointment,
    pub notifications: Vec<NotificationIntent>,
}

pub struct AppointmentBookingService {
    repository: Arc<dyn AppointmentRepository>,
    users: Arc<dyn UserDirectory>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    rules: SchedulingRules,
    templates: MessageTemplates,
}

impl AppointmentBookingService {
    pub fn new(
        repository: Arc<dyn AppointmentRepository>,
        users: Arc<dyn UserDirectory>,
        rules: SchedulingRules,
        templates: MessageTemplates,
    ) -> Self {
        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&repository)),
            lifecycle_service: AppointmentLifecycleService::new(),
            repository,
            users,
            rules,
            templates,
        }
    }

    pub fn rules(&self) -> &SchedulingRules {
        &self.rules
    }

    /// Books a SCHEDULED appointment for `patient_id` with `doctor_id`.
    #[instrument(skip(self, notes))]
    pub async fn create(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        date: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<BookingOutcome, AppointmentError> {
        self.rules.validate(date, Utc::now())?;

        let patient = self.require_user(patient_id, UserRole::Patient).await?;
        let doctor = self.require_user(doctor_id, UserRole::Doctor).await?;

        // Early exit with a diagnostic id; the insert below is the real guard.
        if let Some(conflicting_id) = self.conflict_service.find_conflict(doctor_id, date).await? {
            return Err(AppointmentError::SchedulingConflict {
                conflicting_id: Some(conflicting_id),
            });
        }

        let appointment = self
            .repository
            .insert_scheduled(NewAppointment {
                patient_id,
                doctor_id,
                date,
                notes,
            })
            .await?;

        info!("Appointment {} booked for patient {} with doctor {} at {}", appointment.id, patient_id, doctor_id, date);

        let notifications = vec![
            self.templates.booking_created(&appointment, &doctor, &patient),
            self.templates.booking_created(&appointment, &patient, &doctor),
        ];

        Ok(BookingOutcome {
            appointment,
            notifications,
        })
    }

    /// Doctor-driven status change: SCHEDULED to COMPLETED, CANCELLED or NO_SHOW.
    #[instrument(skip(self, notes))]
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        requestor: Requestor,
        new_status: AppointmentStatus,
        notes: Option<String>,
    ) -> Result<BookingOutcome, AppointmentError> {
        let current = self.load(appointment_id).await?;
        self.lifecycle_service
            .authorize(&requestor, &current, AppointmentAction::UpdateStatus)?;
        self.transition(current, requestor, new_status, notes).await
    }

    /// Cancellation by the owning patient or doctor.
    #[instrument(skip(self))]
    pub async fn cancel(&self, appointment_id: Uuid, requestor: Requestor) -> Result<BookingOutcome, AppointmentError> {
        let current = self.load(appointment_id).await?;
        self.lifecycle_service
            .authorize(&requestor, &current, AppointmentAction::Cancel)?;
        self.transition(current, requestor, AppointmentStatus::Cancelled, None).await
    }

    pub async fn get(&self, appointment_id: Uuid, requestor: Requestor) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        self.lifecycle_service
            .authorize(&requestor, &appointment, AppointmentAction::View)?;
        Ok(appointment)
    }

    /// All of the requestor's appointments, earliest first, with the other
    /// participant summarised.
    pub async fn list(&self, requestor: Requestor) -> Result<Vec<AppointmentSummary>, AppointmentError> {
        let appointments = match requestor.role {
            UserRole::Doctor => self.repository.list_for_doctor(requestor.id).await?,
            UserRole::Patient => self.repository.list_for_patient(requestor.id).await?,
        };
        debug!("Listing {} appointments for {} {}", appointments.len(), requestor.role, requestor.id);

        let mut counterparts: HashMap<Uuid, Counterpart> = HashMap::new();
        let mut summaries = Vec::with_capacity(appointments.len());

        for appointment in appointments {
            let other_id = match requestor.role {
                UserRole::Doctor => appointment.patient_id,
                UserRole::Patient => appointment.doctor_id,
            };

            let counterpart = match counterparts.get(&other_id) {
                Some(known) => known.clone(),
                None => {
                    let resolved = self.summarise(other_id).await?;
                    counterparts.insert(other_id, resolved.clone());
                    resolved
                }
            };

            summaries.push(AppointmentSummary {
                id: appointment.id,
                date: appointment.date,
                status: appointment.status,
                notes: appointment.notes,
                counterpart,
            });
        }

        Ok(summaries)
    }

    /// Free, bookable slots for a doctor on a clinic-local date.
    pub async fn available_slots(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<DateTime<Utc>>, AppointmentError> {
        self.require_user(doctor_id, UserRole::Doctor).await?;

        let now = Utc::now();
        let occupied = self.conflict_service.occupied_instants(doctor_id).await?;

        Ok(self
            .rules
            .slots_on(date)
            .into_iter()
            .filter(|slot| self.rules.validate(*slot, now).is_ok())
            .filter(|slot| !occupied.contains(slot))
            .collect())
    }

    pub async fn check_slot(&self, doctor_id: Uuid, date: DateTime<Utc>) -> Result<Option<Uuid>, AppointmentError> {
        self.conflict_service.find_conflict(doctor_id, date).await
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn transition(
        &self,
        current: Appointment,
        requestor: Requestor,
        new_status: AppointmentStatus,
        notes: Option<String>,
    ) -> Result<BookingOutcome, AppointmentError> {
        self.lifecycle_service
            .validate_status_transition(current.status, new_status)?;

        let updated = match self
            .repository
            .compare_and_set_status(current.id, current.status, new_status, notes)
            .await?
        {
            StatusUpdate::Applied(updated) => updated,
            StatusUpdate::Stale(latest) => {
                // Someone else moved it first; report against what is stored now.
                warn!("Appointment {} changed concurrently to {}", latest.id, latest.status);
                return Err(AppointmentError::InvalidTransition {
                    from: latest.status,
                    to: new_status,
                });
            }
            StatusUpdate::Missing => {
                return Err(AppointmentError::NotFound(format!("appointment {}", current.id)));
            }
        };

        info!("Appointment {} moved {} -> {} by {} {}", updated.id, current.status, updated.status, requestor.role, requestor.id);

        let notifications = self.transition_notifications(&updated, requestor.role).await;
        Ok(BookingOutcome {
            appointment: updated,
            notifications,
        })
    }

    /// Participant lookups happen after commit, so a failure here only costs
    /// the notifications.
    async fn transition_notifications(&self, appointment: &Appointment, actor: UserRole) -> Vec<NotificationIntent> {
        if !matches!(appointment.status, AppointmentStatus::Completed | AppointmentStatus::Cancelled) {
            return Vec::new();
        }

        let participants = async {
            let patient = self.users.find_user(appointment.patient_id).await?;
            let doctor = self.users.find_user(appointment.doctor_id).await?;
            Ok::<_, AppointmentError>(patient.zip(doctor))
        };

        let (patient, doctor) = match participants.await {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                warn!("Participants of appointment {} not found, skipping notifications", appointment.id);
                return Vec::new();
            }
            Err(e) => {
                warn!("Could not load participants of appointment {}: {}", appointment.id, e);
                return Vec::new();
            }
        };

        match appointment.status {
            AppointmentStatus::Completed => {
                vec![self.templates.appointment_completed(appointment, &patient, &doctor)]
            }
            AppointmentStatus::Cancelled => vec![
                self.templates.appointment_cancelled(appointment, &doctor, &patient, actor),
                self.templates.appointment_cancelled(appointment, &patient, &doctor, actor),
            ],
            _ => Vec::new(),
        }
    }

    async fn load(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.repository
            .get(appointment_id)
            .await?
            .ok_or_else(|| AppointmentError::NotFound(format!("appointment {}", appointment_id)))
    }

    async fn require_user(&self, user_id: Uuid, role: UserRole) -> Result<UserProfile, AppointmentError> {
        match self.users.find_user(user_id).await? {
            Some(user) if user.role == role => Ok(user),
            Some(user) => {
                warn!("User {} has role {}, expected {}", user_id, user.role, role);
                Err(AppointmentError::NotFound(format!("no {} with id {}", role_label(role), user_id)))
            }
            None => Err(AppointmentError::NotFound(format!("no {} with id {}", role_label(role), user_id))),
        }
    }

    async fn summarise(&self, user_id: Uuid) -> Result<Counterpart, AppointmentError> {
        Ok(match self.users.find_user(user_id).await? {
            Some(user) => match user.role {
                UserRole::Doctor => Counterpart::Doctor {
                    id: user.id,
                    name: user.name,
                    specialty: user.specialty,
                },
                UserRole::Patient => Counterpart::Patient {
                    id: user.id,
                    name: user.name,
                    email: user.email,
                },
            },
            None => {
                warn!("Appointment counterpart {} not found", user_id);
                Counterpart::Unknown { id: user_id }
            }
        })
    }
}

fn role_label(role: UserRole) -> &'static str {
    match role {
        UserRole::Patient => "patient",
        UserRole::Doctor => "doctor",
    }
}
