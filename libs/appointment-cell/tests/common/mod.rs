#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentError, AppointmentStatus, NewAppointment};
use appointment_cell::services::{
    AppointmentRepository, AppointmentService, InMemoryAppointmentRepository, InMemoryUserDirectory,
    Locale, MessageTemplates, NotificationError, NotificationSender, SchedulingRules, StatusUpdate,
};
use shared_models::UserProfile;

/// Captures every message instead of sending it.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<SentMessage>>,
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, email: &str) -> Vec<SentMessage> {
        self.sent().into_iter().filter(|m| m.to == email).collect()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(SentMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// A mail channel that is always down.
pub struct BrokenSender;

#[async_trait]
impl NotificationSender for BrokenSender {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), NotificationError> {
        Err(NotificationError::Unavailable("smtp relay unreachable".to_string()))
    }
}

/// A store whose backend is unreachable.
pub struct OfflineRepository;

#[async_trait]
impl AppointmentRepository for OfflineRepository {
    async fn insert_scheduled(&self, _appointment: NewAppointment) -> Result<Appointment, AppointmentError> {
        Err(offline())
    }

    async fn find_active_at(&self, _doctor_id: Uuid, _date: DateTime<Utc>) -> Result<Option<Uuid>, AppointmentError> {
        Err(offline())
    }

    async fn get(&self, _appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Err(offline())
    }

    async fn compare_and_set_status(
        &self,
        _appointment_id: Uuid,
        _expected: AppointmentStatus,
        _new_status: AppointmentStatus,
        _notes: Option<String>,
    ) -> Result<StatusUpdate, AppointmentError> {
        Err(offline())
    }

    async fn list_for_doctor(&self, _doctor_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        Err(offline())
    }

    async fn list_for_patient(&self, _patient_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        Err(offline())
    }
}

fn offline() -> AppointmentError {
    AppointmentError::Unavailable("connection refused".to_string())
}

/// Serves reads from a snapshot taken while the appointment was still
/// SCHEDULED, so writes race against a row that has since moved on.
pub struct SnapshotRepository {
    pub inner: Arc<InMemoryAppointmentRepository>,
}

#[async_trait]
impl AppointmentRepository for SnapshotRepository {
    async fn insert_scheduled(&self, appointment: NewAppointment) -> Result<Appointment, AppointmentError> {
        self.inner.insert_scheduled(appointment).await
    }

    async fn find_active_at(&self, doctor_id: Uuid, date: DateTime<Utc>) -> Result<Option<Uuid>, AppointmentError> {
        self.inner.find_active_at(doctor_id, date).await
    }

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.inner.get(appointment_id).await?.map(|apt| Appointment {
            status: AppointmentStatus::Scheduled,
            ..apt
        }))
    }

    async fn compare_and_set_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        new_status: AppointmentStatus,
        notes: Option<String>,
    ) -> Result<StatusUpdate, AppointmentError> {
        self.inner
            .compare_and_set_status(appointment_id, expected, new_status, notes)
            .await
    }

    async fn list_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        self.inner.list_for_doctor(doctor_id).await
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        self.inner.list_for_patient(patient_id).await
    }
}

/// A small clinic: one doctor, two patients, in-memory storage.
pub struct Clinic {
    pub service: Arc<AppointmentService>,
    pub repository: Arc<InMemoryAppointmentRepository>,
    pub sender: Arc<RecordingSender>,
    pub doctor: UserProfile,
    pub patient: UserProfile,
    pub other_patient: UserProfile,
}

impl Clinic {
    pub async fn open() -> Self {
        let sender = Arc::new(RecordingSender::default());
        Self::open_with_sender(Arc::clone(&sender) as Arc<dyn NotificationSender>, sender).await
    }

    pub async fn open_with_sender(channel: Arc<dyn NotificationSender>, sender: Arc<RecordingSender>) -> Self {
        let repository = Arc::new(InMemoryAppointmentRepository::new());
        let users = Arc::new(InMemoryUserDirectory::new());

        let doctor = UserProfile::doctor("Amina Diallo", "amina@clinic.test", "Cardiology");
        let patient = UserProfile::patient("Paul Martin", "paul@example.com");
        let other_patient = UserProfile::patient("Lea Roy", "lea@example.com");
        for user in [&doctor, &patient, &other_patient] {
            users.insert(user.clone()).await;
        }

        let rules = SchedulingRules::default();
        let templates = MessageTemplates::new(Locale::En, rules.clinic_offset);
        let service = AppointmentService::new(
            Arc::clone(&repository) as Arc<dyn AppointmentRepository>,
            users,
            channel,
            rules,
            templates,
        );

        Self {
            service: Arc::new(service),
            repository,
            sender,
            doctor,
            patient,
            other_patient,
        }
    }
}

/// First weekday at least two days out.
pub fn upcoming_weekday() -> NaiveDate {
    let mut day = Utc::now().date_naive() + Duration::days(2);
    while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
        day = day.succ_opt().unwrap();
    }
    day
}

pub fn at(day: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_hms_opt(hour, minute, 0).unwrap())
}

/// A bookable slot on the next weekday.
pub fn upcoming_slot(hour: u32, minute: u32) -> DateTime<Utc> {
    at(upcoming_weekday(), hour, minute)
}

pub fn upcoming_saturday() -> NaiveDate {
    let mut day = Utc::now().date_naive() + Duration::days(1);
    while day.weekday() != Weekday::Sat {
        day = day.succ_opt().unwrap();
    }
    day
}
