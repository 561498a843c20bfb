// libs/appointment-cell/src/services/messages.rs
use std::str::FromStr;

use chrono::FixedOffset;
use tracing::warn;

use shared_models::{UserProfile, UserRole};

use crate::models::Appointment;
use crate::services::notification::{NotificationIntent, NotificationKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Fr,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "en-us" | "en-gb" => Ok(Locale::En),
            "fr" | "fr-fr" => Ok(Locale::Fr),
            other => Err(format!("unsupported locale '{}'", other)),
        }
    }
}

impl Locale {
    pub fn from_config_value(value: &str) -> Self {
        value.parse().unwrap_or_else(|e| {
            warn!("{}, falling back to English notifications", e);
            Locale::En
        })
    }
}

/// Renders localized notification bodies. Instants are shown in clinic time.
#[derive(Debug, Clone)]
pub struct MessageTemplates {
    locale: Locale,
    clinic_offset: FixedOffset,
}

impl MessageTemplates {
    pub fn new(locale: Locale, clinic_offset: FixedOffset) -> Self {
        Self { locale, clinic_offset }
    }

    fn when(&self, appointment: &Appointment) -> String {
        let local = appointment.date.with_timezone(&self.clinic_offset);
        match self.locale {
            Locale::En => local.format("%A %d %B %Y at %H:%M").to_string(),
            Locale::Fr => local.format("%d/%m/%Y à %H:%M").to_string(),
        }
    }

    fn display_name(&self, user: &UserProfile) -> String {
        match (user.role, self.locale) {
            (UserRole::Doctor, Locale::En) => format!("Dr. {}", user.name),
            (UserRole::Doctor, Locale::Fr) => format!("Dr {}", user.name),
            (UserRole::Patient, _) => user.name.clone(),
        }
    }

    fn intent(
        &self,
        kind: NotificationKind,
        appointment: &Appointment,
        recipient: &UserProfile,
        subject: String,
        body: String,
    ) -> NotificationIntent {
        NotificationIntent {
            kind,
            appointment_id: appointment.id,
            to: recipient.email.clone(),
            subject,
            body,
        }
    }

    /// "New appointment" notice for one participant; `counterpart` is the other.
    pub fn booking_created(
        &self,
        appointment: &Appointment,
        recipient: &UserProfile,
        counterpart: &UserProfile,
    ) -> NotificationIntent {
        let when = self.when(appointment);
        let with = self.display_name(counterpart);
        let notes = appointment.notes.as_deref().unwrap_or("");

        let (subject, body) = match self.locale {
            Locale::En => (
                "New appointment".to_string(),
                format!(
                    "Hello {},\n\nA new appointment with {} has been booked for {}.\n{}",
                    recipient.name, with, when, notes_line(notes, "Notes")
                ),
            ),
            Locale::Fr => (
                "Nouveau rendez-vous".to_string(),
                format!(
                    "Bonjour {},\n\nUn nouveau rendez-vous avec {} a été fixé le {}.\n{}",
                    recipient.name, with, when, notes_line(notes, "Notes")
                ),
            ),
        };

        self.intent(NotificationKind::BookingCreated, appointment, recipient, subject, body)
    }

    pub fn appointment_completed(
        &self,
        appointment: &Appointment,
        patient: &UserProfile,
        doctor: &UserProfile,
    ) -> NotificationIntent {
        let when = self.when(appointment);
        let doctor_name = self.display_name(doctor);
        let notes = appointment.notes.as_deref().unwrap_or("");

        let (subject, body) = match self.locale {
            Locale::En => (
                "Appointment completed".to_string(),
                format!(
                    "Hello {},\n\nYour appointment with {} on {} has been marked as completed.\n{}",
                    patient.name, doctor_name, when, notes_line(notes, "Doctor's notes")
                ),
            ),
            Locale::Fr => (
                "Rendez-vous terminé".to_string(),
                format!(
                    "Bonjour {},\n\nVotre rendez-vous avec {} du {} est terminé.\n{}",
                    patient.name, doctor_name, when, notes_line(notes, "Notes du médecin")
                ),
            ),
        };

        self.intent(NotificationKind::AppointmentCompleted, appointment, patient, subject, body)
    }

    pub fn appointment_cancelled(
        &self,
        appointment: &Appointment,
        recipient: &UserProfile,
        counterpart: &UserProfile,
        cancelled_by: UserRole,
    ) -> NotificationIntent {
        let when = self.when(appointment);
        let with = self.display_name(counterpart);

        let (subject, body) = match self.locale {
            Locale::En => {
                let by = match cancelled_by {
                    UserRole::Patient => "the patient",
                    UserRole::Doctor => "the doctor",
                };
                (
                    "Appointment cancelled".to_string(),
                    format!(
                        "Hello {},\n\nYour appointment with {} on {} has been cancelled by {}.",
                        recipient.name, with, when, by
                    ),
                )
            }
            Locale::Fr => {
                let by = match cancelled_by {
                    UserRole::Patient => "le patient",
                    UserRole::Doctor => "le médecin",
                };
                (
                    "Rendez-vous annulé".to_string(),
                    format!(
                        "Bonjour {},\n\nVotre rendez-vous avec {} du {} a été annulé par {}.",
                        recipient.name, with, when, by
                    ),
                )
            }
        };

        self.intent(NotificationKind::AppointmentCancelled, appointment, recipient, subject, body)
    }
}

fn notes_line(notes: &str, label: &str) -> String {
    if notes.is_empty() {
        String::new()
    } else {
        format!("{}: {}\n", label, notes)
    }
}
