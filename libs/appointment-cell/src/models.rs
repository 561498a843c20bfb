// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::UserRole;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// Persisted appointment row. Field names match the `appointments` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Whether this appointment still occupies its doctor's slot.
    pub fn holds_slot(&self) -> bool {
        self.status.holds_slot()
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.patient_id == user_id || self.doctor_id == user_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AppointmentStatus::Scheduled)
    }

    /// Only cancellation releases a slot for rebooking.
    pub fn holds_slot(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "SCHEDULED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
            AppointmentStatus::NoShow => "NO_SHOW",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SCHEDULED" => Ok(AppointmentStatus::Scheduled),
            "COMPLETED" => Ok(AppointmentStatus::Completed),
            "CANCELLED" => Ok(AppointmentStatus::Cancelled),
            "NO_SHOW" => Ok(AppointmentStatus::NoShow),
            other => Err(format!("unknown appointment status '{}'", other)),
        }
    }
}

/// Insert payload for a fresh booking; the store assigns SCHEDULED.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub date: DateTime<Utc>,
    pub notes: Option<String>,
}

impl NewAppointment {
    pub fn into_appointment(self, now: DateTime<Utc>) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            date: self.date,
            status: AppointmentStatus::Scheduled,
            notes: self.notes,
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The authenticated actor behind a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requestor {
    pub id: Uuid,
    pub role: UserRole,
}

impl Requestor {
    pub fn patient(id: Uuid) -> Self {
        Self { id, role: UserRole::Patient }
    }

    pub fn doctor(id: Uuid) -> Self {
        Self { id, role: UserRole::Doctor }
    }
}

impl TryFrom<&User> for Requestor {
    type Error = AppError;

    fn try_from(user: &User) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&user.id)
            .map_err(|_| AppError::Auth("Token subject is not a valid user id".to_string()))?;
        let role = user
            .role
            .as_deref()
            .ok_or_else(|| AppError::Forbidden("Token carries no role".to_string()))?
            .parse::<UserRole>()
            .map_err(AppError::Forbidden)?;

        Ok(Self { id, role })
    }
}

// ==============================================================================
// LISTING MODELS
// ==============================================================================

/// The other participant of an appointment, seen from the requestor's side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Counterpart {
    Doctor {
        id: Uuid,
        name: String,
        specialty: Option<String>,
    },
    Patient {
        id: Uuid,
        name: String,
        email: String,
    },
    /// The referenced user row could not be resolved.
    Unknown { id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentSummary {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub counterpart: Counterpart,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    /// Defaults to the caller; when present it must match the caller.
    pub patient_id: Option<Uuid>,
    pub doctor_id: Uuid,
    pub date: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableSlotsQuery {
    pub date: NaiveDate,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Invalid appointment date: {0}")]
    InvalidDate(String),

    #[error("Invalid appointment slot: {0}")]
    InvalidSlot(String),

    #[error("Doctor already has an appointment at this time")]
    SchedulingConflict { conflicting_id: Option<Uuid> },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Cannot change appointment status from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl AppointmentError {
    /// Only collaborator outages are worth resubmitting unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppointmentError::Unavailable(_))
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        let message = err.to_string();
        match err {
            AppointmentError::InvalidDate(_) | AppointmentError::InvalidSlot(_) => {
                AppError::ValidationError(message)
            }
            AppointmentError::SchedulingConflict { .. } => AppError::Conflict(message),
            AppointmentError::Forbidden(_) => AppError::Forbidden(message),
            AppointmentError::InvalidTransition { .. } => AppError::Conflict(message),
            AppointmentError::NotFound(_) => AppError::NotFound(message),
            AppointmentError::Unavailable(_) => AppError::Unavailable(message),
        }
    }
}
