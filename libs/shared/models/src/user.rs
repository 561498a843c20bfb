use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Patient,
    Doctor,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Patient => write!(f, "PATIENT"),
            UserRole::Doctor => write!(f, "DOCTOR"),
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PATIENT" => Ok(UserRole::Patient),
            "DOCTOR" => Ok(UserRole::Doctor),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// A clinic user as stored in the `users` table.
///
/// `role` never changes after registration; `specialty` is only set for doctors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub specialty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn patient(name: &str, email: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            role: UserRole::Patient,
            specialty: None,
            created_at: None,
        }
    }

    pub fn doctor(name: &str, email: &str, specialty: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            role: UserRole::Doctor,
            specialty: Some(specialty.to_string()),
            created_at: None,
        }
    }

    pub fn is_doctor(&self) -> bool {
        self.role == UserRole::Doctor
    }
}
