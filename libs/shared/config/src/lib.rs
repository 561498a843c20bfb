use serde::Deserialize;
use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    /// Offset of the clinic's wall clock from UTC, in minutes.
    pub clinic_utc_offset_minutes: i32,
    pub booking_horizon_months: u32,
    pub notification_locale: String,
    pub notification_sender: String,
    pub storage_backend: StorageBackend,
    /// JSON list of users loaded into the in-memory directory at startup.
    pub seed_users_file: Option<String>,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Supabase,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "supabase" => Ok(StorageBackend::Supabase),
            "memory" | "in-memory" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            clinic_utc_offset_minutes: 0,
            booking_horizon_months: 6,
            notification_locale: "en".to_string(),
            notification_sender: "no-reply@clinic.local".to_string(),
            storage_backend: StorageBackend::Memory,
            seed_users_file: None,
            port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let supabase_url = env::var("SUPABASE_URL")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_URL not set, using empty value");
                String::new()
            });
        let supabase_anon_key = env::var("SUPABASE_ANON_PUBLIC_KEY")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                String::new()
            });
        let supabase_jwt_secret = env::var("SUPABASE_JWT_SECRET")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_JWT_SECRET not set, using empty value");
                String::new()
            });

        let supabase_ready = !supabase_url.is_empty() && !supabase_anon_key.is_empty();
        let default_backend = if supabase_ready {
            StorageBackend::Supabase
        } else {
            StorageBackend::Memory
        };

        let config = Self {
            supabase_url,
            supabase_anon_key,
            supabase_jwt_secret,
            clinic_utc_offset_minutes: parse_var("CLINIC_UTC_OFFSET_MINUTES", defaults.clinic_utc_offset_minutes),
            booking_horizon_months: parse_var("BOOKING_HORIZON_MONTHS", defaults.booking_horizon_months),
            notification_locale: env::var("NOTIFICATION_LOCALE")
                .unwrap_or_else(|_| defaults.notification_locale.clone()),
            notification_sender: env::var("NOTIFICATION_SENDER")
                .unwrap_or_else(|_| defaults.notification_sender.clone()),
            storage_backend: parse_var("STORAGE_BACKEND", default_backend),
            seed_users_file: env::var("SEED_USERS_FILE").ok().filter(|path| !path.is_empty()),
            port: parse_var("PORT", defaults.port),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {:?}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
