pub mod appointment;
pub mod booking;
pub mod conflict;
pub mod lifecycle;
pub mod memory;
pub mod messages;
pub mod notification;
pub mod repository;
pub mod supabase_store;
pub mod validation;

pub use appointment::{AppointmentService, Committed};
pub use booking::{AppointmentBookingService, BookingOutcome};
pub use conflict::ConflictDetectionService;
pub use lifecycle::{AppointmentAction, AppointmentLifecycleService};
pub use memory::{InMemoryAppointmentRepository, InMemoryUserDirectory};
pub use messages::{Locale, MessageTemplates};
pub use notification::{
    DispatchReport, LogNotificationSender, NotificationDispatcher, NotificationError,
    NotificationIntent, NotificationKind, NotificationSender, OutboxNotificationSender,
};
pub use repository::{AppointmentRepository, StatusUpdate, UserDirectory};
pub use supabase_store::{SupabaseAppointmentRepository, SupabaseUserDirectory};
pub use validation::SchedulingRules;
