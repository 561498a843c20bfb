// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::AppointmentService;

pub fn appointment_routes(config: Arc<AppConfig>, service: Arc<AppointmentService>) -> Router {
    // Every appointment operation requires an authenticated patient or doctor
    Router::new()
        .route("/", post(handlers::create_appointment).get(handlers::list_appointments))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/status", patch(handlers::update_appointment_status))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/doctors/{doctor_id}/slots", get(handlers::get_available_slots))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(service)
}
