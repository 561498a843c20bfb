use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::json;

use appointment_cell::router::appointment_routes;
use appointment_cell::services::AppointmentService;
use shared_config::AppConfig;

pub fn create_router(config: Arc<AppConfig>, appointments: Arc<AppointmentService>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic booking API is running!" }))
        .route(
            "/health",
            get(|| async { Json(json!({ "status": "ok", "service": "clinic-booking-api" })) }),
        )
        .nest("/appointments", appointment_routes(config, appointments))
}
