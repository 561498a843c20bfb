// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::UserRole;

use crate::models::{
    AvailableSlotsQuery, CreateAppointmentRequest, Requestor, UpdateStatusRequest,
};
use crate::services::AppointmentService;

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(service): State<Arc<AppointmentService>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let requestor = Requestor::try_from(&user)?;

    if requestor.role != UserRole::Patient {
        return Err(AppError::Forbidden("Only patients can book appointments".to_string()));
    }
    let patient_id = request.patient_id.unwrap_or(requestor.id);
    if patient_id != requestor.id {
        return Err(AppError::Forbidden("Patients can only book for themselves".to_string()));
    }

    let committed = service
        .create_appointment(patient_id, request.doctor_id, request.date, request.notes)
        .await?;

    info!("Appointment {} created via API", committed.appointment.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment": committed.appointment,
            "message": "Appointment booked successfully"
        })),
    ))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(service): State<Arc<AppointmentService>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let requestor = Requestor::try_from(&user)?;
    let appointments = service.list_appointments(requestor).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(service): State<Arc<AppointmentService>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let requestor = Requestor::try_from(&user)?;
    let appointment = service.get_appointment(appointment_id, requestor).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(service): State<Arc<AppointmentService>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let requestor = Requestor::try_from(&user)?;
    let committed = service
        .update_appointment_status(appointment_id, requestor, request.status, request.notes)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": committed.appointment,
        "message": format!("Appointment marked {}", committed.appointment.status)
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(service): State<Arc<AppointmentService>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let requestor = Requestor::try_from(&user)?;
    let committed = service.cancel_appointment(appointment_id, requestor).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": committed.appointment,
        "message": "Appointment cancelled successfully"
    })))
}

// ==============================================================================
// AVAILABILITY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_available_slots(
    State(service): State<Arc<AppointmentService>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<AvailableSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let slots = service.available_slots(doctor_id, query.date).await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": query.date,
        "slots": slots,
        "total": slots.len()
    })))
}
