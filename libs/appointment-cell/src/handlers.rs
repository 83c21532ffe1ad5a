// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, BookAppointmentRequest, DoctorAppointmentsQuery, UpdateAppointmentRequest,
};
use crate::services::booking::AppointmentBookingService;

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound
            | AppointmentError::PatientNotFound
            | AppointmentError::DoctorNotFound => AppError::NotFound(err.to_string()),
            AppointmentError::ConflictDetected => AppError::Conflict(err.to_string()),
            AppointmentError::InvalidStatusTransition { .. } => AppError::BadRequest(err.to_string()),
            AppointmentError::Unauthorized => AppError::Forbidden(err.to_string()),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

/// Profile ids equal the authenticated user id.
fn profile_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id).map_err(|_| AppError::Auth("Invalid user id in token".to_string()))
}

// ==============================================================================
// PATIENT-FACING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if !user.is_patient() {
        return Err(AppError::Forbidden("Only patients can book appointments".to_string()));
    }
    let patient_id = profile_id(&user)?;

    let appointment = AppointmentBookingService::new(&state)
        .book_appointment(patient_id, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(json!({
        "success": true,
        "appointment": appointment
    }))))
}

/// The caller's own appointments: bookings for a patient, schedule for a professional.
#[axum::debug_handler]
pub async fn list_my_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);

    let appointments = match user.role() {
        Some(Role::Patient) => service.list_for_patient(profile_id(&user)?, auth.token()).await?,
        Some(Role::Doctor) => service.list_for_doctor(profile_id(&user)?, None, auth.token()).await?,
        _ => return Err(AppError::Forbidden("No appointment list for this role".to_string())),
    };

    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = AppointmentBookingService::new(&state)
        .get_appointment_for(appointment_id, &user, auth.token())
        .await?;

    Ok(Json(json!(appointment)))
}

/// Soft cancel by the appointment's patient or professional.
#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = AppointmentBookingService::new(&state)
        .cancel_appointment(appointment_id, &user, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

// ==============================================================================
// PROFESSIONAL HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_doctor_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<DoctorAppointmentsQuery>,
) -> Result<Json<Value>, AppError> {
    if !user.is_doctor() {
        return Err(AppError::Forbidden("Only professionals can view their schedule".to_string()));
    }
    let doctor_id = profile_id(&user)?;

    let appointments = AppointmentBookingService::new(&state)
        .list_for_doctor(doctor_id, query.date, auth.token())
        .await?;

    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn update_doctor_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    if !(user.is_doctor() || user.is_admin()) {
        return Err(AppError::Forbidden("Only professionals can update appointments".to_string()));
    }

    let appointment = AppointmentBookingService::new(&state)
        .update_by_professional(appointment_id, request, &user, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}
