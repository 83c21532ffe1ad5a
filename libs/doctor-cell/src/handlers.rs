use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AvailabilityQuery, BreakRequest, DoctorError, SlotQuery, UpdateAvailabilityRequest,
    WeeklyAvailabilityResponse,
};
use crate::services::{
    availability::AvailabilityService,
    doctor::DoctorService,
    slots::{bookable_dates, SlotService},
};

impl From<DoctorError> for AppError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound => AppError::NotFound("Professional not found".to_string()),
            DoctorError::AvailabilityNotFound => AppError::NotFound("Availability not found".to_string()),
            DoctorError::BreakNotFound => AppError::NotFound("Break not found".to_string()),
            DoctorError::ValidationError(msg) => AppError::ValidationError(msg),
            DoctorError::Unauthorized => AppError::Forbidden(err.to_string()),
            DoctorError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

// ==============================================================================
// READ HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_doctor(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let doctor = DoctorService::new(&state).get_doctor(doctor_id, auth.token()).await?;

    Ok(Json(json!({
        "id": doctor.id,
        "fullName": doctor.full_name(),
        "specialty": doctor.specialty,
        "email": doctor.email,
        "phone": doctor.phone,
    })))
}

/// Weekly availability with breaks, seeding the default week on first access.
/// With `date`, also lists bookable dates from that day over the horizon.
#[axum::debug_handler]
pub async fn get_weekly_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<WeeklyAvailabilityResponse>, AppError> {
    let token = auth.token();

    // 404 before seeding rows for an unknown professional
    DoctorService::new(&state).get_doctor(query.professional_id, token).await?;

    let availability = AvailabilityService::new(&state)
        .get_or_create_weekly_defaults(query.professional_id, token)
        .await?;

    let bookable_dates = query.date.map(|from| {
        let from = from.max(Utc::now().date_naive());
        bookable_dates(&availability, from, state.booking_horizon_days)
    });

    Ok(Json(WeeklyAvailabilityResponse {
        professional_id: query.professional_id,
        availability,
        bookable_dates,
    }))
}

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    DoctorService::new(&state).get_doctor(query.professional_id, token).await?;

    let slots = SlotService::new(&state)
        .get_available_slots(query.professional_id, query.date, token)
        .await?;

    Ok(Json(json!(slots)))
}

// ==============================================================================
// SCHEDULE MANAGEMENT HANDLERS (owning professional only)
// ==============================================================================

#[axum::debug_handler]
pub async fn update_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(availability_id): Path<Uuid>,
    Json(request): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let availability = AvailabilityService::new(&state)
        .update_availability(availability_id, request, &user, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "availability": availability
    })))
}

#[axum::debug_handler]
pub async fn add_break(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(availability_id): Path<Uuid>,
    Json(request): Json<BreakRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let created = AvailabilityService::new(&state)
        .add_break(availability_id, request, &user, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(json!({
        "success": true,
        "break": created
    }))))
}

#[axum::debug_handler]
pub async fn update_break(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(break_id): Path<Uuid>,
    Json(request): Json<BreakRequest>,
) -> Result<Json<Value>, AppError> {
    let updated = AvailabilityService::new(&state)
        .update_break(break_id, request, &user, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "break": updated
    })))
}

#[axum::debug_handler]
pub async fn remove_break(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(break_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    AvailabilityService::new(&state)
        .remove_break(break_id, &user, auth.token())
        .await?;

    Ok(Json(json!({ "success": true })))
}
