// libs/appointment-cell/src/services/booking.rs
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;
use std::sync::Arc;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient, SupabaseError};
use shared_models::auth::User;
use doctor_cell::models::{day_of_week, DoctorError};
use doctor_cell::services::{
    availability::AvailabilityService,
    doctor::DoctorService,
    slots::is_on_schedule,
};

use crate::models::{
    ActorRole, Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest,
    UpdateAppointmentRequest, APPOINTMENT_DURATION_MINUTES,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;

fn database_error(err: anyhow::Error) -> AppointmentError {
    AppointmentError::DatabaseError(err.to_string())
}

fn from_doctor_error(err: DoctorError) -> AppointmentError {
    match err {
        DoctorError::NotFound => AppointmentError::DoctorNotFound,
        DoctorError::ValidationError(msg) => AppointmentError::ValidationError(msg),
        other => AppointmentError::DatabaseError(other.to_string()),
    }
}

fn parse_appointments(rows: Vec<Value>) -> Result<Vec<Appointment>, AppointmentError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Appointment>, _>>()
        .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
}

/// Field-level checks that need no lookups.
pub fn validate_booking_request(
    request: &BookAppointmentRequest,
    now: DateTime<Utc>,
) -> Result<(), AppointmentError> {
    if request.reason.trim().is_empty() {
        return Err(AppointmentError::ValidationError("A reason for the visit is required".to_string()));
    }

    if request.date < now {
        return Err(AppointmentError::ValidationError("Cannot book an appointment in the past".to_string()));
    }

    Ok(())
}

/// The role `actor` plays on `appointment`, if any. Admins act as the professional.
pub fn actor_role_for(appointment: &Appointment, actor: &User) -> Option<ActorRole> {
    if actor.is_admin() || actor.id == appointment.doctor_id.to_string() {
        Some(ActorRole::Professional)
    } else if actor.id == appointment.patient_id.to_string() {
        Some(ActorRole::Patient)
    } else {
        None
    }
}

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    doctor_service: DoctorService,
    availability_service: AvailabilityService,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&supabase)),
            lifecycle_service: AppointmentLifecycleService::new(),
            doctor_service: DoctorService::new(config),
            availability_service: AvailabilityService::new(config),
            supabase,
        }
    }

    /// Books a fixed-length appointment for `patient_id`.
    ///
    /// The conflict check here is a fast path. The insert itself is guarded by
    /// the exclusion constraint on `appointments`, so a booking that races past
    /// the check still comes back as `ConflictDetected`.
    pub async fn book_appointment(
        &self,
        patient_id: Uuid,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        info!("Booking appointment for patient {} with doctor {} at {}",
              patient_id, request.doctor_id, request.date);

        validate_booking_request(&request, Utc::now())?;

        self.verify_patient_exists(patient_id, auth_token).await?;
        self.doctor_service
            .get_doctor(request.doctor_id, auth_token)
            .await
            .map_err(from_doctor_error)?;

        self.verify_on_schedule(request.doctor_id, request.date, auth_token).await?;

        let end_time = request.date + Duration::minutes(APPOINTMENT_DURATION_MINUTES as i64);
        let conflict_check = self.conflict_service.check_conflicts(
            request.doctor_id,
            request.date,
            end_time,
            None,
            auth_token,
        ).await?;

        if conflict_check.has_conflict {
            return Err(AppointmentError::ConflictDetected);
        }

        let appointment = self.create_appointment_record(patient_id, &request, auth_token).await?;

        info!("Appointment {} booked with doctor {}", appointment.id, appointment.doctor_id);
        Ok(appointment)
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(database_error)?;

        parse_appointments(result)?
            .into_iter()
            .next()
            .ok_or(AppointmentError::NotFound)
    }

    /// One appointment, visible only to its patient, its professional or an admin.
    pub async fn get_appointment_for(
        &self,
        appointment_id: Uuid,
        actor: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        if actor_role_for(&appointment, actor).is_none() {
            warn!("User {} denied access to appointment {}", actor.id, appointment_id);
            return Err(AppointmentError::Unauthorized);
        }
        Ok(appointment)
    }

    /// Soft cancel. The slot becomes bookable again once the status is
    /// `cancelled`.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        actor: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Cancelling appointment: {}", appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;
        let role = actor_role_for(&current, actor).ok_or_else(|| {
            warn!("User {} attempted to cancel appointment {}", actor.id, appointment_id);
            AppointmentError::Unauthorized
        })?;

        self.lifecycle_service.validate_status_transition(
            current.status,
            AppointmentStatus::Cancelled,
            role,
        )?;

        let cancelled = self.update_appointment_record(
            appointment_id,
            json!({ "status": AppointmentStatus::Cancelled, "updated_at": Utc::now() }),
            auth_token,
        ).await?;

        info!("Appointment {} cancelled by {:?} {}", appointment_id, role, actor.id);
        Ok(cancelled)
    }

    /// Status change and clinical notes, by the owning professional.
    pub async fn update_by_professional(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        actor: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Professional update of appointment: {}", appointment_id);

        if request.is_empty() {
            return Err(AppointmentError::ValidationError("Nothing to update".to_string()));
        }

        let current = self.get_appointment(appointment_id, auth_token).await?;
        if actor_role_for(&current, actor) != Some(ActorRole::Professional) {
            warn!("User {} attempted to update appointment {} as professional", actor.id, appointment_id);
            return Err(AppointmentError::Unauthorized);
        }

        let mut update_data = Map::new();

        if let Some(new_status) = request.status {
            self.lifecycle_service.validate_status_transition(
                current.status,
                new_status,
                ActorRole::Professional,
            )?;
            update_data.insert("status".to_string(), json!(new_status));
        }
        if let Some(diagnosis) = request.diagnosis {
            update_data.insert("diagnosis".to_string(), json!(diagnosis));
        }
        if let Some(treatment) = request.treatment {
            update_data.insert("treatment".to_string(), json!(treatment));
        }
        if let Some(notes) = request.notes {
            update_data.insert("notes".to_string(), json!(notes));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now()));

        let updated = self.update_appointment_record(
            appointment_id,
            Value::Object(update_data),
            auth_token,
        ).await?;

        info!("Appointment {} updated ({} -> {})", appointment_id, current.status, updated.status);
        Ok(updated)
    }

    /// A patient's bookings, newest first.
    pub async fn list_for_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&order=appointment_date.desc",
            patient_id
        );
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(database_error)?;

        parse_appointments(result)
    }

    /// A professional's schedule. With `date`, only that day in start order;
    /// otherwise everything, newest first.
    pub async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        date: Option<NaiveDate>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = match date {
            Some(date) => {
                let start_of_day = date.and_time(NaiveTime::MIN).and_utc();
                let end_of_day = start_of_day + Duration::days(1);
                format!(
                    "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=gte.{}&appointment_date=lt.{}&order=appointment_date.asc",
                    doctor_id,
                    urlencoding::encode(&start_of_day.to_rfc3339()),
                    urlencoding::encode(&end_of_day.to_rfc3339()),
                )
            }
            None => format!(
                "/rest/v1/appointments?doctor_id=eq.{}&order=appointment_date.desc",
                doctor_id
            ),
        };

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(database_error)?;

        parse_appointments(result)
    }

    // Private helper methods

    async fn verify_patient_exists(&self, patient_id: Uuid, auth_token: &str) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/patients?id=eq.{}&select=id", patient_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(database_error)?;

        if result.is_empty() {
            warn!("Booking attempted without a patient profile: {}", patient_id);
            return Err(AppointmentError::PatientNotFound);
        }
        Ok(())
    }

    async fn verify_on_schedule(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let week = self.availability_service
            .get_or_create_weekly_defaults(doctor_id, auth_token)
            .await
            .map_err(from_doctor_error)?;

        let weekday = day_of_week(start.date_naive());
        let availability = week.iter().find(|a| a.day_of_week == weekday);

        if !is_on_schedule(availability, start) {
            warn!("Requested time {} is off schedule for doctor {}", start, doctor_id);
            return Err(AppointmentError::ValidationError(
                "Requested time is not a bookable slot for this professional".to_string(),
            ));
        }
        Ok(())
    }

    async fn create_appointment_record(
        &self,
        patient_id: Uuid,
        request: &BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let now = Utc::now();
        let appointment_data = json!({
            "patient_id": patient_id,
            "doctor_id": request.doctor_id,
            "appointment_date": request.date,
            "duration_minutes": APPOINTMENT_DURATION_MINUTES,
            "status": AppointmentStatus::Scheduled,
            "reason": request.reason.trim(),
            "created_at": now,
            "updated_at": now,
        });

        let result: Result<Vec<Value>, anyhow::Error> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            Some(appointment_data),
            Some(return_representation()),
        ).await;

        let rows = match result {
            Ok(rows) => rows,
            Err(e) if SupabaseError::from_anyhow(&e).is_some_and(SupabaseError::is_conflict) => {
                warn!("Insert rejected by overlap constraint for doctor {} at {}", request.doctor_id, request.date);
                return Err(AppointmentError::ConflictDetected);
            }
            Err(e) => return Err(database_error(e)),
        };

        parse_appointments(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Failed to create appointment".to_string()))
    }

    async fn update_appointment_record(
        &self,
        appointment_id: Uuid,
        update_data: Value,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(update_data),
            Some(return_representation()),
        ).await.map_err(database_error)?;

        parse_appointments(result)?
            .into_iter()
            .next()
            .ok_or(AppointmentError::NotFound)
    }
}
