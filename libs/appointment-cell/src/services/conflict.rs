use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use std::sync::Arc;
use shared_database::supabase::SupabaseClient;
use shared_utils::interval::Interval;

use crate::models::{Appointment, AppointmentError, ConflictCheckResponse};

/// How far before a candidate start an existing appointment may begin and
/// still reach into it. Bounds the range query only.
const LOOKBACK_HOURS: i64 = 24;

/// Appointments in `existing` that still hold their time and overlap
/// `candidate`, skipping `exclude`.
pub fn find_conflicts(
    candidate: &Interval<DateTime<Utc>>,
    existing: Vec<Appointment>,
    exclude: Option<Uuid>,
) -> Vec<Appointment> {
    existing
        .into_iter()
        .filter(|appointment| Some(appointment.id) != exclude)
        .filter(|appointment| appointment.status.blocks_slot())
        .filter(|appointment| appointment.interval().overlaps(candidate))
        .collect()
}

pub struct ConflictDetectionService {
    supabase: Arc<SupabaseClient>,
}

impl ConflictDetectionService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Check for appointment conflicts for a doctor over `[start_time, end_time)`.
    pub async fn check_conflicts(
        &self,
        doctor_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        debug!("Checking conflicts for doctor {} from {} to {}", doctor_id, start_time, end_time);

        let existing = self.get_doctor_appointments_in_range(
            doctor_id,
            start_time - Duration::hours(LOOKBACK_HOURS),
            end_time,
            auth_token,
        ).await?;

        let candidate = Interval::new(start_time, end_time);
        let conflicting_appointments = find_conflicts(&candidate, existing, exclude_appointment_id);
        let has_conflict = !conflicting_appointments.is_empty();

        if has_conflict {
            warn!("Conflict detected for doctor {} at {} - {} overlapping appointments",
                  doctor_id, start_time, conflicting_appointments.len());
        }

        Ok(ConflictCheckResponse {
            has_conflict,
            conflicting_appointments,
        })
    }

    /// Non-cancelled appointments starting in `[from, until)`.
    async fn get_doctor_appointments_in_range(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=neq.cancelled&appointment_date=gte.{}&appointment_date=lt.{}&order=appointment_date.asc",
            doctor_id,
            urlencoding::encode(&from.to_rfc3339()),
            urlencoding::encode(&until.to_rfc3339()),
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e)))
    }
}
