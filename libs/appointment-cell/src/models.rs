// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::fmt;

use shared_utils::interval::Interval;

/// Every booking path books exactly this long.
pub const APPOINTMENT_DURATION_MINUTES: i32 = 30;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: Uuid,
    #[serde(alias = "patient_id")]
    pub patient_id: Uuid,
    #[serde(alias = "doctor_id")]
    pub doctor_id: Uuid,
    #[serde(alias = "appointment_date")]
    pub appointment_date: DateTime<Utc>,
    #[serde(alias = "duration_minutes")]
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub reason: String,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub notes: Option<String>,
    #[serde(alias = "created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "updated_at")]
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn scheduled_end_time(&self) -> DateTime<Utc> {
        self.appointment_date + Duration::minutes(self.duration_minutes as i64)
    }

    pub fn interval(&self) -> Interval<DateTime<Utc>> {
        Interval::new(self.appointment_date, self.scheduled_end_time())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    #[serde(alias = "SCHEDULED")]
    Scheduled,
    #[serde(alias = "CONFIRMED")]
    Confirmed,
    #[serde(alias = "IN_PROGRESS")]
    InProgress,
    #[serde(alias = "COMPLETED")]
    Completed,
    #[serde(alias = "CANCELLED")]
    Cancelled,
}

impl AppointmentStatus {
    /// Whether an appointment in this status occupies its time on the calendar.
    pub fn blocks_slot(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Who is asking for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Patient,
    Professional,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookAppointmentRequest {
    pub doctor_id: Uuid,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub status: Option<AppointmentStatus>,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub notes: Option<String>,
}

impl UpdateAppointmentRequest {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.diagnosis.is_none()
            && self.treatment.is_none()
            && self.notes.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorAppointmentsQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicting_appointments: Vec<Appointment>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Patient profile not found")]
    PatientNotFound,

    #[error("Professional not found")]
    DoctorNotFound,

    #[error("slot no longer available")]
    ConflictDetected,

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Not allowed to access this appointment")]
    Unauthorized,

    #[error("{0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
