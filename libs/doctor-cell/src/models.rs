use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};

use shared_utils::interval::Interval;

/// Every bookable slot is exactly this long.
pub const SLOT_MINUTES: i64 = 30;

/// Wall-clock "HH:MM" as stored in availability rows. PostgREST hands `time`
/// columns back as "HH:MM:SS", so both forms are accepted on input.
pub mod time_hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn parse(raw: &str) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(raw, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(raw, FORMAT))
            .ok()
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid time of day '{}', expected HH:MM", raw)))
    }

    pub mod option {
        use chrono::NaiveTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error> {
            match time {
                Some(t) => super::serialize(t, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveTime>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid time of day '{}', expected HH:MM", raw))),
                None => Ok(None),
            }
        }
    }
}

/// 0 = Sunday .. 6 = Saturday.
pub fn day_of_week(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_sunday() as i32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub specialty: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Doctor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityBreak {
    pub id: Uuid,
    #[serde(alias = "availability_id")]
    pub availability_id: Uuid,
    #[serde(with = "time_hhmm", alias = "start_time")]
    pub start_time: NaiveTime,
    #[serde(with = "time_hhmm", alias = "end_time")]
    pub end_time: NaiveTime,
}

impl AvailabilityBreak {
    pub fn interval(&self) -> Interval<NaiveTime> {
        Interval::new(self.start_time, self.end_time)
    }
}

/// One weekday's working window for a professional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub id: Uuid,
    #[serde(alias = "doctor_id")]
    pub doctor_id: Uuid,
    #[serde(alias = "day_of_week")]
    pub day_of_week: i32,
    #[serde(with = "time_hhmm", alias = "start_time")]
    pub start_time: NaiveTime,
    #[serde(with = "time_hhmm", alias = "end_time")]
    pub end_time: NaiveTime,
    #[serde(alias = "is_active")]
    pub is_active: bool,
    #[serde(default, alias = "availability_breaks")]
    pub breaks: Vec<AvailabilityBreak>,
}

impl Availability {
    pub fn window(&self) -> Interval<NaiveTime> {
        Interval::new(self.start_time, self.end_time)
    }

    /// Rejects a break that is inverted or pokes out of the working window.
    pub fn validate_break(&self, start: NaiveTime, end: NaiveTime) -> Result<(), DoctorError> {
        validate_break_window(self.window(), Interval::new(start, end))
    }
}

pub fn validate_break_window(window: Interval<NaiveTime>, candidate: Interval<NaiveTime>) -> Result<(), DoctorError> {
    if candidate.is_empty() {
        return Err(DoctorError::ValidationError(
            "Break start time must be before its end time".to_string(),
        ));
    }

    if !window.contains(&candidate) {
        return Err(DoctorError::ValidationError(format!(
            "Break must lie within working hours {}-{}",
            window.start.format("%H:%M"),
            window.end.format("%H:%M"),
        )));
    }

    Ok(())
}

/// A row of the default weekly schedule used when a professional has none.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultDay {
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_active: bool,
    pub lunch_break: Option<Interval<NaiveTime>>,
}

/// Mon-Fri 09:00-17:00 with a 12:00-13:30 break; Sat/Sun inactive.
pub fn default_weekly_schedule() -> Vec<DefaultDay> {
    let hm = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);

    (0..7)
        .map(|day_of_week| {
            let is_weekday = (1..=5).contains(&day_of_week);
            DefaultDay {
                day_of_week,
                start_time: hm(9, 0),
                end_time: hm(17, 0),
                is_active: is_weekday,
                lunch_break: is_weekday.then(|| Interval::new(hm(12, 0), hm(13, 30))),
            }
        })
        .collect()
}

/// Just enough of an appointment row to block time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookedInterval {
    pub appointment_date: DateTime<Utc>,
    pub duration_minutes: i32,
}

impl BookedInterval {
    pub fn interval(&self) -> Interval<DateTime<Utc>> {
        Interval::new(
            self.appointment_date,
            self.appointment_date + chrono::Duration::minutes(self.duration_minutes as i64),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub available: bool,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAvailabilityRequest {
    #[serde(default, with = "time_hhmm::option")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "time_hhmm::option")]
    pub end_time: Option<NaiveTime>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakRequest {
    #[serde(with = "time_hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "time_hhmm")]
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    pub professional_id: Uuid,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotQuery {
    pub professional_id: Uuid,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyAvailabilityResponse {
    pub professional_id: Uuid,
    pub availability: Vec<Availability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookable_dates: Option<Vec<NaiveDate>>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DoctorError {
    #[error("Professional not found")]
    NotFound,

    #[error("Availability not found")]
    AvailabilityNotFound,

    #[error("Break not found")]
    BreakNotFound,

    #[error("{0}")]
    ValidationError(String),

    #[error("Not allowed to manage this professional's schedule")]
    Unauthorized,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
