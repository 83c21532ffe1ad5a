use chrono::NaiveTime;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};
use shared_models::auth::User;
use shared_utils::interval::Interval;

use crate::models::{
    default_weekly_schedule, validate_break_window, Availability, AvailabilityBreak,
    BreakRequest, DoctorError, UpdateAvailabilityRequest,
};

const AVAILABILITY_SELECT: &str = "select=*,availability_breaks(*)";

/// A break row with its parent window embedded.
#[derive(Debug, Deserialize)]
struct BreakWithWindow {
    #[serde(flatten)]
    entry: AvailabilityBreak,
    doctor_availability: Availability,
}

fn database_error(err: anyhow::Error) -> DoctorError {
    DoctorError::DatabaseError(err.to_string())
}

fn parse_rows<T: serde::de::DeserializeOwned>(rows: Vec<Value>, what: &str) -> Result<Vec<T>, DoctorError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| DoctorError::DatabaseError(format!("Failed to parse {}: {}", what, e)))
}

fn time_value(time: NaiveTime) -> Value {
    json!(time.format("%H:%M").to_string())
}

pub struct AvailabilityService {
    supabase: SupabaseClient,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// The professional's seven weekday rows, seeding the default week first
    /// when none exist. Safe to call repeatedly or concurrently: the seed skips
    /// weekdays that already have a row.
    pub async fn get_or_create_weekly_defaults(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Availability>, DoctorError> {
        let week = self.get_weekly_availability(doctor_id, auth_token).await?;
        if !week.is_empty() {
            return Ok(week);
        }

        self.seed_default_week(doctor_id, auth_token).await?;
        self.get_weekly_availability(doctor_id, auth_token).await
    }

    pub async fn get_weekly_availability(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Availability>, DoctorError> {
        debug!("Fetching availability for doctor: {}", doctor_id);

        let path = format!(
            "/rest/v1/doctor_availability?{}&doctor_id=eq.{}&order=day_of_week.asc",
            AVAILABILITY_SELECT, doctor_id
        );
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(database_error)?;

        let mut week: Vec<Availability> = parse_rows(result, "availability")?;
        for day in &mut week {
            day.breaks.sort_by_key(|b| b.start_time);
        }
        Ok(week)
    }

    pub async fn get_availability(
        &self,
        availability_id: Uuid,
        auth_token: &str,
    ) -> Result<Availability, DoctorError> {
        let path = format!("/rest/v1/doctor_availability?{}&id=eq.{}", AVAILABILITY_SELECT, availability_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(database_error)?;

        parse_rows::<Availability>(result, "availability")?
            .into_iter()
            .next()
            .ok_or(DoctorError::AvailabilityNotFound)
    }

    /// Rewrites a weekday window. A window that would leave an existing break
    /// outside it is rejected.
    pub async fn update_availability(
        &self,
        availability_id: Uuid,
        request: UpdateAvailabilityRequest,
        actor: &User,
        auth_token: &str,
    ) -> Result<Availability, DoctorError> {
        debug!("Updating availability: {}", availability_id);

        let current = self.get_availability(availability_id, auth_token).await?;
        ensure_schedule_owner(current.doctor_id, actor)?;

        let start_time = request.start_time.unwrap_or(current.start_time);
        let end_time = request.end_time.unwrap_or(current.end_time);
        let is_active = request.is_active.unwrap_or(current.is_active);
        let window = Interval::new(start_time, end_time);

        if is_active && window.is_empty() {
            return Err(DoctorError::ValidationError("Start time must be before end time".to_string()));
        }

        if let Some(stray) = current.breaks.iter().find(|b| !window.contains(&b.interval())) {
            warn!("Availability {} update would strand break {}", availability_id, stray.id);
            return Err(DoctorError::ValidationError(format!(
                "Break {}-{} falls outside the new working hours; adjust or remove it first",
                stray.start_time.format("%H:%M"),
                stray.end_time.format("%H:%M"),
            )));
        }

        let update_data = json!({
            "start_time": time_value(start_time),
            "end_time": time_value(end_time),
            "is_active": is_active,
        });

        let path = format!("/rest/v1/doctor_availability?id=eq.{}", availability_id);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(update_data),
            Some(return_representation()),
        ).await.map_err(database_error)?;

        let mut updated = parse_rows::<Availability>(result, "availability")?
            .into_iter()
            .next()
            .ok_or(DoctorError::AvailabilityNotFound)?;
        updated.breaks = current.breaks;

        info!("Availability {} updated to {}-{} (active: {})", availability_id, start_time, end_time, is_active);
        Ok(updated)
    }

    pub async fn add_break(
        &self,
        availability_id: Uuid,
        request: BreakRequest,
        actor: &User,
        auth_token: &str,
    ) -> Result<AvailabilityBreak, DoctorError> {
        debug!("Adding break {}-{} to availability {}", request.start_time, request.end_time, availability_id);

        let availability = self.get_availability(availability_id, auth_token).await?;
        ensure_schedule_owner(availability.doctor_id, actor)?;
        availability.validate_break(request.start_time, request.end_time)?;

        let break_data = json!({
            "availability_id": availability_id,
            "start_time": time_value(request.start_time),
            "end_time": time_value(request.end_time),
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/availability_breaks",
            Some(auth_token),
            Some(break_data),
            Some(return_representation()),
        ).await.map_err(database_error)?;

        let created = parse_rows::<AvailabilityBreak>(result, "break")?
            .into_iter()
            .next()
            .ok_or_else(|| DoctorError::DatabaseError("Failed to create break".to_string()))?;

        info!("Break {} created on availability {}", created.id, availability_id);
        Ok(created)
    }

    pub async fn update_break(
        &self,
        break_id: Uuid,
        request: BreakRequest,
        actor: &User,
        auth_token: &str,
    ) -> Result<AvailabilityBreak, DoctorError> {
        debug!("Updating break: {}", break_id);

        let existing = self.get_break_with_window(break_id, auth_token).await?;
        ensure_schedule_owner(existing.doctor_availability.doctor_id, actor)?;
        validate_break_window(
            existing.doctor_availability.window(),
            Interval::new(request.start_time, request.end_time),
        )?;

        let update_data = json!({
            "start_time": time_value(request.start_time),
            "end_time": time_value(request.end_time),
        });

        let path = format!("/rest/v1/availability_breaks?id=eq.{}", break_id);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(update_data),
            Some(return_representation()),
        ).await.map_err(database_error)?;

        parse_rows::<AvailabilityBreak>(result, "break")?
            .into_iter()
            .next()
            .ok_or(DoctorError::BreakNotFound)
    }

    pub async fn remove_break(
        &self,
        break_id: Uuid,
        actor: &User,
        auth_token: &str,
    ) -> Result<(), DoctorError> {
        debug!("Removing break: {}", break_id);

        let existing = self.get_break_with_window(break_id, auth_token).await?;
        ensure_schedule_owner(existing.doctor_availability.doctor_id, actor)?;

        let path = format!("/rest/v1/availability_breaks?id=eq.{}", break_id);
        self.supabase.execute(
            Method::DELETE,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(database_error)?;

        info!("Break {} removed", break_id);
        Ok(())
    }

    // Private helper methods

    async fn get_break_with_window(
        &self,
        break_id: Uuid,
        auth_token: &str,
    ) -> Result<BreakWithWindow, DoctorError> {
        let path = format!(
            "/rest/v1/availability_breaks?select=*,doctor_availability(*)&id=eq.{}",
            break_id
        );
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(database_error)?;

        parse_rows::<BreakWithWindow>(result, "break")?
            .into_iter()
            .next()
            .ok_or(DoctorError::BreakNotFound)
    }

    /// Seeds the default week through the `seed_default_week` database
    /// function. Availability rows and their breaks are written in one
    /// transaction, so a failure leaves nothing behind. Rows that already
    /// exist are skipped and get no breaks.
    async fn seed_default_week(&self, doctor_id: Uuid, auth_token: &str) -> Result<(), DoctorError> {
        let days: Vec<Value> = default_weekly_schedule().iter()
            .map(|day| json!({
                "day_of_week": day.day_of_week,
                "start_time": time_value(day.start_time),
                "end_time": time_value(day.end_time),
                "is_active": day.is_active,
                "break_start": day.lunch_break.map(|lunch| time_value(lunch.start)),
                "break_end": day.lunch_break.map(|lunch| time_value(lunch.end)),
            }))
            .collect();

        let inserted: i64 = self.supabase.request(
            Method::POST,
            "/rest/v1/rpc/seed_default_week",
            Some(auth_token),
            Some(json!({
                "p_doctor_id": doctor_id,
                "p_days": days,
            })),
        ).await.map_err(database_error)?;

        info!("Seeded default weekly availability for doctor {} ({} new rows)", doctor_id, inserted);
        Ok(())
    }
}

/// Only the professional who owns a schedule (or an admin) may change it.
pub fn ensure_schedule_owner(doctor_id: Uuid, actor: &User) -> Result<(), DoctorError> {
    if actor.is_admin() || (actor.is_doctor() && actor.id == doctor_id.to_string()) {
        Ok(())
    } else {
        warn!("User {} attempted to modify schedule of doctor {}", actor.id, doctor_id);
        Err(DoctorError::Unauthorized)
    }
}
