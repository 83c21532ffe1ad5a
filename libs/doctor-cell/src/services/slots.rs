use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::interval::{overlaps_any, Interval};

use crate::models::{day_of_week, Availability, AvailableSlot, BookedInterval, DoctorError, SLOT_MINUTES};
use crate::services::availability::AvailabilityService;

/// Free fixed-length slots for one date, in ascending order.
///
/// Candidates step through the working window in `SLOT_MINUTES` increments.
/// Breaks are compared in time-of-day space, bookings in absolute time.
/// Never fails: a window that is missing or unusable yields nothing.
pub fn generate_free_slots(
    availability: Option<&Availability>,
    date: NaiveDate,
    booked: &[Interval<DateTime<Utc>>],
) -> Vec<AvailableSlot> {
    let availability = match availability {
        Some(a) if a.is_active => a,
        _ => return Vec::new(),
    };

    let window = availability.window();
    if window.is_empty() {
        return Vec::new();
    }

    let breaks: Vec<Interval<NaiveTime>> = availability.breaks.iter().map(|b| b.interval()).collect();
    let step = Duration::minutes(SLOT_MINUTES);

    let mut slots = Vec::new();
    let mut cursor = window.start;

    while cursor < window.end {
        let (slot_end, wrapped) = cursor.overflowing_add_signed(step);
        if wrapped != 0 || slot_end > window.end {
            break;
        }

        let candidate = Interval::new(cursor, slot_end);
        if !overlaps_any(&candidate, &breaks) {
            let start = date.and_time(cursor).and_utc();
            let absolute = Interval::new(start, start + step);
            if !overlaps_any(&absolute, booked) {
                slots.push(AvailableSlot {
                    start: absolute.start,
                    end: absolute.end,
                    available: true,
                });
            }
        }

        cursor = slot_end;
    }

    slots
}

/// Dates in `[from, from + horizon_days)` whose weekday has an active window.
pub fn bookable_dates(week: &[Availability], from: NaiveDate, horizon_days: i64) -> Vec<NaiveDate> {
    (0..horizon_days.max(0))
        .filter_map(|offset| from.checked_add_signed(Duration::days(offset)))
        .filter(|date| {
            let day = day_of_week(*date);
            week.iter().any(|a| a.day_of_week == day && a.is_active && !a.window().is_empty())
        })
        .collect()
}

/// True when `start` is exactly one of the slots the window and breaks allow,
/// ignoring existing bookings.
pub fn is_on_schedule(availability: Option<&Availability>, start: DateTime<Utc>) -> bool {
    generate_free_slots(availability, start.date_naive(), &[])
        .iter()
        .any(|slot| slot.start == start)
}

pub struct SlotService {
    supabase: SupabaseClient,
    availability_service: AvailabilityService,
}

impl SlotService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            availability_service: AvailabilityService::new(config),
        }
    }

    /// Free slots for a professional on a date.
    pub async fn get_available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<AvailableSlot>, DoctorError> {
        debug!("Calculating available slots for doctor {} on {}", doctor_id, date);

        let week = self.availability_service
            .get_or_create_weekly_defaults(doctor_id, auth_token)
            .await?;
        let day = day_of_week(date);
        let availability = week.iter().find(|a| a.day_of_week == day);

        let booked: Vec<Interval<DateTime<Utc>>> = self
            .get_booked_intervals(doctor_id, date, auth_token)
            .await?
            .iter()
            .map(BookedInterval::interval)
            .collect();

        let slots = generate_free_slots(availability, date, &booked);
        debug!("Found {} available slots", slots.len());
        Ok(slots)
    }

    /// Non-cancelled appointments starting on `date`.
    pub async fn get_booked_intervals(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<BookedInterval>, DoctorError> {
        let start_of_day = date.and_time(NaiveTime::MIN).and_utc();
        let end_of_day = start_of_day + Duration::days(1);

        let path = format!(
            "/rest/v1/appointments?select=appointment_date,duration_minutes&doctor_id=eq.{}&status=neq.cancelled&appointment_date=gte.{}&appointment_date=lt.{}&order=appointment_date.asc",
            doctor_id,
            urlencoding::encode(&start_of_day.to_rfc3339()),
            urlencoding::encode(&end_of_day.to_rfc3339()),
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<BookedInterval>, _>>()
            .map_err(|e| DoctorError::DatabaseError(format!("Failed to parse appointments: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AvailabilityBreak;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
    }

    fn monday_with_lunch() -> Availability {
        let availability_id = Uuid::new_v4();
        Availability {
            id: availability_id,
            doctor_id: Uuid::new_v4(),
            day_of_week: 1,
            start_time: hm(9, 0),
            end_time: hm(17, 0),
            is_active: true,
            breaks: vec![AvailabilityBreak {
                id: Uuid::new_v4(),
                availability_id,
                start_time: hm(12, 0),
                end_time: hm(13, 30),
            }],
        }
    }

    fn booked(date: NaiveDate, h: u32, m: u32, minutes: i64) -> Interval<DateTime<Utc>> {
        let start = date.and_time(hm(h, m)).and_utc();
        Interval::new(start, start + Duration::minutes(minutes))
    }

    fn start_times(slots: &[AvailableSlot]) -> Vec<NaiveTime> {
        slots.iter().map(|s| s.start.time()).collect()
    }

    #[test]
    fn test_full_day_with_lunch_break() {
        let availability = monday_with_lunch();
        let slots = generate_free_slots(Some(&availability), monday(), &[]);

        assert_eq!(slots.len(), 13);
        let starts = start_times(&slots);
        assert_eq!(starts.first(), Some(&hm(9, 0)));
        assert_eq!(starts[5], hm(11, 30));
        assert_eq!(starts[6], hm(13, 30));
        assert_eq!(starts.last(), Some(&hm(16, 30)));

        let lunch = Interval::new(hm(12, 0), hm(13, 30));
        for slot in &slots {
            assert!(slot.available);
            assert_eq!(slot.end - slot.start, Duration::minutes(SLOT_MINUTES));
            assert!(!Interval::new(slot.start.time(), slot.end.time()).overlaps(&lunch));
        }
    }

    #[test]
    fn test_booked_appointment_removes_its_slot_only() {
        let availability = monday_with_lunch();
        let slots = generate_free_slots(Some(&availability), monday(), &[booked(monday(), 10, 0, 30)]);

        assert_eq!(slots.len(), 12);
        let starts = start_times(&slots);
        assert!(!starts.contains(&hm(10, 0)));
        assert!(starts.contains(&hm(9, 30)));
        assert!(starts.contains(&hm(10, 30)));
    }

    #[test]
    fn test_misaligned_booking_blocks_both_touched_slots() {
        let availability = monday_with_lunch();
        let slots = generate_free_slots(Some(&availability), monday(), &[booked(monday(), 14, 15, 30)]);
        let starts = start_times(&slots);

        assert!(!starts.contains(&hm(14, 0)));
        assert!(!starts.contains(&hm(14, 30)));
        assert_eq!(slots.len(), 11);
    }

    #[test]
    fn test_booking_on_another_day_is_ignored() {
        let availability = monday_with_lunch();
        let tuesday = monday().succ_opt().unwrap();
        let slots = generate_free_slots(Some(&availability), monday(), &[booked(tuesday, 10, 0, 30)]);
        assert_eq!(slots.len(), 13);
    }

    #[test]
    fn test_inactive_missing_or_inverted_window_yields_nothing() {
        let mut availability = monday_with_lunch();
        assert!(generate_free_slots(None, monday(), &[]).is_empty());

        availability.is_active = false;
        assert!(generate_free_slots(Some(&availability), monday(), &[]).is_empty());

        availability.is_active = true;
        availability.start_time = hm(17, 0);
        availability.end_time = hm(9, 0);
        assert!(generate_free_slots(Some(&availability), monday(), &[]).is_empty());

        availability.end_time = hm(17, 0);
        assert!(generate_free_slots(Some(&availability), monday(), &[]).is_empty());
    }

    #[test]
    fn test_partial_trailing_slot_is_dropped() {
        let mut availability = monday_with_lunch();
        availability.breaks.clear();
        availability.end_time = hm(10, 15);

        let slots = generate_free_slots(Some(&availability), monday(), &[]);
        assert_eq!(start_times(&slots), vec![hm(9, 0), hm(9, 30)]);
    }

    #[test]
    fn test_window_ending_at_midnight_does_not_wrap() {
        let mut availability = monday_with_lunch();
        availability.breaks.clear();
        availability.start_time = hm(23, 0);
        availability.end_time = NaiveTime::from_hms_opt(23, 59, 59).unwrap();

        let slots = generate_free_slots(Some(&availability), monday(), &[]);
        assert_eq!(start_times(&slots), vec![hm(23, 0)]);
    }

    #[test]
    fn test_break_at_window_start_is_just_another_interval() {
        let mut availability = monday_with_lunch();
        availability.breaks[0].start_time = hm(9, 0);
        availability.breaks[0].end_time = hm(9, 30);

        let starts = start_times(&generate_free_slots(Some(&availability), monday(), &[]));
        assert_eq!(starts.first(), Some(&hm(9, 30)));
    }

    #[test]
    fn test_emitted_slots_never_overlap_inputs() {
        let availability = monday_with_lunch();
        let bookings = vec![
            booked(monday(), 9, 0, 30),
            booked(monday(), 11, 10, 45),
            booked(monday(), 15, 30, 60),
        ];
        let slots = generate_free_slots(Some(&availability), monday(), &bookings);

        for slot in &slots {
            let absolute = Interval::new(slot.start, slot.end);
            assert!(!overlaps_any(&absolute, &bookings));
            let local = Interval::new(slot.start.time(), slot.end.time());
            assert!(availability.breaks.iter().all(|b| !b.interval().overlaps(&local)));
        }
        assert!(slots.windows(2).all(|pair| pair[0].start < pair[1].start));
    }

    #[test]
    fn test_is_on_schedule() {
        let availability = monday_with_lunch();
        let at = |h, m| monday().and_time(hm(h, m)).and_utc();

        assert!(is_on_schedule(Some(&availability), at(9, 0)));
        assert!(!is_on_schedule(Some(&availability), at(9, 15)));
        assert!(!is_on_schedule(Some(&availability), at(12, 30)));
        assert!(!is_on_schedule(Some(&availability), at(17, 0)));
    }

    #[test]
    fn test_bookable_dates_follow_active_weekdays() {
        let monday_row = monday_with_lunch();
        let mut saturday_row = monday_with_lunch();
        saturday_row.day_of_week = 6;
        saturday_row.is_active = false;

        let dates = bookable_dates(&[monday_row, saturday_row], monday(), 30);
        assert_eq!(dates.len(), 5);
        assert!(dates.iter().all(|d| day_of_week(*d) == 1));
        assert_eq!(dates[0], monday());
    }
}
