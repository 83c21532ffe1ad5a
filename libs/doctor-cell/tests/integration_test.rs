use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doctor_cell::models::*;
use doctor_cell::services::{AvailabilityService, SlotService};
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};

const TOKEN: &str = "test-token";

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 3, 4).unwrap()
}

fn monday_row(availability_id: &str, doctor_id: &str) -> serde_json::Value {
    MockSupabaseResponses::availability_response(
        availability_id,
        doctor_id,
        1,
        "09:00:00",
        "17:00:00",
        true,
        vec![MockSupabaseResponses::break_response(
            &Uuid::new_v4().to_string(), availability_id, "12:00:00", "13:30:00",
        )],
    )
}

// ==============================================================================
// DEFAULT WEEK SEEDING
// ==============================================================================

async fn mount_empty_then_seeded_week(mock_server: &MockServer, doctor_id: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            MockSupabaseResponses::default_week_response(doctor_id)
        ))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_first_access_seeds_default_week() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let doctor = TestUser::doctor("doctor@example.com");
    mount_empty_then_seeded_week(&mock_server, &doctor.id).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/seed_default_week"))
        .and(body_partial_json(json!({ "p_doctor_id": doctor.id })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(7)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let week = AvailabilityService::new(&config)
        .get_or_create_weekly_defaults(Uuid::parse_str(&doctor.id).unwrap(), TOKEN)
        .await
        .unwrap();

    assert_eq!(week.len(), 7);
    assert!(week.iter().filter(|a| a.is_active).all(|a| a.breaks.len() == 1));
}

#[tokio::test]
async fn test_seed_sends_weekday_lunch_breaks() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let doctor = TestUser::doctor("doctor@example.com");
    mount_empty_then_seeded_week(&mock_server, &doctor.id).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/seed_default_week"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(7)))
        .expect(1)
        .mount(&mock_server)
        .await;

    AvailabilityService::new(&config)
        .get_or_create_weekly_defaults(Uuid::parse_str(&doctor.id).unwrap(), TOKEN)
        .await
        .unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    let seed = requests.iter()
        .find(|r| r.url.path() == "/rest/v1/rpc/seed_default_week")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&seed.body).unwrap();
    let days = body["p_days"].as_array().unwrap();

    assert_eq!(days.len(), 7);
    assert_eq!(days[1]["break_start"], "12:00");
    assert_eq!(days[1]["break_end"], "13:30");
    assert_eq!(days[0]["is_active"], false);
    assert!(days[0]["break_start"].is_null());
}

#[tokio::test]
async fn test_seeding_twice_does_not_duplicate_rows() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let doctor = TestUser::doctor("doctor@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            MockSupabaseResponses::default_week_response(&doctor.id)
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(0)))
        .expect(0)
        .mount(&mock_server)
        .await;

    let service = AvailabilityService::new(&config);
    let doctor_id = Uuid::parse_str(&doctor.id).unwrap();

    let first = service.get_or_create_weekly_defaults(doctor_id, TOKEN).await.unwrap();
    let second = service.get_or_create_weekly_defaults(doctor_id, TOKEN).await.unwrap();

    assert_eq!(first.len(), 7);
    assert_eq!(second.len(), 7);
}

#[tokio::test]
async fn test_losing_seed_race_still_returns_week() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let doctor = TestUser::doctor("doctor@example.com");
    mount_empty_then_seeded_week(&mock_server, &doctor.id).await;

    // Every row already existed, so nothing was inserted.
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/seed_default_week"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(0)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let week = AvailabilityService::new(&config)
        .get_or_create_weekly_defaults(Uuid::parse_str(&doctor.id).unwrap(), TOKEN)
        .await
        .unwrap();

    assert_eq!(week.len(), 7);
}

#[tokio::test]
async fn test_failed_seed_is_retried_on_next_access() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let doctor = TestUser::doctor("doctor@example.com");

    // The failed transaction left no rows behind.
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/seed_default_week"))
        .respond_with(ResponseTemplate::new(500).set_body_string("insert into availability_breaks failed"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let service = AvailabilityService::new(&config);
    let doctor_id = Uuid::parse_str(&doctor.id).unwrap();

    let first = service.get_or_create_weekly_defaults(doctor_id, TOKEN).await;
    assert_matches!(first, Err(DoctorError::DatabaseError(_)));

    let second = service.get_or_create_weekly_defaults(doctor_id, TOKEN).await;
    assert_matches!(second, Err(DoctorError::DatabaseError(_)));
}

// ==============================================================================
// BREAKS AND WINDOWS
// ==============================================================================

#[tokio::test]
async fn test_break_before_window_is_rejected() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let doctor = TestUser::doctor("doctor@example.com");
    let availability_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .and(query_param("id", format!("eq.{}", availability_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            monday_row(&availability_id, &doctor.id)
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/availability_breaks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let result = AvailabilityService::new(&config)
        .add_break(
            Uuid::parse_str(&availability_id).unwrap(),
            BreakRequest { start_time: hm(8, 0), end_time: hm(9, 0) },
            &doctor.to_user(),
            TOKEN,
        )
        .await;

    assert_matches!(result, Err(DoctorError::ValidationError(_)));
}

#[tokio::test]
async fn test_owner_adds_break_inside_window() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let doctor = TestUser::doctor("doctor@example.com");
    let availability_id = Uuid::new_v4().to_string();
    let break_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            monday_row(&availability_id, &doctor.id)
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/availability_breaks"))
        .and(body_partial_json(json!({ "start_time": "15:00", "end_time": "15:30" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::break_response(&break_id, &availability_id, "15:00:00", "15:30:00")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let created = AvailabilityService::new(&config)
        .add_break(
            Uuid::parse_str(&availability_id).unwrap(),
            BreakRequest { start_time: hm(15, 0), end_time: hm(15, 30) },
            &doctor.to_user(),
            TOKEN,
        )
        .await
        .unwrap();

    assert_eq!(created.start_time, hm(15, 0));
    assert_eq!(created.end_time, hm(15, 30));
}

#[tokio::test]
async fn test_other_professional_cannot_edit_schedule() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let owner = TestUser::doctor("owner@example.com");
    let intruder = TestUser::doctor("intruder@example.com");
    let availability_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            monday_row(&availability_id, &owner.id)
        ])))
        .mount(&mock_server)
        .await;

    let result = AvailabilityService::new(&config)
        .add_break(
            Uuid::parse_str(&availability_id).unwrap(),
            BreakRequest { start_time: hm(15, 0), end_time: hm(15, 30) },
            &intruder.to_user(),
            TOKEN,
        )
        .await;

    assert_matches!(result, Err(DoctorError::Unauthorized));
}

#[tokio::test]
async fn test_shrinking_window_past_a_break_is_rejected() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let doctor = TestUser::doctor("doctor@example.com");
    let availability_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            monday_row(&availability_id, &doctor.id)
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let request = UpdateAvailabilityRequest {
        end_time: Some(hm(12, 30)),
        ..Default::default()
    };

    let result = AvailabilityService::new(&config)
        .update_availability(Uuid::parse_str(&availability_id).unwrap(), request, &doctor.to_user(), TOKEN)
        .await;

    assert_matches!(result, Err(DoctorError::ValidationError(_)));
}

#[tokio::test]
async fn test_removing_missing_break_is_not_found() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let doctor = TestUser::doctor("doctor@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_breaks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = AvailabilityService::new(&config)
        .remove_break(Uuid::new_v4(), &doctor.to_user(), TOKEN)
        .await;

    assert_matches!(result, Err(DoctorError::BreakNotFound));
}

// ==============================================================================
// SLOTS
// ==============================================================================

#[tokio::test]
async fn test_slots_skip_lunch_and_booked_time() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let doctor = TestUser::doctor("doctor@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            MockSupabaseResponses::default_week_response(&doctor.id)
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "neq.cancelled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "appointment_date": "2030-03-04T10:00:00Z", "duration_minutes": 30 }
        ])))
        .mount(&mock_server)
        .await;

    let slots = SlotService::new(&config)
        .get_available_slots(Uuid::parse_str(&doctor.id).unwrap(), monday(), TOKEN)
        .await
        .unwrap();

    assert_eq!(slots.len(), 12);
    let ten = Utc.with_ymd_and_hms(2030, 3, 4, 10, 0, 0).unwrap();
    assert!(slots.iter().all(|slot| slot.start != ten));
    assert!(slots.iter().all(|slot| slot.available));
    assert!(slots.windows(2).all(|pair| pair[0].start < pair[1].start));
}

#[tokio::test]
async fn test_weekend_has_no_slots() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let doctor = TestUser::doctor("doctor@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            MockSupabaseResponses::default_week_response(&doctor.id)
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let saturday = NaiveDate::from_ymd_opt(2030, 3, 9).unwrap();
    let slots = SlotService::new(&config)
        .get_available_slots(Uuid::parse_str(&doctor.id).unwrap(), saturday, TOKEN)
        .await
        .unwrap();

    assert!(slots.is_empty());
}
