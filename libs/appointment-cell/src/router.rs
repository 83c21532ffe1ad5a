// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    // All appointment operations require authentication
    Router::new()
        .route("/appointments", get(handlers::list_my_appointments).post(handlers::book_appointment))
        .route("/appointments/{appointment_id}", get(handlers::get_appointment).delete(handlers::cancel_appointment))
        .route("/doctor/appointments", get(handlers::list_doctor_appointments))
        .route("/doctor/appointments/{appointment_id}", patch(handlers::update_doctor_appointment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
