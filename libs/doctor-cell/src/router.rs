use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn doctor_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/professionals/{doctor_id}", get(handlers::get_doctor))
        .route("/availability", get(handlers::get_weekly_availability))
        .route("/availability/{availability_id}", put(handlers::update_availability))
        .route("/availability/{availability_id}/breaks", post(handlers::add_break))
        .route("/breaks/{break_id}", put(handlers::update_break).delete(handlers::remove_break))
        .route("/slots", get(handlers::get_available_slots))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
