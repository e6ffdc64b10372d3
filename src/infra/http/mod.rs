mod error;
mod handlers;
mod middleware;
pub mod models;

pub use error::{ApiError, ApiErrorBody, ApiErrorMessage, codes};
pub use middleware::{REQUEST_ID_HEADER, RequestContext};

use axum::{Router, middleware as axum_middleware, routing::get};

use crate::application::groups::GroupService;

#[derive(Clone)]
pub struct ApiState {
    pub groups: GroupService,
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/ping", get(handlers::ping))
        .route("/api/v1/max", get(handlers::max_id))
        .route("/api/v1/get/all", get(handlers::list_recent))
        .route("/api/v1/get/top", get(handlers::list_top))
        .route("/api/v1/get/reg", get(handlers::list_realtime))
        .route("/api/v1/get/similar/{id}", get(handlers::list_similar))
        .route("/api/v1/get/{id}", get(handlers::get_detail))
        .route("/_health/db", get(handlers::db_health))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}
