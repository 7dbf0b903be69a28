use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/state", get(handlers::get_state))
        .route("/api/stats", get(handlers::get_stats))
        .route("/api/timer", get(handlers::get_timer))
        .route("/api/onboarding", post(handlers::complete_onboarding))
        .route("/api/settings", put(handlers::update_settings))
        .route("/api/cigarettes", post(handlers::log_cigarette))
        .route(
            "/api/cravings",
            get(handlers::list_cravings).post(handlers::log_craving),
        )
        .route("/api/cravings/:at", delete(handlers::delete_craving))
        .route("/api/share-code", get(handlers::get_share_code))
        .route("/api/restore", post(handlers::restore))
        .route("/api/reset", post(handlers::reset))
        .with_state(state)
}
