//! HTTP route handlers for Outpost.

use std::time::Duration;

use axum::{
    Router,
    middleware,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod admin;
mod credits;
mod error;
mod health;
mod missions;

pub use error::ApiError;

/// Upper bound on any single request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/metrics", get(health::metrics))

        // Missions
        .route("/missions", get(missions::list_missions))
        .route("/missions/history", get(missions::history))
        .route("/missions/{id}", get(missions::get_mission))
        .route("/missions/{id}/verify", post(missions::verify_code))

        // Live code widget, embedded on partner sites
        .route(
            "/missions/{id}/totp",
            get(missions::live_code).layer(CorsLayer::permissive()),
        )

        // Credits
        .route("/credits", get(credits::balance))

        // Admin endpoints (token protected)
        .nest("/admin", admin_routes(state.clone()))

        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )

        // Add shared state
        .with_state(state)
}

/// Admin routes (missions, completions, codes, credits, stats)
fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/missions", get(admin::list_missions).post(admin::create_mission))
        .route("/missions/by-key/{key}", get(admin::get_mission_by_key))
        .route(
            "/missions/{id}",
            get(admin::get_mission)
                .put(admin::update_mission)
                .delete(admin::delete_mission),
        )
        .route(
            "/missions/{id}/codes",
            get(admin::list_codes).post(admin::add_code),
        )
        .route("/missions/{id}/completions", get(admin::list_completions))
        .route("/codes/{id}", put(admin::toggle_code).delete(admin::delete_code))
        .route("/credits/adjust", post(admin::adjust_credits))
        .route("/credits/purchase", post(admin::purchase_credits))
        .route("/credits/spend", post(admin::spend_credits))
        .route("/credits/refund", post(admin::refund_credits))
        .route("/stats", get(admin::get_stats))
        .route_layer(middleware::from_fn_with_state(state, admin::require_admin))
}
