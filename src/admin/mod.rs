//! Module administration routes.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/modules/{name}/version", get(get_version))
        .route("/modules/{name}/{api_id}/start", post(start_traces))
        .route("/modules/{name}/{api_id}/stop", post(stop_traces));

    let router = if state.api_key.is_some() {
        router.route_layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
    } else {
        router
    };

    router.with_state(state)
}
