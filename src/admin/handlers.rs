use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::http::server::AppState;

/// Version reported by every module.
pub const MODULE_VERSION: &str = "1";

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn message(status: StatusCode, message: String) -> Response {
    (status, Json(MessageResponse { message })).into_response()
}

fn unknown_module(name: &str) -> Response {
    message(StatusCode::NOT_FOUND, format!("module '{name}' is not known"))
}

pub async fn get_version(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    if !state.host.has_module(&name) {
        return unknown_module(&name);
    }
    Json(VersionResponse { version: MODULE_VERSION }).into_response()
}

pub async fn start_traces(State(state): State<AppState>, Path((name, api_id)): Path<(String, u32)>) -> Response {
    if !state.host.has_module(&name) {
        return unknown_module(&name);
    }

    match state.host.accessor().enable_traces(&name, api_id).await {
        Ok(()) => {
            tracing::info!(module = %name, api_id, "Traces enabled");
            message(StatusCode::OK, format!("Started traces for API {api_id}"))
        }
        Err(e) => {
            tracing::error!(module = %name, api_id, error = %e, "Failed to enable traces");
            message(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub async fn stop_traces(State(state): State<AppState>, Path((name, api_id)): Path<(String, u32)>) -> Response {
    if !state.host.has_module(&name) {
        return unknown_module(&name);
    }

    match state.host.accessor().disable_traces(&name, api_id).await {
        Ok(()) => {
            tracing::info!(module = %name, api_id, "Traces disabled");
            message(StatusCode::OK, format!("Stopped traces for API {api_id}"))
        }
        Err(e) => {
            tracing::error!(module = %name, api_id, error = %e, "Failed to disable traces");
            message(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
