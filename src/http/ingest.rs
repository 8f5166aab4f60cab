//! Telemetry ingestion.
//!
//! Accepts one trace per request and publishes it on the *trace* topic.
//! Publishing blocks while the target shard queue is full, so a slow
//! pipeline slows down the sender rather than dropping traces.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::http::server::AppState;
use crate::telemetry::TraceMessage;

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn ingest_telemetry(State(state): State<AppState>, Json(message): Json<TraceMessage>) -> Response {
    let event_id = message.event.id;
    let api_id = message.event.api_info_id;

    match state.host.publish(message).await {
        Ok(()) => {
            tracing::debug!(event_id, api_id, "Trace accepted");
            (StatusCode::ACCEPTED, Json(IngestResponse { accepted: true, error: None })).into_response()
        }
        Err(e) => {
            tracing::warn!(event_id, api_id, error = %e, "Trace rejected by bus");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(IngestResponse {
                    accepted: false,
                    error: Some(e.to_string()),
                }),
            )
                .into_response()
        }
    }
}
