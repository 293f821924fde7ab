use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use wabiz_core::signature::verify_hmac_sha256_hex;
use wabiz_core::webhook::parse_webhook;
use wabiz_core::ApiResponse;
use wabiz_worker::WorkerError;

use crate::error::ApiError;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

#[derive(Debug, Deserialize)]
pub struct Handshake {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Subscription handshake: echo the challenge when the token matches.
pub async fn verify(State(state): State<AppState>, Query(hs): Query<Handshake>) -> Response {
    let expected = state.webhook.verify_token.as_deref();
    let accepted = hs.mode.as_deref() == Some("subscribe")
        && expected.is_some()
        && hs.verify_token.as_deref() == expected;

    match (accepted, hs.challenge) {
        (true, Some(challenge)) => {
            tracing::info!("Webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        }
        _ => {
            tracing::warn!(mode = ?hs.mode, "Webhook verification rejected");
            ApiError::Forbidden("Webhook verification failed").into_response()
        }
    }
}

/// Handles a delivery before answering. A store failure is reported as a 500
/// so the provider delivers the batch again.
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    match state.webhook.app_secret.as_deref() {
        Some(secret) => {
            let signature = headers
                .get(SIGNATURE_HEADER)
                .and_then(|v| v.to_str().ok())
                .ok_or(WorkerError::InvalidSignature)?;
            if !verify_hmac_sha256_hex(secret, signature, &body) {
                tracing::warn!("Webhook signature mismatch");
                return Err(WorkerError::InvalidSignature.into());
            }
        }
        None => tracing::warn!("No app secret configured, webhook signature not checked"),
    }

    let events = parse_webhook(&body).map_err(WorkerError::from)?;
    tracing::debug!(count = events.len(), "Webhook delivery received");

    state.worker.process_webhook(events).await?;

    Ok(Json(ApiResponse::done("EVENT_RECEIVED")))
}
