use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router, middleware};
use serde::{Deserialize, Serialize};
use wabiz_core::ApiResponse;
use wabiz_worker::WorkerError;

use crate::auth::require_token;
use crate::error::ApiError;
use crate::state::AppState;

mod accounts;
mod chats;
mod contacts;
mod events;
mod media;
mod messages;
mod tokens;
mod wallet;
mod webhook;

pub const API_PREFIX: &str = "/api/v1";

/// Body of the bulk delete endpoints.
#[derive(Debug, Deserialize)]
pub struct IdsRequest {
    pub ids: Vec<String>,
}

impl IdsRequest {
    pub fn checked(self) -> Result<Vec<String>, ApiError> {
        if self.ids.is_empty() {
            return Err(ApiError::BadRequest("ids must not be empty".into()));
        }
        Ok(self.ids)
    }
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: u64,
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/accounts", get(accounts::list).post(accounts::create))
        .route("/accounts/{id}", get(accounts::get))
        .route("/accounts/{id}/default", post(accounts::set_default))
        .route("/accounts/{id}/register", post(accounts::register))
        .route("/accounts/{id}/deregister", post(accounts::deregister))
        .route("/accounts/{id}/subscribe", post(accounts::subscribe))
        .route("/accounts/{id}/unsubscribe", post(accounts::unsubscribe))
        .route("/accounts/{id}/request-code", post(accounts::request_code))
        .route("/accounts/{id}/verify-code", post(accounts::verify_code))
        .route("/accounts/{id}/blocked", post(accounts::block))
        .route("/accounts/{id}/blocked/{number}", delete(accounts::unblock))
        .route("/accounts/{id}/auto-reply", put(accounts::auto_reply))
        .route("/chats", get(chats::list).delete(chats::delete))
        .route("/chats/broadcast", post(chats::create_broadcast))
        .route("/chats/{id}/read", post(chats::mark_read))
        .route("/chats/{id}/favourite", post(chats::favourite))
        .route("/chats/{id}/open", post(chats::open))
        .route("/chats/{id}/close", post(chats::close))
        .route("/chats/{id}/messages", get(chats::messages))
        .route("/messages", delete(messages::delete))
        .route("/messages/text", post(messages::send_text))
        .route("/messages/media", post(messages::send_media))
        .route("/messages/template", post(messages::send_template))
        .route("/messages/broadcast", post(messages::broadcast))
        .route(
            "/media",
            post(media::upload).layer(DefaultBodyLimit::max(media::UPLOAD_BODY_LIMIT)),
        )
        .route("/media/{id}", get(media::lookup))
        .route(
            "/contacts",
            get(contacts::list).post(contacts::upsert).delete(contacts::delete),
        )
        .route("/wallet", get(wallet::balance))
        .route("/wallet/transactions", get(wallet::transactions))
        .route("/wallet/orders", post(wallet::create_order))
        .route("/tokens", get(tokens::list).post(tokens::create))
        .route("/tokens/{id}", delete(tokens::revoke))
        .route("/events", get(events::stream))
        .layer(middleware::from_fn_with_state(state.clone(), require_token));

    let public = Router::new()
        .route("/health", get(health))
        .route("/webhook", get(webhook::verify).post(webhook::receive))
        .route("/payments/callback", post(wallet::payment_callback));

    Router::new()
        .nest(API_PREFIX, protected.merge(public))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.worker.db().ping().await.map_err(WorkerError::from)?;
    Ok(Json(ApiResponse::done("OK")))
}

#[cfg(test)]
pub(crate) mod test_support;
