use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use wabiz_core::template::{TemplateDefinition, TemplateValues};
use wabiz_core::{ApiResponse, MessageKind};
use wabiz_worker::{BroadcastReport, BroadcastTarget, Outgoing, SendOutcome, SendTarget};

use super::{Deleted, IdsRequest};
use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::extract::Payload;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    #[serde(flatten)]
    pub target: SendTarget,
    pub body: String,
    #[serde(default)]
    pub preview_url: bool,
}

#[derive(Debug, Deserialize)]
pub struct MediaRequest {
    #[serde(flatten)]
    pub target: SendTarget,
    pub kind: MessageKind,
    #[serde(default)]
    pub media_id: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateRequest {
    #[serde(flatten)]
    pub target: SendTarget,
    pub template: TemplateDefinition,
    #[serde(default)]
    pub values: TemplateValues,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    #[serde(flatten)]
    pub target: BroadcastTarget,
    pub message: Outgoing,
}

pub async fn send_text(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Payload(req): Payload<TextRequest>,
) -> ApiResult<SendOutcome> {
    let outgoing = Outgoing::Text {
        body: req.body,
        preview_url: req.preview_url,
    };
    let outcome = state.worker.send(&user, req.target, outgoing).await?;
    Ok(Json(ApiResponse::ok("Message sent", outcome)))
}

pub async fn send_media(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Payload(req): Payload<MediaRequest>,
) -> ApiResult<SendOutcome> {
    let outgoing = Outgoing::Media {
        kind: req.kind,
        media_id: req.media_id,
        link: req.link,
        caption: req.caption,
        filename: req.filename,
    };
    let outcome = state.worker.send(&user, req.target, outgoing).await?;
    Ok(Json(ApiResponse::ok("Message sent", outcome)))
}

pub async fn send_template(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Payload(req): Payload<TemplateRequest>,
) -> ApiResult<SendOutcome> {
    let outgoing = Outgoing::Template {
        template: req.template,
        values: req.values,
    };
    let outcome = state.worker.send(&user, req.target, outgoing).await?;
    Ok(Json(ApiResponse::ok("Message sent", outcome)))
}

pub async fn broadcast(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Payload(req): Payload<BroadcastRequest>,
) -> ApiResult<BroadcastReport> {
    let report = state.worker.send_broadcast(&user, req.target, req.message).await?;
    let message = format!("Broadcast sent to {} of {} recipients", report.sent, report.results.len());
    Ok(Json(ApiResponse::ok(message, report)))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Payload(body): Payload<IdsRequest>,
) -> ApiResult<Deleted> {
    let deleted = state.worker.delete_messages(&user, &body.checked()?).await?;
    Ok(Json(ApiResponse::ok("Messages deleted", Deleted { deleted })))
}
