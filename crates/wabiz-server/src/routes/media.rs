use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use wabiz_core::ApiResponse;
use wabiz_graph::MediaInfo;
use wabiz_worker::MAX_MEDIA_BYTES;

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::extract::Payload;
use crate::state::AppState;

/// Request body limit for uploads: the largest file once base64 encoded, plus
/// room for the other fields.
pub const UPLOAD_BODY_LIMIT: usize = MAX_MEDIA_BYTES.div_ceil(3) * 4 + 64 * 1024;

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    #[serde(default)]
    pub account_id: Option<String>,
    /// File contents, standard base64.
    pub data: String,
    pub mime_type: String,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Uploaded {
    pub media_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct MediaQuery {
    pub account_id: Option<String>,
}

pub async fn upload(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Payload(req): Payload<UploadRequest>,
) -> ApiResult<Uploaded> {
    let bytes = STANDARD
        .decode(req.data.trim())
        .map_err(|e| ApiError::BadRequest(format!("data is not valid base64: {e}")))?;

    let media_id = state
        .worker
        .upload_media(
            &user,
            req.account_id.as_deref(),
            bytes,
            &req.mime_type,
            req.filename.as_deref(),
        )
        .await?;
    Ok(Json(ApiResponse::ok("Media uploaded", Uploaded { media_id })))
}

pub async fn lookup(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
    Query(query): Query<MediaQuery>,
) -> ApiResult<MediaInfo> {
    let info = state
        .worker
        .media_url(&user, query.account_id.as_deref(), &id)
        .await?;
    Ok(Json(ApiResponse::ok("Media", info)))
}
