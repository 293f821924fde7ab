use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use wabiz_core::ApiResponse;
use wabiz_worker::ApiToken;

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::extract::Payload;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub name: String,
}

/// The only response that ever carries the plaintext token.
#[derive(Debug, Serialize)]
pub struct CreatedToken {
    #[serde(flatten)]
    pub token: ApiToken,
    pub plaintext: String,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Vec<ApiToken>> {
    Ok(Json(ApiResponse::ok("Tokens", state.worker.list_api_tokens(&user).await?)))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Payload(req): Payload<CreateTokenRequest>,
) -> ApiResult<CreatedToken> {
    let (token, plaintext) = state.worker.create_api_token(&user, &req.name).await?;
    Ok(Json(ApiResponse::ok("Token created", CreatedToken { token, plaintext })))
}

pub async fn revoke(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.worker.revoke_api_token(&user, &id).await?;
    Ok(Json(ApiResponse::done("Token revoked")))
}
