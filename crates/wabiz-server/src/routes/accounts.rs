use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use wabiz_core::ApiResponse;
use wabiz_graph::CodeMethod;
use wabiz_worker::{Account, AccountInput, AutoReplyConfig};

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::extract::Payload;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PinRequest {
    pub pin: String,
}

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    #[serde(default)]
    pub method: CodeMethod,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en_US".into()
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct BlockRequest {
    pub number: String,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Vec<Account>> {
    let accounts = state.worker.list_accounts(&user).await?;
    Ok(Json(ApiResponse::ok("Accounts", accounts)))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Payload(input): Payload<AccountInput>,
) -> ApiResult<Account> {
    let account = state.worker.create_account(&user, input).await?;
    tracing::info!(user_id = %user, account_id = %account.id, "Account created");
    Ok(Json(ApiResponse::ok("Account created", account)))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Account> {
    Ok(Json(ApiResponse::ok("Account", state.worker.get_account(&user, &id).await?)))
}

pub async fn set_default(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Account> {
    let account = state.worker.set_default_account(&user, &id).await?;
    Ok(Json(ApiResponse::ok("Default account updated", account)))
}

pub async fn register(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
    Payload(body): Payload<PinRequest>,
) -> ApiResult<Account> {
    let account = state.worker.register_phone(&user, &id, &body.pin).await?;
    Ok(Json(ApiResponse::ok("Phone number registered", account)))
}

pub async fn deregister(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Account> {
    let account = state.worker.deregister_phone(&user, &id).await?;
    Ok(Json(ApiResponse::ok("Phone number deregistered", account)))
}

pub async fn subscribe(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Account> {
    let account = state.worker.subscribe_app(&user, &id).await?;
    Ok(Json(ApiResponse::ok("App subscribed", account)))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Account> {
    let account = state.worker.unsubscribe_app(&user, &id).await?;
    Ok(Json(ApiResponse::ok("App unsubscribed", account)))
}

pub async fn request_code(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
    Payload(body): Payload<CodeRequest>,
) -> ApiResult<()> {
    state
        .worker
        .request_verification_code(&user, &id, body.method, &body.language)
        .await?;
    Ok(Json(ApiResponse::done("Verification code requested")))
}

pub async fn verify_code(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
    Payload(body): Payload<VerifyRequest>,
) -> ApiResult<Account> {
    let account = state.worker.verify_code(&user, &id, &body.code).await?;
    Ok(Json(ApiResponse::ok("Phone number verified", account)))
}

pub async fn block(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
    Payload(body): Payload<BlockRequest>,
) -> ApiResult<Account> {
    let account = state.worker.block_number(&user, &id, &body.number).await?;
    Ok(Json(ApiResponse::ok("Number blocked", account)))
}

pub async fn unblock(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((id, number)): Path<(String, String)>,
) -> ApiResult<Account> {
    let account = state.worker.unblock_number(&user, &id, &number).await?;
    Ok(Json(ApiResponse::ok("Number unblocked", account)))
}

pub async fn auto_reply(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
    Payload(config): Payload<AutoReplyConfig>,
) -> ApiResult<Account> {
    let account = state.worker.set_auto_reply(&user, &id, config).await?;
    Ok(Json(ApiResponse::ok("Auto-reply updated", account)))
}
