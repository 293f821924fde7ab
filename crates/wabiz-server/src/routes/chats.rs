use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use wabiz_core::{ApiResponse, PageRequest};
use wabiz_worker::{Chat, Message};

use super::{Deleted, IdsRequest};
use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::extract::Payload;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ChatQuery {
    pub account_id: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub numbers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct FavouriteRequest {
    pub favourite: bool,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<ChatQuery>,
) -> ApiResult<Vec<Chat>> {
    let page = PageRequest {
        page: query.page,
        limit: query.limit,
    };
    let chats = state
        .worker
        .list_chats(&user, query.account_id.as_deref(), page)
        .await?;
    Ok(Json(ApiResponse::paged("Chats", chats)))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Payload(body): Payload<IdsRequest>,
) -> ApiResult<Deleted> {
    let deleted = state.worker.delete_chats(&user, &body.checked()?).await?;
    Ok(Json(ApiResponse::ok("Chats deleted", Deleted { deleted })))
}

pub async fn create_broadcast(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Payload(body): Payload<BroadcastRequest>,
) -> ApiResult<Chat> {
    let chat = state
        .worker
        .create_broadcast(&user, body.account_id.as_deref(), body.name.as_deref(), &body.numbers)
        .await?;
    Ok(Json(ApiResponse::ok("Broadcast created", chat)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Chat> {
    Ok(Json(ApiResponse::ok("Chat marked read", state.worker.mark_chat_read(&user, &id).await?)))
}

pub async fn favourite(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
    Payload(body): Payload<FavouriteRequest>,
) -> ApiResult<Chat> {
    let chat = state.worker.set_favourite(&user, &id, body.favourite).await?;
    Ok(Json(ApiResponse::ok("Chat updated", chat)))
}

pub async fn open(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Chat> {
    Ok(Json(ApiResponse::ok("Chat opened", state.worker.open_chat(&user, &id).await?)))
}

pub async fn close(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.worker.close_chat(&user, &id);
    Ok(Json(ApiResponse::done("Chat closed")))
}

pub async fn messages(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Vec<Message>> {
    let messages = state.worker.list_messages(&user, &id, page).await?;
    Ok(Json(ApiResponse::paged("Messages", messages)))
}
