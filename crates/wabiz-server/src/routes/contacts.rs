use axum::extract::{Query, State};
use axum::{Extension, Json};
use wabiz_core::{ApiResponse, PageRequest};
use wabiz_worker::{Contact, ContactInput};

use super::{Deleted, IdsRequest};
use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::extract::Payload;
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Vec<Contact>> {
    let contacts = state.worker.list_contacts(&user, page).await?;
    Ok(Json(ApiResponse::paged("Contacts", contacts)))
}

pub async fn upsert(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Payload(input): Payload<ContactInput>,
) -> ApiResult<Contact> {
    let contact = state.worker.upsert_contact(&user, &input).await?;
    Ok(Json(ApiResponse::ok("Contact saved", contact)))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Payload(body): Payload<IdsRequest>,
) -> ApiResult<Deleted> {
    let deleted = state.worker.delete_contacts(&user, &body.checked()?).await?;
    Ok(Json(ApiResponse::ok("Contacts deleted", Deleted { deleted })))
}
