use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::state::AppState;

/// The user an API token belongs to, set by [`require_token`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

fn bearer(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn require_token(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer(&request).ok_or(ApiError::Unauthorized)?.to_string();
    let user_id = state
        .worker
        .authenticate(&token)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    tracing::trace!(%user_id, path = %request.uri().path(), "Authenticated");
    request.extensions_mut().insert(CurrentUser(user_id));
    Ok(next.run(request).await)
}
