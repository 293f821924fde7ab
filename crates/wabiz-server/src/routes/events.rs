use std::convert::Infallible;

use axum::Extension;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::auth::CurrentUser;
use crate::state::AppState;

/// Server-sent events of the caller's own topic.
pub async fn stream(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.worker.notifier().subscribe(&user);
    tracing::debug!(user_id = %user, "Push channel opened");

    let events = BroadcastStream::new(receiver).filter_map(move |item| {
        let user = user.clone();
        async move {
            match item {
                Ok(event) => Some(Ok(Event::default()
                    .event(event.name())
                    .data(event.data().to_string()))),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(user_id = %user, skipped, "Push subscriber lagged");
                    None
                }
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
