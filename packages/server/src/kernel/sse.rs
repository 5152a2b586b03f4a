//! Lightweight SSE server for live crawler status.
//!
//! Subscribes to a config's StreamHub channel and forwards events as SSE.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::warn;

use super::stream_hub::StreamHub;

/// Shared state for the SSE server.
#[derive(Clone)]
pub struct SseState {
    pub stream_hub: StreamHub,
}

/// Build the axum router for SSE endpoints.
pub fn router(state: SseState) -> Router {
    Router::new()
        .route("/api/automations/:id/events", get(events_handler))
        .with_state(state)
}

async fn events_handler(
    State(state): State<SseState>,
    Path(config_id): Path<i64>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.stream_hub.subscribe(config_id).await;

    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(data) => Some(Ok::<_, Infallible>(
                Event::default().event(event.event_type()).data(data),
            )),
            Err(e) => {
                warn!(config_id, error = %e, "failed to serialize automation event");
                None
            }
        },
        Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(_)) => {
            Some(Ok(Event::default().event("lagged").data("{}")))
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
