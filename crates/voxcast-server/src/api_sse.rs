//! SSE stream of broadcast events for dashboards.

use crate::AppState;
use axum::{
    extract::{Extension, Query},
    response::{sse::Event, Sse},
};
use futures_util::Stream;
use serde::Deserialize;
use std::{convert::Infallible, sync::Arc};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

#[derive(Debug, Deserialize)]
pub struct EventStreamParams {
    /// Restrict the stream to one room, e.g. `broadcast:{id}`. Absent
    /// means every room, including the global one.
    pub room: Option<String>,
}

/// Handler for `GET /events/broadcasts`.
///
/// Streams room-scoped campaign and call updates. Delivery is best-effort:
/// a lagging subscriber silently loses events.
pub async fn events_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<EventStreamParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.publisher.subscribe();
    let stream = BroadcastStream::new(rx);
    let room_filter = params.room;

    let mapped_stream = stream.filter_map(move |result| {
        match result {
            Ok(envelope) => {
                if let Some(ref room) = room_filter {
                    if &envelope.room != room {
                        return None;
                    }
                }
                match serde_json::to_string(&envelope) {
                    Ok(data) => Some(Ok(Event::default().data(data))),
                    Err(e) => {
                        tracing::error!("failed to serialize broadcast event: {}", e);
                        None
                    }
                }
            }
            Err(broadcast_error) => {
                tracing::warn!(
                    error = %broadcast_error,
                    "broadcast SSE stream lagged or closed; events were dropped for this subscriber"
                );
                None
            }
        }
    });

    Sse::new(mapped_stream).keep_alive(axum::response::sse::KeepAlive::default())
}
