//! `GET /api/v1/events` : pulse lifecycle events as server-sent events.
//!
//! Each event's SSE name is the event kind and its data is the JSON event.
//! `?pulse=<slug>` narrows the stream to one pulse.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use perfpulse_core::PulseEvent;
use serde::Deserialize;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};

use super::AppState;

const KEEP_ALIVE_SECS: u64 = 15;

#[derive(Debug, Deserialize)]
pub(super) struct EventsQuery {
    pub pulse: Option<String>,
}

pub(super) async fn stream_events(
    State(state): State<AppState>,
    Query(params): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.events.subscribe()).filter_map(move |item| {
        match item {
            Ok(event) if params.pulse.as_deref().is_none_or(|s| s == event.slug()) => {
                to_sse(&event)
            }
            Ok(_) => None,
            Err(e) => {
                // Lagged subscribers skip the missed events.
                tracing::warn!(error = %e, "event subscriber lagged");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(KEEP_ALIVE_SECS))
            .text("keep-alive"),
    )
}

fn to_sse(event: &PulseEvent) -> Option<Result<Event, Infallible>> {
    match Event::default().event(event.kind()).json_data(event) {
        Ok(sse) => Some(Ok(sse)),
        Err(e) => {
            tracing::error!(error = %e, kind = event.kind(), "failed to encode event");
            None
        }
    }
}
