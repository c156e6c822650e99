//! Server-Sent Events for job completion.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive};
use axum::response::Sse;
use kwcluster_core::JobEvent;

use super::Owner;
use crate::state::AppState;

/// Stream the caller's terminal job events. The event name is the job status.
pub async fn sse_events(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_bus.subscribe();

    use tokio_stream::StreamExt as _;
    let stream = tokio_stream::wrappers::BroadcastStream::new(rx).filter_map(
        move |result: Result<JobEvent, _>| match result {
            Ok(event) if event.owner == owner => {
                let event_type = event.status.as_str();
                serde_json::to_string(&event)
                    .ok()
                    .map(|json| Ok(Event::default().event(event_type).data(json)))
            }
            // other owners, lagged or closed
            _ => None,
        },
    );

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("keepalive"),
    )
}
