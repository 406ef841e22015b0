//! Server-Sent Events support for the chat stream
//!
//! Every event is an unnamed `data:` line holding a JSON object with a
//! `type` of `thread`, `content`, `end`, or `error`.

use crate::runtime::RunEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::DropGuard;

/// Turn a run's events into an SSE response.
///
/// The stream owns `guard`; when the client goes away the stream is dropped
/// and the run is cancelled with it.
pub fn chat_stream(
    thread_id: String,
    events: mpsc::UnboundedReceiver<RunEvent>,
    guard: DropGuard,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let opening = stream::once(async move { thread_payload(&thread_id) });
    let run = UnboundedReceiverStream::new(events).map(move |event| {
        let _cancel_on_drop = &guard;
        run_event_payload(&event)
    });

    let combined = opening
        .chain(run)
        .map(|payload| Ok(Event::default().data(payload.to_string())));

    Sse::new(combined).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn thread_payload(thread_id: &str) -> Value {
    json!({
        "type": "thread",
        "thread_id": thread_id
    })
}

fn run_event_payload(event: &RunEvent) -> Value {
    match event {
        RunEvent::Fragment { content, .. } => json!({
            "type": "content",
            "content": content
        }),
        RunEvent::Completed { .. } => json!({
            "type": "end"
        }),
        RunEvent::Failed { message } => json!({
            "type": "error",
            "message": message
        }),
    }
}
