//! Server-Sent Events support

use crate::runtime::SseEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Convert broadcast stream to SSE stream
pub fn sse_stream(
    init_event: SseEvent,
    broadcast_rx: tokio::sync::broadcast::Receiver<SseEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Create stream that starts with init event then broadcasts
    let init = futures::stream::once(async move { Ok(sse_event_to_axum(init_event)) });

    let broadcasts = BroadcastStream::new(broadcast_rx).filter_map(|result| match result {
        Ok(event) => Some(Ok(sse_event_to_axum(event))),
        Err(_) => None, // Lagged clients resync from the next state_change
    });

    Sse::new(init.chain(broadcasts)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn sse_event_to_axum(event: SseEvent) -> Event {
    let (event_type, data) = event_payload(event);
    Event::default().event(event_type).data(data.to_string())
}

fn event_payload(event: SseEvent) -> (&'static str, serde_json::Value) {
    match event {
        SseEvent::Init { snapshot } => (
            "init",
            json!({
                "type": "init",
                "snapshot": snapshot
            }),
        ),
        SseEvent::Turn { turn } => (
            "turn",
            json!({
                "type": "turn",
                "turn": turn
            }),
        ),
        SseEvent::StateChange { state } => (
            "state_change",
            json!({
                "type": "state_change",
                "state": state
            }),
        ),
        SseEvent::ReplyDone => ("reply_done", json!({ "type": "reply_done" })),
        SseEvent::AnalysisDone => ("analysis_done", json!({ "type": "analysis_done" })),
        SseEvent::Error { message } => (
            "error",
            json!({
                "type": "error",
                "message": message
            }),
        ),
    }
}
