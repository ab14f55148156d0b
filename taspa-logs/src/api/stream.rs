//! Live log stream (Server-Sent Events)

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::hub::Viewer;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub job_id: Option<i64>,
    pub token: Option<String>,
}

/// Decide room membership from the connect-time query
///
/// Joining a job room needs no credentials.
pub fn admit(state: &AppState, query: &StreamQuery) -> Viewer {
    let authorized = match query.token.as_deref() {
        Some(token) => match state.verifier.validate(token) {
            Ok(claims) => claims.role_set().has_recognized(),
            Err(e) => {
                debug!("Viewer token rejected: {}", e);
                false
            }
        },
        None => false,
    };

    Viewer::new(authorized, query.job_id)
}

/// GET /logs/stream?job_id=<id>&token=<jwt>
pub async fn log_stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let viewer = admit(&state, &query);
    // Subscribe before responding so no event published after connect is missed
    let mut rx = state.hub.subscribe();

    let rooms: Vec<String> = viewer.rooms().iter().map(|r| r.to_string()).collect();
    info!(rooms = ?rooms, viewers = state.hub.viewer_count(), "Log viewer connected");

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !viewer.receives(&event) {
                        continue;
                    }
                    match Event::default().event("log").json_data(&event.payload) {
                        Ok(sse_event) => yield Ok(sse_event),
                        Err(e) => warn!("SSE: Failed to serialize log event: {}", e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE: Viewer lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
