//! Notification feed

use super::{respond, ApiState};
use crate::notify::Notification;
use axum::{
    extract::{Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use serde::Deserialize;
use std::{convert::Infallible, time::Duration};
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    Stream, StreamExt,
};
use tracing::warn;

/// Query parameters for the notification feed
#[derive(Debug, Deserialize)]
pub struct NotificationParams {
    /// Maximum number of notifications, newest first
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// Recent notifications, newest first
pub async fn list_notifications(
    State(state): State<ApiState>,
    Query(params): Query<NotificationParams>,
) -> impl IntoResponse {
    let mut recent = state.app.notifications.recent();
    recent.truncate(params.limit);
    respond(Ok(recent))
}

fn notification_event(notification: &Notification) -> Event {
    match Event::default().event("notification").json_data(notification) {
        Ok(event) => event,
        Err(_) => Event::default().event("notification"),
    }
}

/// Live notifications as server-sent events
pub async fn stream_notifications(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.app.notifications.subscribe();
    let stream = BroadcastStream::new(receiver).filter_map(|item| match item {
        Ok(notification) => Some(Ok(notification_event(&notification))),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!("Notification stream lagged, skipped {} notifications", skipped);
            None
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("hb"),
    )
}
