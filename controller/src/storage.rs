use axum::{
    extract::State,
    response::sse::{Event, Sse},
    Json,
};
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tracing::info;

use crate::{auth::AuthenticatedUser, cache::Snapshot, SharedState};

// -----------------------------------------------------------------------------
// Responses
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    pub success: bool,
    pub data: Snapshot,
    /// Oldest data point in `data`, null when nothing has been probed yet.
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

// -----------------------------------------------------------------------------
// Handlers
// -----------------------------------------------------------------------------

/// GET /api/storage
/// Current cache contents; starts the background refresh on first use.
pub async fn snapshot(
    State(state): State<SharedState>,
    _user: AuthenticatedUser,
) -> Json<SnapshotResponse> {
    state.scheduler.ensure_started();

    let (data, last_updated) = state.cache.snapshot_with_oldest();
    Json(SnapshotResponse {
        success: true,
        data,
        last_updated,
    })
}

/// POST /api/storage/refresh
/// Submits a cycle right away and answers without waiting for it. If a cycle
/// is already running the submission is dropped by the scheduler.
pub async fn refresh(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
) -> Json<MessageResponse> {
    info!("manual storage refresh requested by {}", user.name);
    drop(state.scheduler.trigger_now());

    Json(MessageResponse {
        success: true,
        message: "Storage refresh requested".into(),
    })
}

/// GET /api/storage/stream
/// Server-sent events: `initial` right away, then `update` on every change
/// and `heartbeat` on the keep-alive period.
pub async fn stream(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    state.scheduler.ensure_started();

    let subscription = state.hub.subscribe(|| state.cache.snapshot());
    info!(
        "{} opened a storage stream (subscriber {}, {} connected)",
        user.name,
        subscription.id(),
        state.hub.subscriber_count()
    );

    Sse::new(subscription.map(|event| Event::default().json_data(&event)))
}
