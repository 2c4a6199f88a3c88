//! Read-only monitoring endpoints. Not part of the drawing protocol.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::services::room::RoomSummary;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStats {
    pub rooms: usize,
    pub users: usize,
    pub total_events: usize,
    pub visible_events: usize,
    pub hidden_events: usize,
    pub live_strokes: usize,
    pub uptime_secs: u64,
}

/// `GET /api/stats`: process-wide counters.
pub async fn stats(State(state): State<AppState>) -> Json<ServerStats> {
    let hub = state.hub.read().await;
    let mut stats = ServerStats {
        rooms: hub.rooms.len(),
        users: hub.sessions.len(),
        total_events: 0,
        visible_events: 0,
        hidden_events: 0,
        live_strokes: 0,
        uptime_secs: state.started_at.elapsed().as_secs(),
    };
    for room in hub.rooms.rooms() {
        let log = room.log_stats();
        stats.total_events += log.total;
        stats.visible_events += log.visible;
        stats.hidden_events += log.hidden;
        stats.live_strokes += room.live_stroke_count();
    }
    Json(stats)
}

/// `GET /api/rooms`: one summary per room, sorted by name.
pub async fn list_rooms(State(state): State<AppState>) -> Json<Vec<RoomSummary>> {
    let hub = state.hub.read().await;
    Json(hub.rooms.rooms().map(crate::services::room::Room::summary).collect())
}

#[cfg(test)]
#[path = "stats_test.rs"]
mod tests;
