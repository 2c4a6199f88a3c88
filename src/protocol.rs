//! Protocol — the typed message contract between canvas clients and the server.
//!
//! ARCHITECTURE
//! ============
//! Every websocket text message is a JSON object `{"event": ..., "data": ...}`.
//! Inbound text is decoded exactly once into `ClientMessage`; handlers match
//! on variants and never reach into raw JSON. Outbound traffic is built as
//! `ServerMessage` and encoded at the connection edge.
//!
//! DESIGN
//! ======
//! - Payload field names are camelCase on the wire.
//! - Point batches decode leniently: malformed points are dropped one by one
//!   so a single bad coordinate never costs the rest of the batch.
//! - Events without a payload (`undo`, `redo`, ...) may omit `data`; any
//!   `data` they do carry is ignored.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize};

use crate::services::ledger::StackSizes;
use crate::services::session::Presence;
use crate::state::{ActionId, ClientId, DisplayAttrs, DrawAction, Point};

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code for errors surfaced to clients.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;
}

// =============================================================================
// INBOUND
// =============================================================================

/// Everything a client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    StrokeStart(NewStroke),
    StrokeUpdate(StrokePoints),
    StrokeEnd(StrokeFinish),
    ShapeDrawn(NewShape),
    TextAdded(NewText),
    CursorMove(Point),
    Undo,
    Redo,
    ClearCanvas,
    CreateRoom(RoomName),
    JoinRoom(RoomName),
    ListRooms,
    Ping,
}

/// Events whose `data`, if any, is ignored.
const PAYLOADLESS_EVENTS: [&str; 5] = ["undo", "redo", "clear-canvas", "list-rooms", "ping"];

impl ClientMessage {
    /// Decode one inbound websocket text message.
    ///
    /// # Errors
    ///
    /// Returns the serde error for unknown events or missing required fields.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let mut value: serde_json::Value = serde_json::from_str(text)?;
        if let Some(envelope) = value.as_object_mut() {
            let payloadless = envelope
                .get("event")
                .and_then(serde_json::Value::as_str)
                .is_some_and(|event| PAYLOADLESS_EVENTS.contains(&event));
            if payloadless {
                envelope.remove("data");
            }
        }
        serde_json::from_value(value)
    }

    #[must_use]
    pub fn event(&self) -> &'static str {
        match self {
            Self::StrokeStart(_) => "stroke-start",
            Self::StrokeUpdate(_) => "stroke-update",
            Self::StrokeEnd(_) => "stroke-end",
            Self::ShapeDrawn(_) => "shape-drawn",
            Self::TextAdded(_) => "text-added",
            Self::CursorMove(_) => "cursor-move",
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::ClearCanvas => "clear-canvas",
            Self::CreateRoom(_) => "create-room",
            Self::JoinRoom(_) => "join-room",
            Self::ListRooms => "list-rooms",
            Self::Ping => "ping",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStroke {
    #[serde(alias = "strokeId")]
    pub action_id: ActionId,
    #[serde(flatten)]
    pub attrs: DisplayAttrs,
    #[serde(default, deserialize_with = "lenient_points")]
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokePoints {
    #[serde(alias = "strokeId")]
    pub action_id: ActionId,
    #[serde(default, deserialize_with = "lenient_points")]
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeFinish {
    #[serde(alias = "strokeId")]
    pub action_id: ActionId,
    #[serde(default)]
    pub total_points: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewShape {
    #[serde(default, alias = "shapeId")]
    pub action_id: Option<ActionId>,
    #[serde(flatten)]
    pub attrs: DisplayAttrs,
    pub start_pos: Point,
    pub end_pos: Point,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewText {
    #[serde(default, alias = "textId")]
    pub action_id: Option<ActionId>,
    #[serde(flatten)]
    pub attrs: DisplayAttrs,
    pub text: String,
    pub pos: Point,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomName {
    #[serde(alias = "roomId")]
    pub room_name: String,
}

/// Keep every well-formed point, drop the rest. A non-array value is an
/// empty batch.
fn lenient_points<'de, D>(deserializer: D) -> Result<Vec<Point>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    let serde_json::Value::Array(items) = raw else {
        return Ok(Vec::new());
    };
    Ok(items.iter().filter_map(Point::from_value).collect())
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// Everything the server sends.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    UserConnected(Welcome),
    UserJoined(Presence),
    UserLeft(UserLeft),
    StrokeStart(StrokeStarted),
    StrokeUpdate(StrokeUpdated),
    StrokeEnd(StrokeEnded),
    ShapeDrawn(DrawAction),
    TextAdded(DrawAction),
    CursorMove(CursorMoved),
    UndoAction(HistoryChange),
    RedoAction(HistoryChange),
    UndoFailed(Failure),
    RedoFailed(Failure),
    UndoRedoState(StackSizes),
    CanvasCleared(Cleared),
    RoomCreated(RoomRef),
    RoomJoined(RoomSnapshot),
    RoomError(RoomErrorBody),
    RoomsUpdated(RoomList),
    Pong(Pong),
}

impl ServerMessage {
    /// Encode for the wire.
    ///
    /// # Errors
    ///
    /// Returns a serde error if a payload cannot be represented as JSON.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    #[must_use]
    pub fn event(&self) -> &'static str {
        match self {
            Self::UserConnected(_) => "user-connected",
            Self::UserJoined(_) => "user-joined",
            Self::UserLeft(_) => "user-left",
            Self::StrokeStart(_) => "stroke-start",
            Self::StrokeUpdate(_) => "stroke-update",
            Self::StrokeEnd(_) => "stroke-end",
            Self::ShapeDrawn(_) => "shape-drawn",
            Self::TextAdded(_) => "text-added",
            Self::CursorMove(_) => "cursor-move",
            Self::UndoAction(_) => "undo-action",
            Self::RedoAction(_) => "redo-action",
            Self::UndoFailed(_) => "undo-failed",
            Self::RedoFailed(_) => "redo-failed",
            Self::UndoRedoState(_) => "undo-redo-state",
            Self::CanvasCleared(_) => "canvas-cleared",
            Self::RoomCreated(_) => "room-created",
            Self::RoomJoined(_) => "room-joined",
            Self::RoomError(_) => "room-error",
            Self::RoomsUpdated(_) => "rooms-updated",
            Self::Pong(_) => "pong",
        }
    }

    /// Cursor traffic is high-volume and skipped by per-message logging.
    #[must_use]
    pub fn is_cursor(&self) -> bool {
        matches!(self, Self::CursorMove(_))
    }

    /// Build a `room-error` from a typed error.
    #[must_use]
    pub fn room_error(err: &(impl ErrorCode + ?Sized)) -> Self {
        Self::RoomError(RoomErrorBody { code: err.error_code(), message: err.to_string() })
    }
}

/// Initial snapshot for a new connection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    pub user_id: ClientId,
    pub name: String,
    pub color: String,
    pub room_id: String,
    pub users: Vec<Presence>,
    pub history: Vec<DrawAction>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeft {
    pub user_id: ClientId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeStarted {
    pub action_id: ActionId,
    pub user_id: ClientId,
    #[serde(flatten)]
    pub attrs: DisplayAttrs,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeUpdated {
    pub action_id: ActionId,
    pub user_id: ClientId,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeEnded {
    pub action_id: ActionId,
    pub user_id: ClientId,
    pub total_points: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorMoved {
    pub user_id: ClientId,
    pub cursor: Point,
}

/// An undo or redo, with the full action so clients can re-render.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryChange {
    pub user_id: ClientId,
    pub action_id: ActionId,
    pub action: DrawAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cleared {
    pub user_id: ClientId,
    pub action_id: ActionId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub room_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: String,
    pub users: Vec<Presence>,
    pub history: Vec<DrawAction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomList {
    pub rooms: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pong {
    pub ts: i64,
}

// =============================================================================
// HELPERS
// =============================================================================

/// Current time as milliseconds since Unix epoch.
pub(crate) fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;
