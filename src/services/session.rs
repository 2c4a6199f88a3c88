//! Session service — connection identity, presence, and outbound fan-out.
//!
//! DESIGN
//! ======
//! Every open websocket has a `Session`: its presence record plus the sender
//! half of its outbound channel. Identity is a fresh v4 UUID per connection;
//! nothing survives a reconnect.
//!
//! All delivery goes through `send_to` / `broadcast`, which enqueue with
//! `try_send` while the caller holds the hub lock. A full or closed channel
//! drops that one message for that one client and never blocks the others.

use rand::Rng;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::protocol::{CursorMoved, RoomList, ServerMessage, UserLeft, Welcome};
use crate::services::room::{Departure, RoomId};
use crate::state::{ClientId, Hub, Point};

/// Longest accepted display name, in characters.
pub const MAX_NAME_LEN: usize = 32;

/// What peers see of a connected user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub id: ClientId,
    pub name: String,
    pub color: String,
    pub cursor: Point,
    pub room_id: RoomId,
}

#[derive(Debug)]
pub struct Session {
    pub presence: Presence,
    pub tx: mpsc::Sender<ServerMessage>,
}

// =============================================================================
// IDENTITY
// =============================================================================

/// Random `#rrggbb` display color.
#[must_use]
pub fn random_color() -> String {
    let rgb: u32 = rand::rng().random_range(0..=0x00FF_FFFF);
    format!("#{rgb:06x}")
}

/// Trimmed, length-capped display name, or `User <id prefix>` when absent.
#[must_use]
pub fn display_name(requested: Option<&str>, client_id: ClientId) -> String {
    let trimmed = requested.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        let simple = client_id.simple().to_string();
        return format!("User {}", &simple[..4]);
    }
    trimmed.chars().take(MAX_NAME_LEN).collect()
}

// =============================================================================
// LIFECYCLE
// =============================================================================

/// Register a new connection, place it in the default room, send it the
/// welcome snapshot, and announce it to the room.
pub fn on_connect(hub: &mut Hub, client_id: ClientId, requested_name: Option<&str>, tx: mpsc::Sender<ServerMessage>) {
    let room_id = hub.rooms.default_room().clone();
    let presence = Presence {
        id: client_id,
        name: display_name(requested_name, client_id),
        color: random_color(),
        cursor: Point::default(),
        room_id: room_id.clone(),
    };
    hub.sessions.insert(client_id, Session { presence: presence.clone(), tx });
    hub.rooms.join(client_id, &room_id);
    info!(%client_id, name = %presence.name, room = %room_id, "session: connected");

    let history = hub
        .rooms
        .get(&room_id)
        .map(crate::services::room::Room::visible_history)
        .unwrap_or_default();
    let welcome = Welcome {
        user_id: client_id,
        name: presence.name.clone(),
        color: presence.color.clone(),
        room_id: room_id.clone(),
        users: room_users(hub, &room_id),
        history,
    };
    send_to(hub, client_id, ServerMessage::UserConnected(welcome));
    broadcast(hub, &room_id, &ServerMessage::UserJoined(presence), Some(client_id));
}

/// Record a cursor position and relay it to the rest of the room.
pub fn on_cursor_move(hub: &mut Hub, client_id: ClientId, cursor: Point) {
    if !cursor.is_valid() {
        return;
    }
    let Some(session) = hub.sessions.get_mut(&client_id) else {
        return;
    };
    session.presence.cursor = cursor;
    let room_id = session.presence.room_id.clone();
    broadcast(hub, &room_id, &ServerMessage::CursorMove(CursorMoved { user_id: client_id, cursor }), Some(client_id));
}

/// Tear down a closed connection: unfinished strokes are discarded, undo
/// history is forgotten, peers are told, and an emptied room is destroyed.
pub fn on_disconnect(hub: &mut Hub, client_id: ClientId) {
    let departed = hub.rooms.leave(client_id, Departure::Disconnect);
    if let Some(departed) = &departed {
        if !departed.purged.is_empty() {
            debug!(%client_id, room = %departed.room_id, strokes = departed.purged.len(), "session: discarded unfinished strokes");
        }
        broadcast(hub, &departed.room_id, &ServerMessage::UserLeft(UserLeft { user_id: client_id }), Some(client_id));
    }
    hub.sessions.remove(&client_id);
    if departed.is_some_and(|d| d.destroyed) {
        broadcast_all(hub, &rooms_updated(hub));
    }
    info!(%client_id, "session: disconnected");
}

// =============================================================================
// QUERIES
// =============================================================================

/// Presence of every member of a room, in join order.
#[must_use]
pub fn room_users(hub: &Hub, room_id: &str) -> Vec<Presence> {
    let Some(room) = hub.rooms.get(room_id) else {
        return Vec::new();
    };
    room.members()
        .iter()
        .filter_map(|id| hub.sessions.get(id))
        .map(|session| session.presence.clone())
        .collect()
}

/// Current room list as a `rooms-updated` message.
#[must_use]
pub fn rooms_updated(hub: &Hub) -> ServerMessage {
    ServerMessage::RoomsUpdated(RoomList { rooms: hub.rooms.list_rooms() })
}

// =============================================================================
// DELIVERY
// =============================================================================

/// Enqueue a message for one connection.
pub fn send_to(hub: &Hub, client_id: ClientId, message: ServerMessage) {
    if let Some(session) = hub.sessions.get(&client_id) {
        deliver(client_id, &session.tx, message);
    }
}

/// Enqueue a message for every member of a room, optionally excluding one.
pub fn broadcast(hub: &Hub, room_id: &str, message: &ServerMessage, exclude: Option<ClientId>) {
    let Some(room) = hub.rooms.get(room_id) else {
        return;
    };
    for client_id in room.members() {
        if exclude == Some(*client_id) {
            continue;
        }
        if let Some(session) = hub.sessions.get(client_id) {
            deliver(*client_id, &session.tx, message.clone());
        }
    }
}

/// Enqueue a message for every open connection.
pub fn broadcast_all(hub: &Hub, message: &ServerMessage) {
    for (client_id, session) in &hub.sessions {
        deliver(*client_id, &session.tx, message.clone());
    }
}

fn deliver(client_id: ClientId, tx: &mpsc::Sender<ServerMessage>, message: ServerMessage) {
    match tx.try_send(message) {
        Ok(()) => {}
        Err(TrySendError::Full(message)) => {
            warn!(%client_id, event = message.event(), "session: outbound channel full, dropping message");
        }
        Err(TrySendError::Closed(message)) => {
            debug!(%client_id, event = message.event(), "session: outbound channel closed");
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
