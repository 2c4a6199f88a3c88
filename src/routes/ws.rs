//! WebSocket handler — per-connection event loop and message dispatch.
//!
//! DESIGN
//! ======
//! On upgrade, registers a session and enters a `select!` loop:
//! - Incoming client text → decode once into `ClientMessage` → dispatch
//! - Messages queued on this connection's channel → forward to the socket
//!
//! Handler functions are pure business logic. They mutate the locked `Hub`
//! and return `Outcome`s. The dispatch layer owns delivery: reply to sender,
//! broadcast to a room, or announce to everyone.
//!
//! ORDERING
//! ========
//! Each inbound message is handled under the hub write lock, and every
//! resulting message, the sender's own replies included, is enqueued before
//! the lock is released. All clients therefore observe one processing order.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → `user-connected` snapshot to the client, `user-joined` to peers
//! 2. Client sends events → dispatch → handler returns Outcomes
//! 3. Dispatch applies Outcomes (reply / room broadcast / global)
//! 4. Close → purge live strokes → leave room → `user-left` to peers

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::{
    ClientMessage, Cleared, Failure, HistoryChange, NewShape, NewStroke, NewText, Pong, RoomRef, RoomSnapshot,
    ServerMessage, StrokeEnded, StrokeFinish, StrokePoints, StrokeStarted, StrokeUpdated, UserLeft, now_ms,
};
use crate::services::ledger::StackSizes;
use crate::services::room::{ActionError, RoomId};
use crate::services::session;
use crate::state::{ActionPayload, AppState, ClientId, Hub};

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions. The dispatch layer uses this to
/// decide who receives what; handlers never send messages directly.
#[derive(Debug)]
enum Outcome {
    /// Send to the sender only.
    Reply(ServerMessage),
    /// Send to every member of a room, with or without the sender.
    Room { room_id: RoomId, message: ServerMessage, include_sender: bool },
    /// Send to every open connection.
    Everyone(ServerMessage),
}

impl Outcome {
    fn peers(room_id: &RoomId, message: ServerMessage) -> Self {
        Self::Room { room_id: room_id.clone(), message, include_sender: false }
    }

    fn room(room_id: &RoomId, message: ServerMessage) -> Self {
        Self::Room { room_id: room_id.clone(), message, include_sender: true }
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let name = params.get("name").cloned();
    ws.on_upgrade(move |socket| run_ws(socket, state, name))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, name: Option<String>) {
    let client_id = Uuid::new_v4();

    // Per-connection channel; every outbound message passes through it.
    let (client_tx, mut client_rx) = mpsc::channel::<ServerMessage>(state.config.client_channel_capacity);

    {
        let mut hub = state.hub.write().await;
        session::on_connect(&mut hub, client_id, name.as_deref(), client_tx);
    }

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Text(text) => process_inbound_text(&state, client_id, &text).await,
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(message) = client_rx.recv() => {
                if send_message(&mut socket, &message).await.is_err() {
                    break;
                }
            }
        }
    }

    let mut hub = state.hub.write().await;
    session::on_disconnect(&mut hub, client_id);
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Decode and handle one inbound text message. Undecodable input is logged
/// and dropped; the connection stays open.
async fn process_inbound_text(state: &AppState, client_id: ClientId, text: &str) {
    let msg = match ClientMessage::decode(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound message");
            return;
        }
    };

    if matches!(msg, ClientMessage::CursorMove(_) | ClientMessage::StrokeUpdate(_)) {
        debug!(%client_id, event = msg.event(), "ws: recv");
    } else {
        info!(%client_id, event = msg.event(), "ws: recv");
    }

    let mut hub = state.hub.write().await;
    let outcomes = handle_message(&mut hub, client_id, msg);
    apply_outcomes(&hub, client_id, outcomes);
}

fn handle_message(hub: &mut Hub, client_id: ClientId, msg: ClientMessage) -> Vec<Outcome> {
    match msg {
        ClientMessage::StrokeStart(stroke) => handle_stroke_start(hub, client_id, stroke),
        ClientMessage::StrokeUpdate(update) => handle_stroke_update(hub, client_id, update),
        ClientMessage::StrokeEnd(finish) => handle_stroke_end(hub, client_id, &finish),
        ClientMessage::ShapeDrawn(shape) => handle_shape(hub, client_id, shape),
        ClientMessage::TextAdded(text) => handle_text(hub, client_id, text),
        ClientMessage::CursorMove(cursor) => {
            session::on_cursor_move(hub, client_id, cursor);
            Vec::new()
        }
        ClientMessage::Undo => handle_undo(hub, client_id),
        ClientMessage::Redo => handle_redo(hub, client_id),
        ClientMessage::ClearCanvas => handle_clear(hub, client_id),
        ClientMessage::CreateRoom(req) => handle_create_room(hub, &req.room_name),
        ClientMessage::JoinRoom(req) => handle_join_room(hub, client_id, &req.room_name),
        ClientMessage::ListRooms => vec![Outcome::Reply(session::rooms_updated(hub))],
        ClientMessage::Ping => vec![Outcome::Reply(ServerMessage::Pong(Pong { ts: now_ms() }))],
    }
}

fn apply_outcomes(hub: &Hub, client_id: ClientId, outcomes: Vec<Outcome>) {
    for outcome in outcomes {
        match outcome {
            Outcome::Reply(message) => session::send_to(hub, client_id, message),
            Outcome::Room { room_id, message, include_sender } => {
                let exclude = (!include_sender).then_some(client_id);
                session::broadcast(hub, &room_id, &message, exclude);
            }
            Outcome::Everyone(message) => session::broadcast_all(hub, &message),
        }
    }
}

fn ignored(client_id: ClientId, event: &str, err: &ActionError) -> Vec<Outcome> {
    debug!(%client_id, event, error = %err, "ws: ignored");
    Vec::new()
}

fn stack_state(sizes: StackSizes) -> Outcome {
    Outcome::Reply(ServerMessage::UndoRedoState(sizes))
}

// =============================================================================
// STROKE HANDLERS
// =============================================================================

fn handle_stroke_start(hub: &mut Hub, client_id: ClientId, stroke: NewStroke) -> Vec<Outcome> {
    let Some(room) = hub.rooms.room_of_mut(client_id) else {
        return Vec::new();
    };
    let room_id = room.id().clone();
    let action_id = stroke.action_id.clone();
    match room.begin_stroke(stroke.action_id, client_id, stroke.attrs.clone(), stroke.points) {
        Ok(points) => {
            let started = StrokeStarted { action_id, user_id: client_id, attrs: stroke.attrs, points };
            vec![Outcome::peers(&room_id, ServerMessage::StrokeStart(started))]
        }
        Err(e) => ignored(client_id, "stroke-start", &e),
    }
}

fn handle_stroke_update(hub: &mut Hub, client_id: ClientId, update: StrokePoints) -> Vec<Outcome> {
    let Some(room) = hub.rooms.room_of_mut(client_id) else {
        return Vec::new();
    };
    let room_id = room.id().clone();
    match room.append_stroke_points(&update.action_id, client_id, update.points) {
        Ok(points) if points.is_empty() => Vec::new(),
        Ok(points) => {
            let updated = StrokeUpdated { action_id: update.action_id, user_id: client_id, points };
            vec![Outcome::peers(&room_id, ServerMessage::StrokeUpdate(updated))]
        }
        Err(e) => ignored(client_id, "stroke-update", &e),
    }
}

fn handle_stroke_end(hub: &mut Hub, client_id: ClientId, finish: &StrokeFinish) -> Vec<Outcome> {
    let Some(room) = hub.rooms.room_of_mut(client_id) else {
        return Vec::new();
    };
    let room_id = room.id().clone();
    match room.end_stroke(&finish.action_id, client_id) {
        Ok(action) => {
            let total_points = match &action.payload {
                ActionPayload::Stroke { points } => points.len(),
                _ => 0,
            };
            if finish.total_points.is_some_and(|n| usize::try_from(n).ok() != Some(total_points)) {
                debug!(%client_id, action_id = %action.action_id, total_points, "ws: client point count differs");
            }
            let ended = StrokeEnded { action_id: action.action_id, user_id: client_id, total_points };
            vec![
                Outcome::peers(&room_id, ServerMessage::StrokeEnd(ended)),
                stack_state(room.stack_sizes(client_id)),
            ]
        }
        Err(e) => ignored(client_id, "stroke-end", &e),
    }
}

// =============================================================================
// DIRECT COMMIT HANDLERS
// =============================================================================

fn handle_shape(hub: &mut Hub, client_id: ClientId, shape: NewShape) -> Vec<Outcome> {
    let Some(room) = hub.rooms.room_of_mut(client_id) else {
        return Vec::new();
    };
    let room_id = room.id().clone();
    let payload = ActionPayload::Shape { start_pos: shape.start_pos, end_pos: shape.end_pos };
    match room.commit_drawing(client_id, shape.action_id, shape.attrs, payload) {
        Ok(action) => vec![
            Outcome::peers(&room_id, ServerMessage::ShapeDrawn(action)),
            stack_state(room.stack_sizes(client_id)),
        ],
        Err(e) => ignored(client_id, "shape-drawn", &e),
    }
}

fn handle_text(hub: &mut Hub, client_id: ClientId, text: NewText) -> Vec<Outcome> {
    let Some(room) = hub.rooms.room_of_mut(client_id) else {
        return Vec::new();
    };
    let room_id = room.id().clone();
    let payload = ActionPayload::Text { text: text.text, pos: text.pos };
    match room.commit_drawing(client_id, text.action_id, text.attrs, payload) {
        Ok(action) => vec![
            Outcome::peers(&room_id, ServerMessage::TextAdded(action)),
            stack_state(room.stack_sizes(client_id)),
        ],
        Err(e) => ignored(client_id, "text-added", &e),
    }
}

// =============================================================================
// HISTORY HANDLERS
// =============================================================================

fn handle_undo(hub: &mut Hub, client_id: ClientId) -> Vec<Outcome> {
    let Some(room) = hub.rooms.room_of_mut(client_id) else {
        return Vec::new();
    };
    let room_id = room.id().clone();
    let undone = room.undo(client_id);
    let sizes = room.stack_sizes(client_id);
    match undone {
        Some(action) => {
            let change = HistoryChange { user_id: client_id, action_id: action.action_id.clone(), action };
            vec![Outcome::room(&room_id, ServerMessage::UndoAction(change)), stack_state(sizes)]
        }
        None => vec![
            Outcome::Reply(ServerMessage::UndoFailed(Failure { reason: "nothing to undo".into() })),
            stack_state(sizes),
        ],
    }
}

fn handle_redo(hub: &mut Hub, client_id: ClientId) -> Vec<Outcome> {
    let Some(room) = hub.rooms.room_of_mut(client_id) else {
        return Vec::new();
    };
    let room_id = room.id().clone();
    let redone = room.redo(client_id);
    let sizes = room.stack_sizes(client_id);
    match redone {
        Some(action) => {
            let change = HistoryChange { user_id: client_id, action_id: action.action_id.clone(), action };
            vec![Outcome::room(&room_id, ServerMessage::RedoAction(change)), stack_state(sizes)]
        }
        None => vec![
            Outcome::Reply(ServerMessage::RedoFailed(Failure { reason: "nothing to redo".into() })),
            stack_state(sizes),
        ],
    }
}

fn handle_clear(hub: &mut Hub, client_id: ClientId) -> Vec<Outcome> {
    let Some(room) = hub.rooms.room_of_mut(client_id) else {
        return Vec::new();
    };
    let room_id = room.id().clone();
    let cleared = room.clear(client_id);
    info!(%client_id, room = %room_id, "ws: canvas cleared");
    vec![
        Outcome::room(&room_id, ServerMessage::CanvasCleared(Cleared { user_id: client_id, action_id: cleared.action_id })),
        Outcome::room(&room_id, ServerMessage::UndoRedoState(StackSizes::default())),
    ]
}

// =============================================================================
// ROOM HANDLERS
// =============================================================================

fn handle_create_room(hub: &mut Hub, raw_name: &str) -> Vec<Outcome> {
    match hub.rooms.create(raw_name) {
        Ok((room_id, created)) => {
            let mut outcomes = vec![Outcome::Reply(ServerMessage::RoomCreated(RoomRef { room_id }))];
            if created {
                outcomes.push(Outcome::Everyone(session::rooms_updated(hub)));
            }
            outcomes
        }
        Err(e) => vec![Outcome::Reply(ServerMessage::room_error(&e))],
    }
}

fn handle_join_room(hub: &mut Hub, client_id: ClientId, raw_name: &str) -> Vec<Outcome> {
    let room_id = match hub.rooms.validate_name(raw_name) {
        Ok(room_id) => room_id,
        Err(e) => return vec![Outcome::Reply(ServerMessage::room_error(&e))],
    };

    let joined = hub.rooms.join(client_id, &room_id);
    let mut outcomes = Vec::new();

    if !joined.unchanged {
        if let Some(previous) = &joined.previous {
            outcomes.push(Outcome::peers(&previous.room_id, ServerMessage::UserLeft(UserLeft { user_id: client_id })));
        }
        let Some(session) = hub.sessions.get_mut(&client_id) else {
            return outcomes;
        };
        session.presence.room_id.clone_from(&room_id);
        let presence = session.presence.clone();
        outcomes.push(Outcome::peers(&room_id, ServerMessage::UserJoined(presence)));
    }

    let Some(room) = hub.rooms.get(&room_id) else {
        return outcomes;
    };
    let snapshot = RoomSnapshot {
        room_id: room_id.clone(),
        users: session::room_users(hub, &room_id),
        history: room.visible_history(),
    };
    outcomes.push(Outcome::Reply(ServerMessage::RoomJoined(snapshot)));

    if !joined.unchanged {
        outcomes.push(stack_state(room.stack_sizes(client_id)));
    }
    if joined.rooms_changed() {
        outcomes.push(Outcome::Everyone(session::rooms_updated(hub)));
    }
    outcomes
}

// =============================================================================
// TRANSPORT
// =============================================================================

async fn send_message(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), ()> {
    let json = match message.encode() {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, event = message.event(), "ws: failed to encode message");
            return Err(());
        }
    };
    if !message.is_cursor() {
        debug!(event = message.event(), "ws: send");
    }
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
