//! Room service — per-room drawing state and the room registry.
//!
//! DESIGN
//! ======
//! A `Room` owns its event log, undo/redo ledger, live strokes, and member
//! list. Nothing is shared between rooms. All commits go through
//! `Room::commit` so that log append, ledger bookkeeping, and eviction
//! pruning always happen together.
//!
//! The `RoomRegistry` maps names to rooms and each user to exactly one
//! room. Rooms are created on first reference and destroyed when their last
//! member leaves, except the permanent default room.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, info};

use crate::protocol::{ErrorCode, now_ms};
use crate::services::event_log::{EventLog, LogError, LogStats};
use crate::services::ledger::{Ledger, StackSizes};
use crate::services::live_stroke::{LiveStrokes, StrokeError};
use crate::state::{ActionId, ActionPayload, ClientId, DisplayAttrs, DrawAction, Point};

pub type RoomId = String;

// =============================================================================
// ERRORS
// =============================================================================

/// Failures of a drawing operation. Never surfaced to clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Log(#[from] LogError),
    #[error(transparent)]
    Stroke(#[from] StrokeError),
}

/// Room name validation failures, reported to the requester.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("room name is required")]
    EmptyName,
    #[error("room name exceeds {max} characters")]
    NameTooLong { max: usize },
    #[error("room name contains control characters")]
    InvalidName,
}

impl ErrorCode for RoomError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyName => "E_ROOM_NAME_EMPTY",
            Self::NameTooLong { .. } => "E_ROOM_NAME_TOO_LONG",
            Self::InvalidName => "E_ROOM_NAME_INVALID",
        }
    }
}

// =============================================================================
// ROOM
// =============================================================================

/// Monitoring view of one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub users: usize,
    pub history: usize,
    pub live_strokes: usize,
}

#[derive(Debug)]
pub struct Room {
    id: RoomId,
    log: EventLog,
    ledger: Ledger,
    strokes: LiveStrokes,
    /// Members in join order.
    members: Vec<ClientId>,
    last_seq: u64,
}

impl Room {
    #[must_use]
    pub fn new(id: impl Into<RoomId>, max_history: usize) -> Self {
        Self {
            id: id.into(),
            log: EventLog::new(max_history),
            ledger: Ledger::new(),
            strokes: LiveStrokes::new(),
            members: Vec::new(),
            last_seq: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    #[must_use]
    pub fn members(&self) -> &[ClientId] {
        &self.members
    }

    #[must_use]
    pub fn has_member(&self, user_id: ClientId) -> bool {
        self.members.contains(&user_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn add_member(&mut self, user_id: ClientId) {
        if !self.has_member(user_id) {
            self.members.push(user_id);
        }
    }

    fn remove_member(&mut self, user_id: ClientId) {
        self.members.retain(|id| *id != user_id);
    }

    // -------------------------------------------------------------------------
    // Strokes
    // -------------------------------------------------------------------------

    /// Start a live stroke. Ids already committed count as duplicates.
    ///
    /// # Errors
    ///
    /// Returns a duplicate error if the id is live or already in the log.
    pub fn begin_stroke(
        &mut self,
        action_id: ActionId,
        owner: ClientId,
        attrs: DisplayAttrs,
        points: Vec<Point>,
    ) -> Result<Vec<Point>, ActionError> {
        if self.log.contains(&action_id) {
            return Err(LogError::DuplicateAction(action_id).into());
        }
        Ok(self.strokes.begin(action_id, owner, attrs, points)?)
    }

    /// Append points to the caller's own live stroke.
    ///
    /// # Errors
    ///
    /// Returns a stroke error for unknown or foreign strokes.
    pub fn append_stroke_points(
        &mut self,
        action_id: &ActionId,
        user_id: ClientId,
        points: Vec<Point>,
    ) -> Result<Vec<Point>, ActionError> {
        Ok(self.strokes.append_points(action_id, user_id, points)?)
    }

    /// Finish a live stroke and commit it to history.
    ///
    /// # Errors
    ///
    /// Returns a stroke error for unknown or foreign strokes.
    pub fn end_stroke(&mut self, action_id: &ActionId, user_id: ClientId) -> Result<DrawAction, ActionError> {
        let stroke = self.strokes.end(action_id, user_id)?;
        debug!(
            room = %self.id,
            %action_id,
            points = stroke.points.len(),
            elapsed_ms = now_ms() - stroke.started_at,
            "stroke finished"
        );
        let seq = self.next_seq();
        self.commit(DrawAction {
            action_id: stroke.action_id,
            user_id,
            attrs: stroke.attrs,
            payload: ActionPayload::Stroke { points: stroke.points },
            seq,
            ts: now_ms(),
        })
    }

    /// Discard the user's unfinished strokes.
    pub fn purge_strokes(&mut self, user_id: ClientId) -> Vec<ActionId> {
        self.strokes.purge_for_user(user_id)
    }

    #[must_use]
    pub fn live_stroke_count(&self) -> usize {
        self.strokes.len()
    }

    #[cfg(test)]
    pub(crate) fn has_live_stroke(&self, action_id: &ActionId) -> bool {
        self.strokes.contains(action_id)
    }

    // -------------------------------------------------------------------------
    // Direct commits
    // -------------------------------------------------------------------------

    /// Commit a shape or text action, which have no live phase. A missing id
    /// is generated server-side.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateAction` if the id is already used in this room.
    pub fn commit_drawing(
        &mut self,
        user_id: ClientId,
        action_id: Option<ActionId>,
        attrs: DisplayAttrs,
        payload: ActionPayload,
    ) -> Result<DrawAction, ActionError> {
        let action_id = action_id.unwrap_or_else(ActionId::generate);
        if self.strokes.contains(&action_id) {
            return Err(LogError::DuplicateAction(action_id).into());
        }
        let seq = self.next_seq();
        self.commit(DrawAction { action_id, user_id, attrs, payload, seq, ts: now_ms() })
    }

    /// Wipe the canvas: history and every member's undo/redo stacks.
    pub fn clear(&mut self, user_id: ClientId) -> DrawAction {
        let seq = self.next_seq();
        let action = DrawAction {
            action_id: ActionId::generate(),
            user_id,
            attrs: DisplayAttrs::default(),
            payload: ActionPayload::Clear,
            seq,
            ts: now_ms(),
        };
        self.ledger.clear_all();
        self.log.clear(action)
    }

    fn commit(&mut self, action: DrawAction) -> Result<DrawAction, ActionError> {
        let appended = self.log.append(action)?;
        if !appended.evicted.is_empty() {
            debug!(room = %self.id, evicted = appended.evicted.len(), cap = self.log.capacity(), "history cap reached");
        }
        self.ledger
            .record_new_action(appended.stored.user_id, appended.stored.action_id.clone());
        self.ledger.prune(&appended.evicted);
        Ok(appended.stored)
    }

    fn next_seq(&mut self) -> u64 {
        self.last_seq += 1;
        self.last_seq
    }

    // -------------------------------------------------------------------------
    // Undo / redo
    // -------------------------------------------------------------------------

    pub fn undo(&mut self, user_id: ClientId) -> Option<DrawAction> {
        self.ledger.undo(user_id, &mut self.log)
    }

    pub fn redo(&mut self, user_id: ClientId) -> Option<DrawAction> {
        self.ledger.redo(user_id, &mut self.log)
    }

    #[must_use]
    pub fn stack_sizes(&self, user_id: ClientId) -> StackSizes {
        self.ledger.stack_sizes(user_id)
    }

    pub fn forget_user_history(&mut self, user_id: ClientId) {
        self.ledger.forget_user(user_id);
    }

    // -------------------------------------------------------------------------
    // Views
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn visible_history(&self) -> Vec<DrawAction> {
        self.log.visible_history()
    }

    #[must_use]
    pub fn log_stats(&self) -> LogStats {
        self.log.stats()
    }

    #[must_use]
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            users: self.members.len(),
            history: self.log.stats().visible,
            live_strokes: self.strokes.len(),
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Why a user is leaving a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// Moving to another room; undo history in the old room is kept.
    Switch,
    /// Connection closed; nothing of the user survives but committed actions.
    Disconnect,
}

/// What happened to the room a user left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departed {
    pub room_id: RoomId,
    pub purged: Vec<ActionId>,
    pub destroyed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined {
    pub room_id: RoomId,
    pub previous: Option<Departed>,
    pub created: bool,
    /// The user was already in this room; nothing moved.
    pub unchanged: bool,
}

impl Joined {
    /// Whether the set of room names changed.
    #[must_use]
    pub fn rooms_changed(&self) -> bool {
        self.created || self.previous.as_ref().is_some_and(|d| d.destroyed)
    }
}

#[derive(Debug)]
pub struct RoomRegistry {
    rooms: BTreeMap<RoomId, Room>,
    memberships: HashMap<ClientId, RoomId>,
    default_room: RoomId,
    max_history: usize,
    max_name_len: usize,
}

impl RoomRegistry {
    #[must_use]
    pub fn new(default_room: &str, max_history: usize, max_name_len: usize) -> Self {
        let mut rooms = BTreeMap::new();
        rooms.insert(default_room.to_owned(), Room::new(default_room, max_history));
        Self {
            rooms,
            memberships: HashMap::new(),
            default_room: default_room.to_owned(),
            max_history,
            max_name_len,
        }
    }

    #[must_use]
    pub fn default_room(&self) -> &RoomId {
        &self.default_room
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Normalize and check a client-supplied room name.
    ///
    /// # Errors
    ///
    /// Returns `RoomError` for empty, oversized, or control-character names.
    pub fn validate_name(&self, raw: &str) -> Result<RoomId, RoomError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(RoomError::EmptyName);
        }
        if name.chars().count() > self.max_name_len {
            return Err(RoomError::NameTooLong { max: self.max_name_len });
        }
        if name.chars().any(char::is_control) {
            return Err(RoomError::InvalidName);
        }
        Ok(name.to_owned())
    }

    /// Fetch a room, creating it if needed. The flag reports creation.
    pub fn get_or_create(&mut self, room_id: &str) -> (&mut Room, bool) {
        let created = !self.rooms.contains_key(room_id);
        if created {
            info!(room = %room_id, "room created");
        }
        let max_history = self.max_history;
        let room = self
            .rooms
            .entry(room_id.to_owned())
            .or_insert_with(|| Room::new(room_id, max_history));
        (room, created)
    }

    /// Validate a name and make sure the room exists.
    ///
    /// # Errors
    ///
    /// Returns `RoomError` if the name fails validation.
    pub fn create(&mut self, raw_name: &str) -> Result<(RoomId, bool), RoomError> {
        let room_id = self.validate_name(raw_name)?;
        let (_, created) = self.get_or_create(&room_id);
        Ok((room_id, created))
    }

    #[must_use]
    pub fn get(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    #[must_use]
    pub fn room_of(&self, user_id: ClientId) -> Option<&RoomId> {
        self.memberships.get(&user_id)
    }

    /// The room the user is currently in.
    pub fn room_of_mut(&mut self, user_id: ClientId) -> Option<&mut Room> {
        let room_id = self.memberships.get(&user_id)?;
        self.rooms.get_mut(room_id)
    }

    /// Move a user into `room_id`, leaving any prior room first.
    pub fn join(&mut self, user_id: ClientId, room_id: &str) -> Joined {
        if self.room_of(user_id).is_some_and(|current| current == room_id) {
            return Joined { room_id: room_id.to_owned(), previous: None, created: false, unchanged: true };
        }

        let previous = self.leave(user_id, Departure::Switch);
        let (room, created) = self.get_or_create(room_id);
        room.add_member(user_id);
        let members = room.members().len();
        self.memberships.insert(user_id, room_id.to_owned());
        info!(room = %room_id, %user_id, members, "user joined room");

        Joined { room_id: room_id.to_owned(), previous, created, unchanged: false }
    }

    /// Remove a user from their room. Live strokes are purged before the
    /// membership goes away; an emptied non-default room is destroyed.
    /// A disconnect also drops the user's undo/redo stacks in every room.
    pub fn leave(&mut self, user_id: ClientId, departure: Departure) -> Option<Departed> {
        let room_id = self.memberships.remove(&user_id)?;
        if departure == Departure::Disconnect {
            self.forget_user(user_id);
        }
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return Some(Departed { room_id, purged: Vec::new(), destroyed: false });
        };

        let purged = room.purge_strokes(user_id);
        room.remove_member(user_id);
        info!(room = %room_id, %user_id, remaining = room.members().len(), purged = purged.len(), "user left room");

        let destroyed = room.is_empty() && room_id != self.default_room;
        if destroyed {
            self.rooms.remove(&room_id);
            info!(room = %room_id, "room destroyed");
        }
        Some(Departed { room_id, purged, destroyed })
    }

    /// Drop a user's undo/redo stacks in every room, including rooms they
    /// left earlier.
    pub fn forget_user(&mut self, user_id: ClientId) {
        for room in self.rooms.values_mut() {
            room.forget_user_history(user_id);
        }
    }

    /// Room names, sorted.
    #[must_use]
    pub fn list_rooms(&self) -> Vec<RoomId> {
        self.rooms.keys().cloned().collect()
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
