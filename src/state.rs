//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the `Hub`: the room registry plus the table of open sessions.
//! Both live behind a single lock so every inbound message is applied, and
//! its outbound messages enqueued, before the next message is looked at.
//!
//! The drawing types shared by the services (`DrawAction`, `Point`, ...)
//! live here as well, mirroring what clients receive on the wire.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::protocol::now_ms;
use crate::services::room::RoomRegistry;
use crate::services::session::Session;

/// Identity of one websocket connection. Never reused across reconnects.
pub type ClientId = Uuid;

/// Maximum accepted length of a client-supplied action id.
pub const MAX_ACTION_ID_LEN: usize = 128;

// =============================================================================
// ACTION ID
// =============================================================================

/// Stable identity of a drawing action within a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionId(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidActionId {
    #[error("action id is empty")]
    Empty,
    #[error("action id exceeds {MAX_ACTION_ID_LEN} characters")]
    TooLong,
}

impl ActionId {
    /// Generate a server-side id: `<unix-ms>-<9 random base36 chars>`.
    #[must_use]
    pub fn generate() -> Self {
        const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut rng = rand::rng();
        let suffix: String = (0..9)
            .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
            .collect();
        Self(format!("{}-{suffix}", now_ms()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ActionId {
    type Error = InvalidActionId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(InvalidActionId::Empty);
        }
        if value.chars().count() > MAX_ACTION_ID_LEN {
            return Err(InvalidActionId::TooLong);
        }
        Ok(Self(value))
    }
}

impl TryFrom<&str> for ActionId {
    type Error = InvalidActionId;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_owned())
    }
}

impl From<ActionId> for String {
    fn from(id: ActionId) -> Self {
        id.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// GEOMETRY
// =============================================================================

/// A 2D canvas coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Extract a point from an untyped JSON value. Anything that is not an
    /// object with finite numeric `x` and `y` yields `None`.
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let x = value.get("x")?.as_f64()?;
        let y = value.get("y")?.as_f64()?;
        let point = Self::new(x, y);
        point.is_valid().then_some(point)
    }
}

// =============================================================================
// DRAW ACTION
// =============================================================================

/// Display attributes carried through untouched. The server only checks
/// whether they are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brush_size: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Stroke,
    Shape,
    Text,
    Clear,
}

/// Kind-specific body of a committed action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ActionPayload {
    Stroke {
        points: Vec<Point>,
    },
    #[serde(rename_all = "camelCase")]
    Shape {
        start_pos: Point,
        end_pos: Point,
    },
    Text {
        text: String,
        pos: Point,
    },
    Clear,
}

impl ActionPayload {
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Stroke { .. } => ActionKind::Stroke,
            Self::Shape { .. } => ActionKind::Shape,
            Self::Text { .. } => ActionKind::Text,
            Self::Clear => ActionKind::Clear,
        }
    }
}

/// The unit of persisted room history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawAction {
    pub action_id: ActionId,
    pub user_id: ClientId,
    #[serde(flatten)]
    pub attrs: DisplayAttrs,
    #[serde(flatten)]
    pub payload: ActionPayload,
    /// Per-room logical order.
    pub seq: u64,
    /// Milliseconds since Unix epoch, informational only.
    pub ts: i64,
}

impl DrawAction {
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        self.payload.kind()
    }
}

// =============================================================================
// HUB
// =============================================================================

/// All mutable collaboration state: rooms and open sessions.
pub struct Hub {
    pub rooms: RoomRegistry,
    /// Open connections: `client_id` -> presence + outbound channel.
    pub sessions: HashMap<ClientId, Session>,
}

impl Hub {
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            rooms: RoomRegistry::new(&config.default_room, config.max_history, config.max_room_name_len),
            sessions: HashMap::new(),
        }
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Copy.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<RwLock<Hub>>,
    pub config: Arc<ServerConfig>,
    pub started_at: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let hub = Hub::new(&config);
        Self { hub: Arc::new(RwLock::new(hub)), config: Arc::new(config), started_at: Instant::now() }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
