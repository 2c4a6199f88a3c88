//! Live stroke tracker — strokes between `stroke-start` and `stroke-end`.
//!
//! DESIGN
//! ======
//! Each in-flight stroke is owned by the connection that started it. Only
//! the owner may append to or finish it; anything else is reported as an
//! error that callers log and otherwise ignore. Points are append-only and
//! leave the tracker exactly once, either by `end` (committed by the room)
//! or by `purge_for_user` (discarded).

use std::collections::HashMap;

use crate::protocol::now_ms;
use crate::state::{ActionId, ClientId, DisplayAttrs, Point};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrokeError {
    #[error("stroke already exists: {0}")]
    Duplicate(ActionId),
    #[error("unknown stroke: {0}")]
    Unknown(ActionId),
    #[error("stroke {0} belongs to another user")]
    NotOwner(ActionId),
}

#[derive(Debug, Clone)]
pub struct LiveStroke {
    pub action_id: ActionId,
    pub owner: ClientId,
    pub attrs: DisplayAttrs,
    pub points: Vec<Point>,
    pub started_at: i64,
}

#[derive(Debug, Default)]
pub struct LiveStrokes {
    strokes: HashMap<ActionId, LiveStroke>,
}

impl LiveStrokes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    #[must_use]
    pub fn contains(&self, action_id: &ActionId) -> bool {
        self.strokes.contains_key(action_id)
    }

    #[cfg(test)]
    pub(crate) fn get(&self, action_id: &ActionId) -> Option<&LiveStroke> {
        self.strokes.get(action_id)
    }

    /// Register a new stroke. Returns the accepted initial points.
    ///
    /// # Errors
    ///
    /// Returns `Duplicate` if a stroke with this id is already in flight.
    pub fn begin(
        &mut self,
        action_id: ActionId,
        owner: ClientId,
        attrs: DisplayAttrs,
        initial_points: Vec<Point>,
    ) -> Result<Vec<Point>, StrokeError> {
        if self.strokes.contains_key(&action_id) {
            return Err(StrokeError::Duplicate(action_id));
        }
        let points: Vec<Point> = initial_points.into_iter().filter(Point::is_valid).collect();
        let accepted = points.clone();
        self.strokes.insert(
            action_id.clone(),
            LiveStroke { action_id, owner, attrs, points, started_at: now_ms() },
        );
        Ok(accepted)
    }

    /// Append a batch to a stroke the caller owns. Invalid points are
    /// dropped; the accepted ones are returned for relay.
    ///
    /// # Errors
    ///
    /// Returns `Unknown` or `NotOwner`; the stroke is left untouched.
    pub fn append_points(
        &mut self,
        action_id: &ActionId,
        user_id: ClientId,
        points: Vec<Point>,
    ) -> Result<Vec<Point>, StrokeError> {
        let stroke = self.owned_mut(action_id, user_id)?;
        let accepted: Vec<Point> = points.into_iter().filter(Point::is_valid).collect();
        stroke.points.extend_from_slice(&accepted);
        Ok(accepted)
    }

    /// Remove a finished stroke so the room can commit it.
    ///
    /// # Errors
    ///
    /// Returns `Unknown` or `NotOwner`; the stroke stays live.
    pub fn end(&mut self, action_id: &ActionId, user_id: ClientId) -> Result<LiveStroke, StrokeError> {
        self.owned_mut(action_id, user_id)?;
        self.strokes
            .remove(action_id)
            .ok_or_else(|| StrokeError::Unknown(action_id.clone()))
    }

    /// Discard every unfinished stroke owned by `user_id`.
    pub fn purge_for_user(&mut self, user_id: ClientId) -> Vec<ActionId> {
        let purged: Vec<ActionId> = self
            .strokes
            .values()
            .filter(|s| s.owner == user_id)
            .map(|s| s.action_id.clone())
            .collect();
        for id in &purged {
            self.strokes.remove(id);
        }
        purged
    }

    fn owned_mut(&mut self, action_id: &ActionId, user_id: ClientId) -> Result<&mut LiveStroke, StrokeError> {
        let stroke = self
            .strokes
            .get_mut(action_id)
            .ok_or_else(|| StrokeError::Unknown(action_id.clone()))?;
        if stroke.owner != user_id {
            return Err(StrokeError::NotOwner(action_id.clone()));
        }
        Ok(stroke)
    }
}

#[cfg(test)]
#[path = "live_stroke_test.rs"]
mod tests;
