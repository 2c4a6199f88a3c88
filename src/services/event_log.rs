//! Event log — bounded, append-only room history.
//!
//! DESIGN
//! ======
//! Entries are kept in commit order in a `VecDeque`. Undo and redo never
//! delete data; they flip an entry's `hidden` flag. Once the log grows past
//! its cap the oldest entries are evicted and their ids are handed back to
//! the caller so ledgers can drop references to them.
//!
//! A `clear` entry is recorded for audit, but appending one through
//! `clear` first wipes every earlier entry.

use std::collections::VecDeque;

use crate::state::{ActionId, ActionKind, DrawAction};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogError {
    #[error("duplicate action id: {0}")]
    DuplicateAction(ActionId),
}

#[derive(Debug, Clone)]
struct LogEntry {
    action: DrawAction,
    hidden: bool,
}

/// Outcome of a successful append.
#[derive(Debug, Clone)]
pub struct Appended {
    pub stored: DrawAction,
    /// Ids pushed out of the log by this append, oldest first.
    pub evicted: Vec<ActionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogStats {
    pub total: usize,
    pub visible: usize,
    pub hidden: usize,
}

#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl EventLog {
    /// Create a log holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { entries: VecDeque::new(), capacity: capacity.max(1) }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn contains(&self, action_id: &ActionId) -> bool {
        self.position(action_id).is_some()
    }

    #[cfg(test)]
    pub(crate) fn is_visible(&self, action_id: &ActionId) -> bool {
        self.position(action_id)
            .is_some_and(|i| !self.entries[i].hidden)
    }

    /// Append an action and evict past the cap.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateAction` if an entry with the same id is already stored.
    pub fn append(&mut self, action: DrawAction) -> Result<Appended, LogError> {
        if self.contains(&action.action_id) {
            return Err(LogError::DuplicateAction(action.action_id));
        }
        let stored = action.clone();
        self.entries.push_back(LogEntry { action, hidden: false });

        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            if let Some(id) = self.evict_oldest() {
                evicted.push(id);
            }
        }
        Ok(Appended { stored, evicted })
    }

    /// Drop the oldest entry, returning its id.
    pub fn evict_oldest(&mut self) -> Option<ActionId> {
        self.entries.pop_front().map(|entry| entry.action.action_id)
    }

    /// Hide a visible entry. Returns the action if it was visible before.
    pub fn mark_hidden(&mut self, action_id: &ActionId) -> Option<&DrawAction> {
        self.set_hidden(action_id, true)
    }

    /// Re-show a hidden entry. Returns the action if it was hidden before.
    pub fn mark_visible(&mut self, action_id: &ActionId) -> Option<&DrawAction> {
        self.set_hidden(action_id, false)
    }

    /// Wipe every entry and record the clear itself.
    pub fn clear(&mut self, clear_action: DrawAction) -> DrawAction {
        self.entries.clear();
        let stored = clear_action.clone();
        self.entries.push_back(LogEntry { action: clear_action, hidden: false });
        stored
    }

    /// Visible, drawable history in commit order. Used for snapshots.
    #[must_use]
    pub fn visible_history(&self) -> Vec<DrawAction> {
        self.entries
            .iter()
            .filter(|entry| !entry.hidden && entry.action.kind() != ActionKind::Clear)
            .map(|entry| entry.action.clone())
            .collect()
    }

    #[must_use]
    pub fn stats(&self) -> LogStats {
        let hidden = self.entries.iter().filter(|e| e.hidden).count();
        let visible = self
            .entries
            .iter()
            .filter(|e| !e.hidden && e.action.kind() != ActionKind::Clear)
            .count();
        LogStats { total: self.entries.len(), visible, hidden }
    }

    fn position(&self, action_id: &ActionId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| &entry.action.action_id == action_id)
    }

    fn set_hidden(&mut self, action_id: &ActionId, hidden: bool) -> Option<&DrawAction> {
        let index = self.position(action_id)?;
        let entry = &mut self.entries[index];
        if entry.hidden == hidden || entry.action.kind() == ActionKind::Clear {
            return None;
        }
        entry.hidden = hidden;
        Some(&entry.action)
    }
}

#[cfg(test)]
#[path = "event_log_test.rs"]
mod tests;
