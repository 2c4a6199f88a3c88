//! Undo/redo ledger — per-user action stacks layered over the event log.
//!
//! DESIGN
//! ======
//! Undo is per author: a user can only ever reverse their own most recent
//! surviving action. Each user has an undo stack and a redo stack of action
//! ids. Any new action from a user invalidates that user's redo stack.
//!
//! Stacks may briefly reference ids the log has already evicted. Undo and
//! redo skip such ids instead of failing, and `prune` drops them eagerly
//! after each eviction.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::services::event_log::EventLog;
use crate::state::{ActionId, ClientId, DrawAction};

#[derive(Debug, Default, Clone)]
struct UserStacks {
    undo: Vec<ActionId>,
    redo: Vec<ActionId>,
}

/// Stack depths reported to clients so they can enable/disable controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StackSizes {
    pub undo: usize,
    pub redo: usize,
}

#[derive(Debug, Default)]
pub struct Ledger {
    users: HashMap<ClientId, UserStacks>,
}

impl Ledger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly committed action. Clears the user's redo stack.
    pub fn record_new_action(&mut self, user_id: ClientId, action_id: ActionId) {
        let stacks = self.users.entry(user_id).or_default();
        stacks.undo.push(action_id);
        stacks.redo.clear();
    }

    /// Hide the user's most recent surviving action and move it to redo.
    pub fn undo(&mut self, user_id: ClientId, log: &mut EventLog) -> Option<DrawAction> {
        let stacks = self.users.get_mut(&user_id)?;
        while let Some(action_id) = stacks.undo.pop() {
            if let Some(action) = log.mark_hidden(&action_id) {
                let action = action.clone();
                stacks.redo.push(action_id);
                return Some(action);
            }
            debug!(%user_id, %action_id, "ledger: skipping dangling undo entry");
        }
        None
    }

    /// Re-show the user's most recently undone action and move it back to undo.
    pub fn redo(&mut self, user_id: ClientId, log: &mut EventLog) -> Option<DrawAction> {
        let stacks = self.users.get_mut(&user_id)?;
        while let Some(action_id) = stacks.redo.pop() {
            if let Some(action) = log.mark_visible(&action_id) {
                let action = action.clone();
                stacks.undo.push(action_id);
                return Some(action);
            }
            debug!(%user_id, %action_id, "ledger: skipping dangling redo entry");
        }
        None
    }

    /// Drop every reference to evicted actions.
    pub fn prune(&mut self, evicted: &[ActionId]) {
        if evicted.is_empty() {
            return;
        }
        let gone: HashSet<&ActionId> = evicted.iter().collect();
        for stacks in self.users.values_mut() {
            stacks.undo.retain(|id| !gone.contains(id));
            stacks.redo.retain(|id| !gone.contains(id));
        }
    }

    /// Wipe every user's stacks. Only a canvas clear does this.
    pub fn clear_all(&mut self) {
        self.users.clear();
    }

    /// Discard one user's stacks (the user disconnected).
    pub fn forget_user(&mut self, user_id: ClientId) {
        self.users.remove(&user_id);
    }

    #[must_use]
    pub fn stack_sizes(&self, user_id: ClientId) -> StackSizes {
        self.users
            .get(&user_id)
            .map_or_else(StackSizes::default, |s| StackSizes { undo: s.undo.len(), redo: s.redo.len() })
    }

    /// Sum of stack depths across all users.
    #[cfg(test)]
    pub(crate) fn totals(&self) -> StackSizes {
        self.users
            .values()
            .fold(StackSizes::default(), |acc, s| StackSizes { undo: acc.undo + s.undo.len(), redo: acc.redo + s.redo.len() })
    }
}

#[cfg(test)]
#[path = "ledger_test.rs"]
mod tests;
