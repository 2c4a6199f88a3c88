//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Services own the drawing state and its rules so route handlers can stay
//! focused on protocol translation. They are synchronous and operate on a
//! `Hub` the caller has already locked.
//!
//! Layering, bottom up: `event_log` and `live_stroke` know nothing of users'
//! stacks; `ledger` sits on the log; `room` composes all three per room;
//! `session` adds presence and delivery on top of the registry.

pub mod event_log;
pub mod ledger;
pub mod live_stroke;
pub mod room;
pub mod session;
