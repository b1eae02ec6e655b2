//! Wire types for the fleet event engine.
//!
//! This crate defines the shape of one `Event` (tagged payload, priority,
//! scheduling metadata) and a bounded dispatch history. It has no dependency
//! on the runtime that drives dispatch (`fleet-core`) or on persistence.

pub mod event;
pub mod history;

pub use event::{Event, EventPayload, Priority};
pub use history::EventHistory;
