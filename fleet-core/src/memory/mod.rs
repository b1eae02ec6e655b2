//! Memory and relationship persistence (§3, §4.3).
//!
//! [`MemoryStore`] is the capability trait every backend implements; this
//! crate ships [`InMemoryMemoryStore`] for tests and as a default, and
//! `fleet-store` ships the durable SQLite-backed implementation.

mod item;
mod store;
mod uuid6;

pub use item::{MemoryItem, MemoryKind, Relationship};
pub use store::{InMemoryMemoryStore, MemorySearchHit, MemoryStore};
pub use uuid6::{uuid6, Uuid6};
