//! Durable persistence for the fleet runtime.
//!
//! [`SqliteMemoryStore`] implements `fleet_core::memory::MemoryStore` over a
//! single SQLite file (`Arc<Mutex<rusqlite::Connection>>`, blocking calls run
//! through `tokio::task::block_in_place`). [`LaunchStateStore`] persists each
//! agent's one-shot token launch decision as a JSON file written atomically
//! via write-temp-then-rename, so a crash can never cause a double launch.

mod launch_store;
mod sqlite_memory_store;

pub use launch_store::LaunchStateStore;
pub use sqlite_memory_store::SqliteMemoryStore;
