//! Infrastructure layer - Storage adapters
//!
//! - `memory`: in-process map of encoded payloads
//! - `sqlite`: SQLite adapter (`sqlite` feature)

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemorySnapshotStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSnapshotStore;
