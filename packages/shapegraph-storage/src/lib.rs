//! Document snapshot storage for shapegraph bodies
//!
//! ## Core Principles
//!
//! 1. **Identity, not geometry**: a snapshot carries shape identities,
//!    provenance records and feature statuses; geometry is recomputed by a
//!    rebuild after restore
//! 2. **Immutable revisions**: `(document_id, revision)` is written once
//! 3. **Migrate on load**: legacy status envelopes are upgraded by the codec
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shapegraph_storage::{DocumentSnapshot, SnapshotStore, SqliteSnapshotStore};
//!
//! let store = SqliteSnapshotStore::new("bracket.sqlite")?;
//! store.save_snapshot(&DocumentSnapshot::capture("bracket", 1, &body)).await?;
//!
//! let mut restored = Body::new(config)?;
//! // ... re-add features ...
//! store.latest_snapshot("bracket").await?.apply_to(&mut restored)?;
//! restored.rebuild_all()?;
//! ```

pub mod codec;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use domain::{
    DocumentSnapshot, PersistedStatus, SnapshotStore, SnapshotSummary, DOCUMENT_FORMAT_VERSION,
};
pub use infrastructure::InMemorySnapshotStore;

#[cfg(feature = "sqlite")]
pub use infrastructure::SqliteSnapshotStore;
