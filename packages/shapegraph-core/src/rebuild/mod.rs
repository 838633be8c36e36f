//! Rebuild engine
//!
//! [`Body`] owns a feature history, its identity registry and dependency
//! graph, and the committed solid readers see. Passes are transactional: a
//! pass either commits a fully valid solid or leaves the previous one intact.

pub mod body;
pub mod engine;
pub mod finalize;
pub mod report;
pub mod safe_op;

pub use body::{Body, CommittedSolidReader};
pub use finalize::{Finalizer, ValidityCheck};
pub use report::{BodyStats, RebuildReport};
pub use safe_op::{check_geometry_drift, classify_failure, safe_operation, OperationOutcome};
