//! Core domain types shared by every `isync` crate.
//!
//! Identifier validation, the issue record and relationship-edge shapes,
//! fingerprinting, and the batch/work types that flow through the engine.

pub mod batch;
pub mod enums;
pub mod fingerprint;
pub mod identifier;
pub mod record;

pub use batch::{BatchResult, FailureRecord, Stage, WorkResult, WorkTask};
pub use fingerprint::fingerprint;
pub use identifier::{Identifier, IdentifierError};
pub use record::{IssueRecord, RelationshipEdge};
pub use enums::RelationshipKind;
