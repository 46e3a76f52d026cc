//! Domain types for filtering refs of closed code-review changes.

/// Change status and decoded change metadata.
pub mod change;
/// Ordered hide-ref patterns.
pub mod hide_refs;
/// Identifier types.
pub mod id;
/// Ref name layout and classification.
pub mod refs;

pub use change::{ChangeRecord, ChangeStatus, ChangeStatusParseError};
pub use hide_refs::{HideRefParseError, HideRefPattern, HideRefs};
pub use id::{ChangeId, ChangeIdParseError, ProjectName};
pub use refs::{RefKind, classify};
