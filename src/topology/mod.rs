//! Canonical topology graph
//!
//! Versioned immutable snapshots, discovery updates and the shared current-snapshot
//! pointer.

pub mod document;
pub mod snapshot;
pub mod store;
pub mod update;

pub use document::*;
pub use snapshot::*;
pub use store::*;
pub use update::*;
