//! Error taxonomy for the topology analysis core
//!
//! Structural failures are returned to the caller immediately and never retried.
//! Unreachable paths and probe timeouts are not errors: they are folded into
//! `PathResult` / `ReachabilityResult`.

use thiserror::Error;

use crate::models::DeviceId;

/// Kind of entity an id failed to resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Device,
    Interface,
    Link,
    Dependency,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Device => "device",
            EntityKind::Interface => "interface",
            EntityKind::Link => "link",
            EntityKind::Dependency => "dependency",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyError {
    /// An id is absent from the snapshot the query runs against.
    #[error("unknown {kind}: {id}")]
    UnknownEntity { kind: EntityKind, id: String },

    /// Query constraints rejected before any search or probe starts.
    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),

    /// A discovery update or document would break a graph invariant.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    /// The active dependency graph contains a cycle. Suppression is indeterminate.
    #[error("suppression cycle detected: {}", format_cycle(.cycle))]
    SuppressionCycleDetected { cycle: Vec<DeviceId> },
}

impl TopologyError {
    pub fn unknown(kind: EntityKind, id: impl std::fmt::Display) -> Self {
        TopologyError::UnknownEntity {
            kind,
            id: id.to_string(),
        }
    }
}

fn format_cycle(cycle: &[DeviceId]) -> String {
    cycle
        .iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type Result<T> = std::result::Result<T, TopologyError>;
