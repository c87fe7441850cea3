//! Liveness probe seam
//!
//! The probe I/O itself is abstract; the default prober answers from the topology.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Endpoint;
use crate::paths::{PathConstraints, PathFinder, PathQuery};
use crate::topology::TopologySnapshot;

/// Why a single probe attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeFailure {
    #[error("target did not answer")]
    NoAnswer,
    #[error("probe failed: {0}")]
    Failed(String),
}

/// One liveness check of `target` from `source`.
#[async_trait]
pub trait LivenessProber: Send + Sync {
    /// Round-trip latency in milliseconds on success.
    async fn probe(
        &self,
        snapshot: &TopologySnapshot,
        source: &Endpoint,
        target: &Endpoint,
    ) -> Result<f64, ProbeFailure>;
}

/// Answers from the snapshot: the target device must not be down and a path over
/// up links must exist. Round-trip is twice the path latency.
#[derive(Debug, Clone)]
pub struct TopologyProber {
    finder: PathFinder,
}

impl TopologyProber {
    pub fn new(finder: PathFinder) -> Self {
        Self { finder }
    }
}

#[async_trait]
impl LivenessProber for TopologyProber {
    async fn probe(
        &self,
        snapshot: &TopologySnapshot,
        source: &Endpoint,
        target: &Endpoint,
    ) -> Result<f64, ProbeFailure> {
        let device = snapshot
            .endpoint_device(target)
            .map_err(|e| ProbeFailure::Failed(e.to_string()))?;
        if device.status.is_down() {
            return Err(ProbeFailure::NoAnswer);
        }

        let constraints = PathConstraints {
            exclude_down_links: true,
            max_paths: 1,
            ..PathConstraints::from_settings(self.finder.settings())
        };
        let query = PathQuery::new(source.clone(), target.clone()).with_constraints(constraints);
        let paths = self
            .finder
            .find_paths_in(snapshot, &query)
            .map_err(|e| ProbeFailure::Failed(e.to_string()))?;

        match paths.first() {
            Some(path) if path.is_reachable => Ok(path.total_latency_ms * 2.0),
            _ => Err(ProbeFailure::NoAnswer),
        }
    }
}
