//! JSON export functionality
//!
//! Export topology snapshots and path search results to JSON format

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::models::{Dependency, DeviceId, DeviceStatus, DiscoverySource, InterfaceId, LinkId};
use crate::paths::PathResult;
use crate::scoring::ConfidenceScorer;
use crate::topology::TopologySnapshot;

/// Topology export format
#[derive(Debug, Serialize)]
pub struct TopologyExport {
    pub export_date: String,
    pub captured_at: String,
    pub snapshot_version: u64,
    pub total_devices: usize,
    pub devices: Vec<DeviceNode>,
    pub connections: Vec<Connection>,
    pub dependencies: Vec<Dependency>,
}

/// Device node for topology
#[derive(Debug, Serialize)]
pub struct DeviceNode {
    pub id: DeviceId,
    pub name: Option<String>,
    pub status: DeviceStatus,
    pub interfaces: Vec<InterfaceId>,
}

/// One fused interface pair
#[derive(Debug, Serialize)]
pub struct Connection {
    pub link: LinkId,
    pub source: DeviceId,
    pub source_interface: InterfaceId,
    pub target: DeviceId,
    pub target_interface: InterfaceId,
    /// Fused confidence over every report on the pair
    pub confidence: f64,
    pub reports: usize,
    pub sources: BTreeSet<DiscoverySource>,
    /// At least one report says the link is up
    pub is_up: bool,
}

/// Export a snapshot with fused link confidence
pub fn export_topology_json(snapshot: &TopologySnapshot, scorer: &ConfidenceScorer) -> Result<String> {
    let devices: Vec<DeviceNode> = snapshot
        .devices()
        .map(|d| DeviceNode {
            id: d.id.clone(),
            name: d.name.clone(),
            status: d.status,
            interfaces: d.interfaces.iter().cloned().collect(),
        })
        .collect();

    let up_pairs: BTreeSet<_> = snapshot
        .links()
        .filter(|l| l.is_up)
        .map(|l| l.interface_pair())
        .collect();

    let mut connections = Vec::new();
    for ((a, b), score) in scorer.score_pairs(snapshot, false) {
        let source = snapshot
            .device_of_interface(a.as_str())
            .with_context(|| format!("Link {} has no owning device", score.representative))?;
        let target = snapshot
            .device_of_interface(b.as_str())
            .with_context(|| format!("Link {} has no owning device", score.representative))?;
        let is_up = up_pairs.contains(&(a.clone(), b.clone()));
        connections.push(Connection {
            link: score.representative,
            source: source.id.clone(),
            source_interface: a,
            target: target.id.clone(),
            target_interface: b,
            confidence: score.confidence,
            reports: score.reports,
            sources: score.sources,
            is_up,
        });
    }

    let export = TopologyExport {
        export_date: chrono::Utc::now().to_rfc3339(),
        captured_at: snapshot.captured_at().to_rfc3339(),
        snapshot_version: snapshot.version(),
        total_devices: devices.len(),
        devices,
        connections,
        dependencies: snapshot.dependencies().cloned().collect(),
    };

    let json = serde_json::to_string_pretty(&export)?;
    Ok(json)
}

/// Export path search results to JSON
pub fn export_path_results_json(results: &[PathResult]) -> Result<String> {
    let json = serde_json::to_string_pretty(results)?;
    Ok(json)
}
