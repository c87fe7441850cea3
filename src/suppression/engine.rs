//! Dependency-driven failure suppression
//!
//! Active dependency edges are normalised to cause -> effect. A device is suppressed
//! when any device it transitively depends on is down (or known unreachable).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, TopologyError};
use crate::models::DeviceId;
use crate::topology::TopologySnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionStatus {
    pub device: DeviceId,
    pub suppressed: bool,
    /// Failed ancestors, nearest first, ties by id
    pub by: Vec<DeviceId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

#[derive(Debug, Clone, Default)]
pub struct SuppressionEngine;

impl SuppressionEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn is_suppressed(
        &self,
        device: &DeviceId,
        snapshot: &TopologySnapshot,
    ) -> Result<SuppressionStatus> {
        self.is_suppressed_with(device, snapshot, &BTreeSet::new())
    }

    /// Like [`is_suppressed`](Self::is_suppressed), also treating `unreachable`
    /// devices as failed ancestors.
    pub fn is_suppressed_with(
        &self,
        device: &DeviceId,
        snapshot: &TopologySnapshot,
        unreachable: &BTreeSet<DeviceId>,
    ) -> Result<SuppressionStatus> {
        snapshot.device(device.as_str())?;
        let causes = causes_by_effect(snapshot);
        check_acyclic(&causes)?;

        let failed = |id: &DeviceId| {
            unreachable.contains(id)
                || snapshot
                    .device(id.as_str())
                    .map(|d| d.status.is_down())
                    .unwrap_or(false)
        };

        let mut by = Vec::new();
        let mut visited: BTreeSet<&DeviceId> = BTreeSet::from([device]);
        let mut level: BTreeSet<&DeviceId> = BTreeSet::from([device]);
        while !level.is_empty() {
            let mut next = BTreeSet::new();
            for effect in &level {
                for &cause in causes.get(*effect).into_iter().flatten() {
                    if visited.insert(cause) {
                        next.insert(cause);
                    }
                }
            }
            by.extend(next.iter().filter(|id| failed(**id)).map(|id| (*id).clone()));
            level = next;
        }

        if !by.is_empty() {
            tracing::debug!(
                "[SUPPRESSION] {} suppressed by {}",
                device,
                by.iter().map(|d| d.as_str()).collect::<Vec<_>>().join(", ")
            );
        }
        Ok(SuppressionStatus {
            device: device.clone(),
            suppressed: !by.is_empty(),
            by,
        })
    }

    /// Fail with the first cycle found in the active dependency graph.
    pub fn validate(&self, snapshot: &TopologySnapshot) -> Result<()> {
        check_acyclic(&causes_by_effect(snapshot))
    }

    /// Every suppressed device in the snapshot, keyed by id.
    pub fn suppressed_devices(
        &self,
        snapshot: &TopologySnapshot,
    ) -> Result<BTreeMap<DeviceId, Vec<DeviceId>>> {
        self.validate(snapshot)?;
        let mut suppressed = BTreeMap::new();
        for device in snapshot.devices() {
            let status = self.is_suppressed(&device.id, snapshot)?;
            if status.suppressed {
                suppressed.insert(status.device, status.by);
            }
        }
        Ok(suppressed)
    }
}

/// effect -> its direct causes, active edges only
fn causes_by_effect(snapshot: &TopologySnapshot) -> BTreeMap<&DeviceId, BTreeSet<&DeviceId>> {
    let mut causes: BTreeMap<&DeviceId, BTreeSet<&DeviceId>> = BTreeMap::new();
    for dependency in snapshot.dependencies().filter(|d| d.active) {
        let (cause, effect) = dependency.cause_effect();
        causes.entry(effect).or_default().insert(cause);
    }
    causes
}

fn check_acyclic(graph: &BTreeMap<&DeviceId, BTreeSet<&DeviceId>>) -> Result<()> {
    let mut marks: BTreeMap<&DeviceId, Mark> = BTreeMap::new();
    for &start in graph.keys() {
        if marks.contains_key(start) {
            continue;
        }
        let mut stack = vec![start];
        if let Some(cycle) = visit(graph, start, &mut marks, &mut stack) {
            tracing::warn!(
                "[SUPPRESSION] Dependency cycle: {}",
                cycle.iter().map(|d| d.as_str()).collect::<Vec<_>>().join(" -> ")
            );
            return Err(TopologyError::SuppressionCycleDetected { cycle });
        }
    }
    Ok(())
}

fn visit<'a>(
    graph: &BTreeMap<&'a DeviceId, BTreeSet<&'a DeviceId>>,
    node: &'a DeviceId,
    marks: &mut BTreeMap<&'a DeviceId, Mark>,
    stack: &mut Vec<&'a DeviceId>,
) -> Option<Vec<DeviceId>> {
    marks.insert(node, Mark::Visiting);
    for &next in graph.get(node).into_iter().flatten() {
        match marks.get(next) {
            Some(Mark::Done) => continue,
            Some(Mark::Visiting) => {
                let from = stack.iter().position(|d| *d == next).unwrap_or(0);
                let mut cycle: Vec<DeviceId> = stack[from..].iter().map(|d| (*d).clone()).collect();
                cycle.push(next.clone());
                return Some(cycle);
            }
            None => {
                stack.push(next);
                if let Some(cycle) = visit(graph, next, marks, stack) {
                    return Some(cycle);
                }
                stack.pop();
            }
        }
    }
    marks.insert(node, Mark::Done);
    None
}
