//! Path query and result types

use serde::{Deserialize, Serialize};

use crate::config::{self, PathSettings};
use crate::error::{Result, TopologyError};
use crate::models::{DeviceId, Endpoint, InterfaceId, LinkId};

/// Operator constraints on a path search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathConstraints {
    /// Expand same-broadcast-domain edges before routed ones
    #[serde(default)]
    pub prefer_l2: bool,
    /// Allow hops that cross broadcast domains
    #[serde(default = "default_true")]
    pub include_l3_hops: bool,
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,
    #[serde(default = "default_true")]
    pub exclude_down_links: bool,
    /// Number of ranked alternatives to return
    #[serde(default = "default_max_paths")]
    pub max_paths: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_hops() -> u32 {
    config::default_max_hops()
}

fn default_max_paths() -> usize {
    config::max_paths()
}

/// Hop bound and path count follow `NEXUS_DEFAULT_MAX_HOPS` / `NEXUS_MAX_PATHS`.
impl Default for PathConstraints {
    fn default() -> Self {
        Self {
            prefer_l2: false,
            include_l3_hops: true,
            max_hops: default_max_hops(),
            exclude_down_links: true,
            max_paths: default_max_paths(),
        }
    }
}

impl PathConstraints {
    /// Defaults with the hop bound and path count taken from settings.
    pub fn from_settings(settings: &PathSettings) -> Self {
        Self {
            prefer_l2: false,
            include_l3_hops: true,
            max_hops: settings.default_max_hops,
            exclude_down_links: true,
            max_paths: settings.max_paths,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathQuery {
    pub source: Endpoint,
    pub target: Endpoint,
    #[serde(default)]
    pub constraints: PathConstraints,
}

impl PathQuery {
    pub fn new(source: Endpoint, target: Endpoint) -> Self {
        Self {
            source,
            target,
            constraints: PathConstraints::default(),
        }
    }

    pub fn between_devices(source: impl Into<DeviceId>, target: impl Into<DeviceId>) -> Self {
        Self::new(Endpoint::Device(source.into()), Endpoint::Device(target.into()))
    }

    pub fn with_constraints(mut self, constraints: PathConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn max_hops(mut self, max_hops: u32) -> Self {
        self.constraints.max_hops = max_hops;
        self
    }

    pub fn max_paths(mut self, max_paths: usize) -> Self {
        self.constraints.max_paths = max_paths;
        self
    }

    pub fn prefer_l2(mut self, prefer_l2: bool) -> Self {
        self.constraints.prefer_l2 = prefer_l2;
        self
    }

    pub fn include_l3_hops(mut self, include: bool) -> Self {
        self.constraints.include_l3_hops = include;
        self
    }

    pub fn exclude_down_links(mut self, exclude: bool) -> Self {
        self.constraints.exclude_down_links = exclude;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.constraints.max_hops < 1 {
            return Err(TopologyError::InvalidConstraint(format!(
                "max_hops must be at least 1, got {}",
                self.constraints.max_hops
            )));
        }
        if self.constraints.max_paths < 1 {
            return Err(TopologyError::InvalidConstraint(
                "max_paths must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Why a path query produced no path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathFailure {
    NoPath,
    HopLimitExceeded,
}

impl PathFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathFailure::NoPath => "no-path",
            PathFailure::HopLimitExceeded => "hop-limit-exceeded",
        }
    }
}

impl std::fmt::Display for PathFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One traversal of a link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathHop {
    pub index: usize,
    pub link: LinkId,
    pub from_device: DeviceId,
    pub from_interface: InterfaceId,
    pub to_device: DeviceId,
    pub to_interface: InterfaceId,
    pub latency_ms: f64,
    pub confidence: f64,
    /// Crossed a broadcast-domain boundary on the link or on the transit before it
    pub routed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    pub source: Endpoint,
    pub target: Endpoint,
    pub is_reachable: bool,
    /// Devices in traversal order
    pub devices: Vec<DeviceId>,
    pub hops: Vec<PathHop>,
    pub hop_count: usize,
    pub total_latency_ms: f64,
    /// Product of per-hop confidence
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<PathFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_hop: Option<usize>,
}

impl PathResult {
    pub fn unreachable(query: &PathQuery, reason: PathFailure, failure_hop: usize) -> Self {
        Self {
            source: query.source.clone(),
            target: query.target.clone(),
            is_reachable: false,
            devices: Vec::new(),
            hops: Vec::new(),
            hop_count: 0,
            total_latency_ms: 0.0,
            confidence: 0.0,
            failure_reason: Some(reason),
            failure_hop: Some(failure_hop),
        }
    }

    pub fn device_names(&self) -> Vec<&str> {
        self.devices.iter().map(|d| d.as_str()).collect()
    }

    pub fn link_ids(&self) -> Vec<&LinkId> {
        self.hops.iter().map(|h| &h.link).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hop_bound_is_rejected() {
        let query = PathQuery::between_devices("a", "b").max_hops(0);
        assert!(matches!(
            query.validate(),
            Err(TopologyError::InvalidConstraint(_))
        ));
    }

    #[test]
    fn failure_reason_wire_names() {
        let json = serde_json::to_string(&PathFailure::HopLimitExceeded).unwrap();
        assert_eq!(json, "\"hop-limit-exceeded\"");
        assert_eq!(PathFailure::NoPath.as_str(), "no-path");
    }

    #[test]
    fn constraints_default_from_partial_json() {
        let query: PathQuery = serde_json::from_str(
            r#"{"source":{"kind":"device","id":"a"},"target":{"kind":"device","id":"b"},
                "constraints":{"prefer_l2":true}}"#,
        )
        .unwrap();
        assert!(query.constraints.prefer_l2);
        assert!(query.constraints.include_l3_hops);
        assert_eq!(query.constraints.max_hops, config::default_max_hops());
    }

    #[test]
    fn default_constraints_follow_env_path_settings() {
        let defaults = PathConstraints::default();
        assert_eq!(defaults, PathConstraints::from_settings(&PathSettings::from_env()));
        assert!(defaults.include_l3_hops);
        assert!(defaults.exclude_down_links);
        assert!(!defaults.prefer_l2);

        let query = PathQuery::between_devices("a", "b");
        assert_eq!(query.constraints.max_paths, config::max_paths());
    }
}
