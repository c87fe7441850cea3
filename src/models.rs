//! Data models for the topology analysis core
//!
//! Entities are stored in flat id-keyed tables; every relation is an id reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;

/// VLAN assumed for interfaces that report no membership
pub const DEFAULT_VLAN: u16 = 1;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

entity_id!(
    /// Device identifier (hostname or inventory key)
    DeviceId
);
entity_id!(
    /// Interface identifier, unique across the whole topology
    InterfaceId
);
entity_id!(
    /// Link identifier, one per discovery report
    LinkId
);

/// Device health as last reported by monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Up,
    Down,
    Warning,
    #[default]
    Unknown,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Up => "up",
            DeviceStatus::Down => "down",
            DeviceStatus::Warning => "warning",
            DeviceStatus::Unknown => "unknown",
        }
    }

    pub fn is_down(&self) -> bool {
        matches!(self, DeviceStatus::Down)
    }
}

/// Interface operational status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceStatus {
    #[default]
    Up,
    Down,
}

/// Protocol or operator that reported a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverySource {
    Lldp,
    Cdp,
    /// SNMP bridge-table inference
    Snmp,
    Manual,
}

impl DiscoverySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoverySource::Lldp => "lldp",
            DiscoverySource::Cdp => "cdp",
            DiscoverySource::Snmp => "snmp",
            DiscoverySource::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub status: DeviceStatus,
    /// Owned interfaces. Rebuilt from `Interface::device` whenever a snapshot is built.
    #[serde(default)]
    pub interfaces: BTreeSet<InterfaceId>,
}

impl Device {
    pub fn new(id: impl Into<DeviceId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            status: DeviceStatus::Unknown,
            interfaces: BTreeSet::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_status(mut self, status: DeviceStatus) -> Self {
        self.status = status;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub id: InterfaceId,
    pub device: DeviceId,
    #[serde(default)]
    pub status: InterfaceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,
}

impl Interface {
    pub fn new(id: impl Into<InterfaceId>, device: impl Into<DeviceId>) -> Self {
        Self {
            id: id.into(),
            device: device.into(),
            status: InterfaceStatus::Up,
            vlan: None,
        }
    }

    pub fn with_vlan(mut self, vlan: u16) -> Self {
        self.vlan = Some(vlan);
        self
    }

    pub fn with_status(mut self, status: InterfaceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_up(&self) -> bool {
        self.status == InterfaceStatus::Up
    }

    /// Broadcast domain this interface forwards in.
    pub fn broadcast_domain(&self) -> u16 {
        self.vlan.unwrap_or(DEFAULT_VLAN)
    }
}

fn default_confidence() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// One adjacency claim between two interfaces, as reported by a single source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub source: InterfaceId,
    pub target: InterfaceId,
    pub discovery: DiscoverySource,
    /// Raw confidence reported by the discovery source, in [0,1]
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_mbps: Option<u64>,
    /// Measured one-way latency, when discovery provided one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(default = "default_true")]
    pub is_up: bool,
    /// None means the report carries no age and is treated as fresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Link {
    pub fn new(
        id: impl Into<LinkId>,
        source: impl Into<InterfaceId>,
        target: impl Into<InterfaceId>,
        discovery: DiscoverySource,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            discovery,
            confidence: 1.0,
            speed_mbps: None,
            latency_ms: None,
            is_up: true,
            last_seen: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_speed(mut self, speed_mbps: u64) -> Self {
        self.speed_mbps = Some(speed_mbps);
        self
    }

    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_up(mut self, is_up: bool) -> Self {
        self.is_up = is_up;
        self
    }

    pub fn seen_at(mut self, last_seen: DateTime<Utc>) -> Self {
        self.last_seen = Some(last_seen);
        self
    }

    /// Endpoints in canonical order; parallel reports share the same pair.
    pub fn interface_pair(&self) -> (InterfaceId, InterfaceId) {
        if self.source <= self.target {
            (self.source.clone(), self.target.clone())
        } else {
            (self.target.clone(), self.source.clone())
        }
    }

    pub fn touches(&self, interface: &InterfaceId) -> bool {
        &self.source == interface || &self.target == interface
    }

    pub fn other_end(&self, interface: &InterfaceId) -> Option<&InterfaceId> {
        if &self.source == interface {
            Some(&self.target)
        } else if &self.target == interface {
            Some(&self.source)
        } else {
            None
        }
    }
}

/// Which way a failure propagates along a dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyDirection {
    Upstream,
    /// A parent failure explains a child failure.
    #[default]
    Downstream,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub parent: DeviceId,
    pub child: DeviceId,
    #[serde(default)]
    pub direction: DependencyDirection,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Dependency {
    pub fn downstream(parent: impl Into<DeviceId>, child: impl Into<DeviceId>) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
            direction: DependencyDirection::Downstream,
            active: true,
        }
    }

    pub fn upstream(parent: impl Into<DeviceId>, child: impl Into<DeviceId>) -> Self {
        Self {
            direction: DependencyDirection::Upstream,
            ..Self::downstream(parent, child)
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn key(&self) -> (DeviceId, DeviceId) {
        (self.parent.clone(), self.child.clone())
    }

    /// `(cause, effect)`: a failure of `cause` explains a failure of `effect`.
    pub fn cause_effect(&self) -> (&DeviceId, &DeviceId) {
        match self.direction {
            DependencyDirection::Downstream => (&self.parent, &self.child),
            DependencyDirection::Upstream => (&self.child, &self.parent),
        }
    }
}

/// A query endpoint: a whole device or one specific interface
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Endpoint {
    Device(DeviceId),
    Interface(InterfaceId),
}

impl Endpoint {
    pub fn device(id: impl Into<DeviceId>) -> Self {
        Endpoint::Device(id.into())
    }

    pub fn interface(id: impl Into<InterfaceId>) -> Self {
        Endpoint::Interface(id.into())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Device(id) => write!(f, "device:{}", id),
            Endpoint::Interface(id) => write!(f, "interface:{}", id),
        }
    }
}
