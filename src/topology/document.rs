//! Serializable topology document
//!
//! The value object the discovery subsystem hands over. A `TopologySnapshot` is built
//! from it and can be turned back into one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TopologyError};
use crate::models::{Dependency, Device, Interface, Link};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyDocument {
    /// Observation time; also the reference instant for link staleness.
    #[serde(default = "Utc::now")]
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

impl TopologyDocument {
    pub fn new(captured_at: DateTime<Utc>) -> Self {
        Self {
            captured_at,
            devices: Vec::new(),
            interfaces: Vec::new(),
            links: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| TopologyError::InvalidTopology(format!("malformed document: {}", e)))
    }

    pub fn device(mut self, device: Device) -> Self {
        self.devices.push(device);
        self
    }

    pub fn interface(mut self, interface: Interface) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    pub fn dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }
}
