//! Discovery updates
//!
//! A batch of changes reported by discovery or monitoring. Applying one never mutates
//! the snapshot it is applied to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::TopologyDocument;
use crate::models::{
    Dependency, Device, DeviceId, DeviceStatus, Interface, InterfaceId, InterfaceStatus, Link,
    LinkId,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryUpdate {
    /// Full replacement; deltas below are applied on top of it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace: Option<TopologyDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub upsert_devices: Vec<Device>,
    #[serde(default)]
    pub remove_devices: Vec<DeviceId>,
    #[serde(default)]
    pub upsert_interfaces: Vec<Interface>,
    #[serde(default)]
    pub remove_interfaces: Vec<InterfaceId>,
    #[serde(default)]
    pub upsert_links: Vec<Link>,
    #[serde(default)]
    pub remove_links: Vec<LinkId>,
    #[serde(default)]
    pub upsert_dependencies: Vec<Dependency>,
    /// `(parent, child)` keys
    #[serde(default)]
    pub remove_dependencies: Vec<(DeviceId, DeviceId)>,
    /// Monitor results
    #[serde(default)]
    pub device_status: Vec<(DeviceId, DeviceStatus)>,
    #[serde(default)]
    pub interface_status: Vec<(InterfaceId, InterfaceStatus)>,
}

impl DiscoveryUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(document: TopologyDocument) -> Self {
        Self {
            replace: Some(document),
            ..Self::default()
        }
    }

    pub fn at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = Some(captured_at);
        self
    }

    pub fn upsert_device(mut self, device: Device) -> Self {
        self.upsert_devices.push(device);
        self
    }

    pub fn remove_device(mut self, id: impl Into<DeviceId>) -> Self {
        self.remove_devices.push(id.into());
        self
    }

    pub fn upsert_interface(mut self, interface: Interface) -> Self {
        self.upsert_interfaces.push(interface);
        self
    }

    pub fn remove_interface(mut self, id: impl Into<InterfaceId>) -> Self {
        self.remove_interfaces.push(id.into());
        self
    }

    pub fn upsert_link(mut self, link: Link) -> Self {
        self.upsert_links.push(link);
        self
    }

    pub fn remove_link(mut self, id: impl Into<LinkId>) -> Self {
        self.remove_links.push(id.into());
        self
    }

    pub fn upsert_dependency(mut self, dependency: Dependency) -> Self {
        self.upsert_dependencies.push(dependency);
        self
    }

    pub fn remove_dependency(
        mut self,
        parent: impl Into<DeviceId>,
        child: impl Into<DeviceId>,
    ) -> Self {
        self.remove_dependencies.push((parent.into(), child.into()));
        self
    }

    pub fn set_device_status(mut self, id: impl Into<DeviceId>, status: DeviceStatus) -> Self {
        self.device_status.push((id.into(), status));
        self
    }

    pub fn set_interface_status(
        mut self,
        id: impl Into<InterfaceId>,
        status: InterfaceStatus,
    ) -> Self {
        self.interface_status.push((id.into(), status));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.replace.is_none()
            && self.upsert_devices.is_empty()
            && self.remove_devices.is_empty()
            && self.upsert_interfaces.is_empty()
            && self.remove_interfaces.is_empty()
            && self.upsert_links.is_empty()
            && self.remove_links.is_empty()
            && self.upsert_dependencies.is_empty()
            && self.remove_dependencies.is_empty()
            && self.device_status.is_empty()
            && self.interface_status.is_empty()
    }
}
