//! Immutable, versioned topology snapshot
//!
//! Entity tables are `Arc`-shared between versions. Applying an update clones only the
//! tables it touches, so earlier readers keep a complete and consistent view.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::document::TopologyDocument;
use super::update::DiscoveryUpdate;
use crate::error::{EntityKind, Result, TopologyError};
use crate::models::{Dependency, Device, DeviceId, Endpoint, Interface, InterfaceId, Link, LinkId};

type DependencyKey = (DeviceId, DeviceId);

#[derive(Debug, Clone)]
pub struct TopologySnapshot {
    version: u64,
    captured_at: DateTime<Utc>,
    devices: Arc<BTreeMap<DeviceId, Device>>,
    interfaces: Arc<BTreeMap<InterfaceId, Interface>>,
    links: Arc<BTreeMap<LinkId, Link>>,
    dependencies: Arc<BTreeMap<DependencyKey, Dependency>>,
    /// interface -> links touching it, sorted by link id
    adjacency: Arc<BTreeMap<InterfaceId, Vec<LinkId>>>,
}

impl Default for TopologySnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl TopologySnapshot {
    /// Version 0, no entities.
    pub fn empty() -> Self {
        Self {
            version: 0,
            captured_at: DateTime::<Utc>::UNIX_EPOCH,
            devices: Arc::default(),
            interfaces: Arc::default(),
            links: Arc::default(),
            dependencies: Arc::default(),
            adjacency: Arc::default(),
        }
    }

    pub fn from_document(document: &TopologyDocument) -> Result<Self> {
        Self::build_from_document(document, 1)
    }

    fn build_from_document(document: &TopologyDocument, version: u64) -> Result<Self> {
        let mut devices = BTreeMap::new();
        for device in &document.devices {
            if devices.insert(device.id.clone(), device.clone()).is_some() {
                return Err(duplicate("device", &device.id));
            }
        }

        let mut interfaces = BTreeMap::new();
        for interface in &document.interfaces {
            if interfaces
                .insert(interface.id.clone(), interface.clone())
                .is_some()
            {
                return Err(duplicate("interface", &interface.id));
            }
        }

        let mut links = BTreeMap::new();
        for link in &document.links {
            if links.insert(link.id.clone(), link.clone()).is_some() {
                return Err(duplicate("link", &link.id));
            }
        }

        let mut dependencies = BTreeMap::new();
        for dependency in &document.dependencies {
            if dependencies
                .insert(dependency.key(), dependency.clone())
                .is_some()
            {
                return Err(duplicate(
                    "dependency",
                    format!("{}->{}", dependency.parent, dependency.child),
                ));
            }
        }

        let mut snapshot = Self {
            version,
            captured_at: document.captured_at,
            devices: Arc::new(devices),
            interfaces: Arc::new(interfaces),
            links: Arc::new(links),
            dependencies: Arc::new(dependencies),
            adjacency: Arc::default(),
        };
        snapshot.reindex(true, true)?;
        Ok(snapshot)
    }

    /// Build the next version. `self` is left untouched whether or not this succeeds.
    pub(crate) fn apply(&self, update: &DiscoveryUpdate) -> Result<Self> {
        let next_version = self.version + 1;
        let mut next = match &update.replace {
            Some(document) => Self::build_from_document(document, next_version)?,
            None => {
                let mut next = self.clone();
                next.version = next_version;
                next
            }
        };
        next.captured_at = update
            .captured_at
            .or_else(|| update.replace.as_ref().map(|doc| doc.captured_at))
            .unwrap_or_else(Utc::now);

        let mut devices_changed = false;
        let mut interfaces_changed = false;
        let mut links_changed = false;

        // Removals cascade device -> interfaces -> links, and device -> dependencies.
        let removed_devices: BTreeSet<&DeviceId> = update
            .remove_devices
            .iter()
            .filter(|id| next.devices.contains_key(*id))
            .collect();
        let mut removed_interfaces: BTreeSet<InterfaceId> = update
            .remove_interfaces
            .iter()
            .filter(|id| next.interfaces.contains_key(*id))
            .cloned()
            .collect();

        if !removed_devices.is_empty() {
            Arc::make_mut(&mut next.devices).retain(|id, _| !removed_devices.contains(id));
            removed_interfaces.extend(
                next.interfaces
                    .values()
                    .filter(|iface| removed_devices.contains(&iface.device))
                    .map(|iface| iface.id.clone()),
            );
            let touches_removed = next.dependencies.values().any(|dep| {
                removed_devices.contains(&dep.parent) || removed_devices.contains(&dep.child)
            });
            if touches_removed {
                Arc::make_mut(&mut next.dependencies).retain(|_, dep| {
                    !removed_devices.contains(&dep.parent) && !removed_devices.contains(&dep.child)
                });
            }
            devices_changed = true;
        }

        if !removed_interfaces.is_empty() {
            Arc::make_mut(&mut next.interfaces).retain(|id, _| !removed_interfaces.contains(id));
            let touches_removed = next.links.values().any(|link| {
                removed_interfaces.contains(&link.source) || removed_interfaces.contains(&link.target)
            });
            if touches_removed {
                Arc::make_mut(&mut next.links).retain(|_, link| {
                    !removed_interfaces.contains(&link.source)
                        && !removed_interfaces.contains(&link.target)
                });
                links_changed = true;
            }
            interfaces_changed = true;
        }

        let removed_links: BTreeSet<&LinkId> = update
            .remove_links
            .iter()
            .filter(|id| next.links.contains_key(*id))
            .collect();
        if !removed_links.is_empty() {
            Arc::make_mut(&mut next.links).retain(|id, _| !removed_links.contains(id));
            links_changed = true;
        }

        if update
            .remove_dependencies
            .iter()
            .any(|key| next.dependencies.contains_key(key))
        {
            let dependencies = Arc::make_mut(&mut next.dependencies);
            for key in &update.remove_dependencies {
                dependencies.remove(key);
            }
        }

        if !update.upsert_devices.is_empty() {
            let devices = Arc::make_mut(&mut next.devices);
            for device in &update.upsert_devices {
                devices.insert(device.id.clone(), device.clone());
            }
            devices_changed = true;
        }

        if !update.upsert_interfaces.is_empty() {
            let interfaces = Arc::make_mut(&mut next.interfaces);
            for interface in &update.upsert_interfaces {
                interfaces.insert(interface.id.clone(), interface.clone());
            }
            interfaces_changed = true;
        }

        if !update.upsert_links.is_empty() {
            let links = Arc::make_mut(&mut next.links);
            for link in &update.upsert_links {
                links.insert(link.id.clone(), link.clone());
            }
            links_changed = true;
        }

        if !update.upsert_dependencies.is_empty() {
            let dependencies = Arc::make_mut(&mut next.dependencies);
            for dependency in &update.upsert_dependencies {
                dependencies.insert(dependency.key(), dependency.clone());
            }
        }

        if !update.device_status.is_empty() {
            let devices = Arc::make_mut(&mut next.devices);
            for (id, status) in &update.device_status {
                let device = devices
                    .get_mut(id)
                    .ok_or_else(|| TopologyError::unknown(EntityKind::Device, id))?;
                device.status = *status;
            }
        }

        if !update.interface_status.is_empty() {
            let interfaces = Arc::make_mut(&mut next.interfaces);
            for (id, status) in &update.interface_status {
                let interface = interfaces
                    .get_mut(id)
                    .ok_or_else(|| TopologyError::unknown(EntityKind::Interface, id))?;
                interface.status = *status;
            }
        }

        next.reindex(devices_changed || interfaces_changed, links_changed)?;
        Ok(next)
    }

    fn reindex(&mut self, ownership_changed: bool, links_changed: bool) -> Result<()> {
        self.validate()?;

        if ownership_changed {
            let devices = Arc::make_mut(&mut self.devices);
            for device in devices.values_mut() {
                device.interfaces.clear();
            }
            for interface in self.interfaces.values() {
                if let Some(device) = devices.get_mut(&interface.device) {
                    device.interfaces.insert(interface.id.clone());
                }
            }
        }

        if links_changed {
            let mut adjacency: BTreeMap<InterfaceId, Vec<LinkId>> = BTreeMap::new();
            for link in self.links.values() {
                adjacency
                    .entry(link.source.clone())
                    .or_default()
                    .push(link.id.clone());
                adjacency
                    .entry(link.target.clone())
                    .or_default()
                    .push(link.id.clone());
            }
            self.adjacency = Arc::new(adjacency);
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for interface in self.interfaces.values() {
            if !self.devices.contains_key(&interface.device) {
                return Err(TopologyError::InvalidTopology(format!(
                    "interface {} references missing device {}",
                    interface.id, interface.device
                )));
            }
        }

        for link in self.links.values() {
            for end in [&link.source, &link.target] {
                if !self.interfaces.contains_key(end) {
                    return Err(TopologyError::InvalidTopology(format!(
                        "link {} references missing interface {}",
                        link.id, end
                    )));
                }
            }
            if link.source == link.target {
                return Err(TopologyError::InvalidTopology(format!(
                    "link {} connects interface {} to itself",
                    link.id, link.source
                )));
            }
            if !(0.0..=1.0).contains(&link.confidence) {
                return Err(TopologyError::InvalidTopology(format!(
                    "link {} confidence {} outside [0,1]",
                    link.id, link.confidence
                )));
            }
            if link.latency_ms.is_some_and(|ms| !ms.is_finite() || ms < 0.0) {
                return Err(TopologyError::InvalidTopology(format!(
                    "link {} has invalid latency",
                    link.id
                )));
            }
        }

        for dependency in self.dependencies.values() {
            for end in [&dependency.parent, &dependency.child] {
                if !self.devices.contains_key(end) {
                    return Err(TopologyError::InvalidTopology(format!(
                        "dependency {}->{} references missing device {}",
                        dependency.parent, dependency.child, end
                    )));
                }
            }
            if dependency.parent == dependency.child {
                return Err(TopologyError::InvalidTopology(format!(
                    "device {} cannot depend on itself",
                    dependency.parent
                )));
            }
        }

        Ok(())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn device(&self, id: &str) -> Result<&Device> {
        self.devices
            .get(id)
            .ok_or_else(|| TopologyError::unknown(EntityKind::Device, id))
    }

    pub fn interface(&self, id: &str) -> Result<&Interface> {
        self.interfaces
            .get(id)
            .ok_or_else(|| TopologyError::unknown(EntityKind::Interface, id))
    }

    pub fn link(&self, id: &str) -> Result<&Link> {
        self.links
            .get(id)
            .ok_or_else(|| TopologyError::unknown(EntityKind::Link, id))
    }

    /// Links touching an interface, in link-id order.
    pub fn neighbors(&self, interface: &str) -> Result<Vec<&Link>> {
        self.interface(interface)?;
        Ok(self
            .adjacency
            .get(interface)
            .map(|ids| ids.iter().filter_map(|id| self.links.get(id)).collect())
            .unwrap_or_default())
    }

    pub fn interfaces_of(&self, device: &str) -> Result<Vec<&Interface>> {
        let device = self.device(device)?;
        Ok(device
            .interfaces
            .iter()
            .filter_map(|id| self.interfaces.get(id))
            .collect())
    }

    /// Dependency edges in which the device is parent or child.
    pub fn dependencies_of(&self, device: &str) -> Result<Vec<&Dependency>> {
        self.device(device)?;
        Ok(self
            .dependencies
            .values()
            .filter(|dep| dep.parent.as_str() == device || dep.child.as_str() == device)
            .collect())
    }

    /// Every report describing the adjacency `a`-`b`, regardless of direction.
    pub fn links_between(&self, a: &str, b: &str) -> Result<Vec<&Link>> {
        self.interface(b)?;
        Ok(self
            .neighbors(a)?
            .into_iter()
            .filter(|link| link.other_end(&InterfaceId::from(a)).map(|id| id.as_str()) == Some(b))
            .collect())
    }

    pub fn device_of_interface(&self, interface: &str) -> Result<&Device> {
        let interface = self.interface(interface)?;
        self.device(interface.device.as_str())
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.values()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.values()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Resolve `device:<id>`, `interface:<id>`, or a bare id (devices win over interfaces).
    pub fn resolve_endpoint(&self, raw: &str) -> Result<Endpoint> {
        if let Some(id) = raw.strip_prefix("device:") {
            self.device(id)?;
            return Ok(Endpoint::device(id));
        }
        if let Some(id) = raw.strip_prefix("interface:") {
            self.interface(id)?;
            return Ok(Endpoint::interface(id));
        }
        if self.devices.contains_key(raw) {
            Ok(Endpoint::device(raw))
        } else if self.interfaces.contains_key(raw) {
            Ok(Endpoint::interface(raw))
        } else {
            Err(TopologyError::unknown(EntityKind::Device, raw))
        }
    }

    /// Device an endpoint lives on.
    pub fn endpoint_device(&self, endpoint: &Endpoint) -> Result<&Device> {
        match endpoint {
            Endpoint::Device(id) => self.device(id.as_str()),
            Endpoint::Interface(id) => self.device_of_interface(id.as_str()),
        }
    }

    /// Interfaces a search may start from or finish on for this endpoint.
    pub fn endpoint_interfaces(&self, endpoint: &Endpoint) -> Result<Vec<&Interface>> {
        match endpoint {
            Endpoint::Device(id) => self.interfaces_of(id.as_str()),
            Endpoint::Interface(id) => Ok(vec![self.interface(id.as_str())?]),
        }
    }

    pub fn to_document(&self) -> TopologyDocument {
        TopologyDocument {
            captured_at: self.captured_at,
            devices: self.devices.values().cloned().collect(),
            interfaces: self.interfaces.values().cloned().collect(),
            links: self.links.values().cloned().collect(),
            dependencies: self.dependencies.values().cloned().collect(),
        }
    }
}

fn duplicate(kind: &str, id: impl std::fmt::Display) -> TopologyError {
    TopologyError::InvalidTopology(format!("duplicate {} id {}", kind, id))
}
