//! Current-snapshot pointer
//!
//! Readers clone the `Arc` and work against that version for the whole query. Writers
//! are serialized so two concurrent updates can never both build on the same base.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use super::document::TopologyDocument;
use super::snapshot::TopologySnapshot;
use super::update::DiscoveryUpdate;
use crate::error::Result;

#[derive(Debug)]
pub struct TopologyStore {
    current: RwLock<Arc<TopologySnapshot>>,
    writer: Mutex<()>,
}

impl Default for TopologyStore {
    fn default() -> Self {
        Self::new(TopologySnapshot::empty())
    }
}

impl TopologyStore {
    pub fn new(snapshot: TopologySnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        }
    }

    pub fn from_document(document: &TopologyDocument) -> Result<Self> {
        Ok(Self::new(TopologySnapshot::from_document(document)?))
    }

    /// Pin the current version.
    pub fn snapshot(&self) -> Arc<TopologySnapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn version(&self) -> u64 {
        self.current.read().version()
    }

    /// Build the next version from the current one and publish it.
    ///
    /// On error the current snapshot stays published unchanged.
    pub fn apply_discovery_update(&self, update: DiscoveryUpdate) -> Result<Arc<TopologySnapshot>> {
        let _writer = self.writer.lock();
        let base = self.snapshot();

        let next = match base.apply(&update) {
            Ok(next) => Arc::new(next),
            Err(e) => {
                tracing::warn!(
                    "[TOPOLOGY] Rejected discovery update on v{}: {}",
                    base.version(),
                    e
                );
                return Err(e);
            }
        };

        *self.current.write() = Arc::clone(&next);
        tracing::info!(
            "[TOPOLOGY] Published snapshot v{} ({} devices, {} links)",
            next.version(),
            next.device_count(),
            next.link_count()
        );
        Ok(next)
    }
}
