//! Constrained path search over a pinned topology snapshot

use std::sync::Arc;

use super::graph::{EdgeKind, Route, SearchGraph};
use super::types::{PathFailure, PathHop, PathQuery, PathResult};
use crate::config::PathSettings;
use crate::error::Result;
use crate::models::DeviceId;
use crate::scoring::ConfidenceScorer;
use crate::topology::{TopologySnapshot, TopologyStore};

#[derive(Debug, Clone)]
pub struct PathFinder {
    store: Arc<TopologyStore>,
    scorer: ConfidenceScorer,
    settings: PathSettings,
}

impl PathFinder {
    pub fn new(store: Arc<TopologyStore>) -> Self {
        Self {
            store,
            scorer: ConfidenceScorer::from_env(),
            settings: PathSettings::from_env(),
        }
    }

    pub fn with_scorer(mut self, scorer: ConfidenceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_settings(mut self, settings: PathSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &Arc<TopologyStore> {
        &self.store
    }

    pub fn scorer(&self) -> &ConfidenceScorer {
        &self.scorer
    }

    pub fn settings(&self) -> &PathSettings {
        &self.settings
    }

    /// Ranked paths for a query against the current snapshot.
    ///
    /// An unreachable target is a single result with `is_reachable == false`, not an error.
    pub fn find_paths(&self, query: &PathQuery) -> Result<Vec<PathResult>> {
        let snapshot = self.store.snapshot();
        self.find_paths_in(&snapshot, query)
    }

    /// Same as [`find_paths`](Self::find_paths) against a snapshot the caller already pinned.
    pub fn find_paths_in(
        &self,
        snapshot: &TopologySnapshot,
        query: &PathQuery,
    ) -> Result<Vec<PathResult>> {
        query.validate()?;
        let source_device = snapshot.endpoint_device(&query.source)?.id.clone();
        let target_device = snapshot.endpoint_device(&query.target)?.id.clone();
        let constraints = &query.constraints;

        if source_device == target_device {
            return Ok(vec![local_result(query, source_device)]);
        }

        let build = |prefer_l2: bool| {
            SearchGraph::build(
                snapshot,
                &self.scorer,
                &self.settings,
                constraints,
                &query.source,
                &query.target,
                prefer_l2,
            )
        };

        let mut graph = build(constraints.prefer_l2)?;
        let mut routes = graph.k_shortest(constraints.max_paths, constraints.max_hops);
        if routes.is_empty() && constraints.prefer_l2 {
            tracing::debug!(
                "[PATHS] No L2-biased path {} -> {}, retrying unbiased",
                query.source,
                query.target
            );
            graph = build(false)?;
            routes = graph.k_shortest(constraints.max_paths, constraints.max_hops);
        }

        if routes.is_empty() {
            let sweep = graph.sweep();
            let result = match sweep.target_hops {
                Some(hops) if hops > constraints.max_hops => PathResult::unreachable(
                    query,
                    PathFailure::HopLimitExceeded,
                    constraints.max_hops as usize,
                ),
                _ => PathResult::unreachable(
                    query,
                    PathFailure::NoPath,
                    sweep.deepest_hop.min(constraints.max_hops) as usize,
                ),
            };
            tracing::debug!(
                "[PATHS] {} -> {} unreachable on v{}: {}",
                query.source,
                query.target,
                snapshot.version(),
                result
                    .failure_reason
                    .map(|r| r.as_str())
                    .unwrap_or("unknown")
            );
            return Ok(vec![result]);
        }

        let results: Vec<PathResult> = routes
            .iter()
            .filter_map(|route| to_result(&graph, query, route))
            .collect();
        tracing::debug!(
            "[PATHS] {} -> {}: {} path(s) on v{}",
            query.source,
            query.target,
            results.len(),
            snapshot.version()
        );
        Ok(results)
    }
}

fn local_result(query: &PathQuery, device: DeviceId) -> PathResult {
    PathResult {
        source: query.source.clone(),
        target: query.target.clone(),
        is_reachable: true,
        devices: vec![device],
        hops: Vec::new(),
        hop_count: 0,
        total_latency_ms: 0.0,
        confidence: 1.0,
        failure_reason: None,
        failure_hop: None,
    }
}

fn to_result(graph: &SearchGraph, query: &PathQuery, route: &Route) -> Option<PathResult> {
    let mut hops = Vec::with_capacity(route.hop_count());
    let mut devices: Vec<DeviceId> = Vec::with_capacity(route.hop_count() + 1);
    let mut routed_transit = false;

    for pair in route.nodes.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let edge = graph.edge(from, to)?;
        match edge.kind {
            EdgeKind::Transit { routed } => routed_transit |= routed,
            EdgeKind::Link(index) => {
                let link = graph.links.get(index)?;
                let from_node = graph.node(from)?;
                let to_node = graph.node(to)?;
                let from_device = graph.devices.get(from_node.device)?.clone();
                let to_device = graph.devices.get(to_node.device)?.clone();
                if devices.is_empty() {
                    devices.push(from_device.clone());
                }
                devices.push(to_device.clone());
                hops.push(PathHop {
                    index: hops.len(),
                    link: link.link.clone(),
                    from_device,
                    from_interface: from_node.interface.clone(),
                    to_device,
                    to_interface: to_node.interface.clone(),
                    latency_ms: link.latency_ms,
                    confidence: link.confidence,
                    routed: link.routed || routed_transit,
                });
                routed_transit = false;
            }
            EdgeKind::Attach | EdgeKind::Detach => {}
        }
    }

    let total_latency_ms = hops.iter().map(|h| h.latency_ms).sum();
    let confidence = hops.iter().map(|h| h.confidence).product();
    Some(PathResult {
        source: query.source.clone(),
        target: query.target.clone(),
        is_reachable: true,
        devices,
        hop_count: hops.len(),
        hops,
        total_latency_ms,
        confidence,
        failure_reason: None,
        failure_hop: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScorerSettings;
    use crate::error::TopologyError;
    use crate::models::{
        Device, DeviceStatus, DiscoverySource, Endpoint, Interface, Link,
    };
    use crate::topology::TopologyDocument;
    use chrono::Utc;
    use proptest::prelude::*;

    fn finder_for(doc: &TopologyDocument) -> PathFinder {
        let store = Arc::new(TopologyStore::from_document(doc).expect("fixture should build"));
        PathFinder::new(store)
            .with_scorer(ConfidenceScorer::new(ScorerSettings {
                prior_lldp: 0.9,
                prior_cdp: 0.85,
                prior_snmp: 0.6,
                prior_manual: 1.0,
                freshness_window_secs: 300,
                stale_half_life_secs: 900,
            }))
            .with_settings(PathSettings {
                default_max_hops: 8,
                max_paths: 3,
                l3_penalty: 1,
                default_hop_latency_ms: 0.5,
            })
    }

    fn up(id: &str) -> Device {
        Device::new(id).with_status(DeviceStatus::Up)
    }

    /// sw1 -- core1 -- sw2, LLDP on both links
    fn star() -> TopologyDocument {
        TopologyDocument::new(Utc::now())
            .device(up("sw1"))
            .device(up("sw2"))
            .device(up("core1"))
            .interface(Interface::new("sw1:1", "sw1"))
            .interface(Interface::new("sw2:1", "sw2"))
            .interface(Interface::new("core1:1", "core1"))
            .interface(Interface::new("core1:2", "core1"))
            .link(Link::new("l1", "sw1:1", "core1:1", DiscoverySource::Lldp))
            .link(Link::new("l2", "sw2:1", "core1:2", DiscoverySource::Lldp))
    }

    /// Two disjoint routes sw1 -> sw2: via core1 (LLDP) and via core2 (SNMP)
    fn ring() -> TopologyDocument {
        star()
            .device(up("core2"))
            .interface(Interface::new("sw1:2", "sw1"))
            .interface(Interface::new("sw2:2", "sw2"))
            .interface(Interface::new("core2:1", "core2"))
            .interface(Interface::new("core2:2", "core2"))
            .link(Link::new("l3", "sw1:2", "core2:1", DiscoverySource::Snmp))
            .link(Link::new("l4", "sw2:2", "core2:2", DiscoverySource::Snmp))
    }

    #[test]
    fn star_has_single_two_hop_path() {
        let finder = finder_for(&star());
        let results = finder
            .find_paths(&PathQuery::between_devices("sw1", "sw2").max_hops(3))
            .unwrap();

        assert_eq!(results.len(), 1);
        let path = &results[0];
        assert!(path.is_reachable);
        assert_eq!(path.hop_count, 2);
        assert_eq!(path.device_names(), vec!["sw1", "core1", "sw2"]);
        assert!((path.confidence - 0.81).abs() < 1e-9);
        assert!((path.total_latency_ms - 1.0).abs() < 1e-9);
        assert_eq!(path.hops[1].from_interface.as_str(), "core1:2");
    }

    #[test]
    fn down_core_yields_no_path() {
        let mut doc = star();
        for device in &mut doc.devices {
            if device.id.as_str() == "core1" {
                device.status = DeviceStatus::Down;
            }
        }
        for link in &mut doc.links {
            link.is_up = false;
        }
        let finder = finder_for(&doc);
        let results = finder
            .find_paths(&PathQuery::between_devices("sw1", "sw2").max_hops(3))
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(!results[0].is_reachable);
        assert_eq!(results[0].failure_reason, Some(PathFailure::NoPath));
        assert_eq!(results[0].failure_hop, Some(0));
    }

    #[test]
    fn hop_limit_is_reported() {
        let finder = finder_for(&star());
        let results = finder
            .find_paths(&PathQuery::between_devices("sw1", "sw2").max_hops(1))
            .unwrap();

        assert_eq!(results[0].failure_reason, Some(PathFailure::HopLimitExceeded));
        assert_eq!(results[0].failure_hop, Some(1));
    }

    #[test]
    fn alternatives_are_ranked_by_confidence() {
        let finder = finder_for(&ring());
        let results = finder
            .find_paths(&PathQuery::between_devices("sw1", "sw2"))
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].device_names(), vec!["sw1", "core1", "sw2"]);
        assert_eq!(results[1].device_names(), vec!["sw1", "core2", "sw2"]);
        assert!(results[0].confidence > results[1].confidence);
    }

    #[test]
    fn max_paths_limits_alternatives() {
        let finder = finder_for(&ring());
        let results = finder
            .find_paths(&PathQuery::between_devices("sw1", "sw2").max_paths(1))
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn down_links_are_skipped_only_when_excluded() {
        let mut doc = ring();
        for link in &mut doc.links {
            if link.id.as_str() == "l1" {
                link.is_up = false;
            }
        }
        let finder = finder_for(&doc);

        let excluded = finder
            .find_paths(&PathQuery::between_devices("sw1", "sw2"))
            .unwrap();
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].device_names(), vec!["sw1", "core2", "sw2"]);

        let included = finder
            .find_paths(&PathQuery::between_devices("sw1", "sw2").exclude_down_links(false))
            .unwrap();
        assert_eq!(included.len(), 2);
        assert_eq!(included[0].device_names(), vec!["sw1", "core1", "sw2"]);
    }

    #[test]
    fn results_are_deterministic() {
        let finder = finder_for(&ring());
        let query = PathQuery::between_devices("sw1", "sw2");
        let first = finder.find_paths(&query).unwrap();
        for _ in 0..5 {
            assert_eq!(finder.find_paths(&query).unwrap(), first);
        }
    }

    /// sw1 (vlan 10) -- r1 -- sw2 (vlan 20); r1 must route between the two VLANs
    fn routed() -> TopologyDocument {
        TopologyDocument::new(Utc::now())
            .device(up("sw1"))
            .device(up("sw2"))
            .device(up("r1"))
            .interface(Interface::new("sw1:1", "sw1").with_vlan(10))
            .interface(Interface::new("sw2:1", "sw2").with_vlan(20))
            .interface(Interface::new("r1:a", "r1").with_vlan(10))
            .interface(Interface::new("r1:b", "r1").with_vlan(20))
            .link(Link::new("l1", "sw1:1", "r1:a", DiscoverySource::Lldp))
            .link(Link::new("l2", "sw2:1", "r1:b", DiscoverySource::Lldp))
    }

    #[test]
    fn l3_hops_can_be_forbidden() {
        let finder = finder_for(&routed());
        let results = finder
            .find_paths(&PathQuery::between_devices("sw1", "sw2").include_l3_hops(false))
            .unwrap();
        assert_eq!(results[0].failure_reason, Some(PathFailure::NoPath));
        assert_eq!(results[0].failure_hop, Some(1));
    }

    #[test]
    fn prefer_l2_still_reaches_l3_only_targets() {
        let finder = finder_for(&routed());
        let results = finder
            .find_paths(&PathQuery::between_devices("sw1", "sw2").prefer_l2(true))
            .unwrap();
        assert!(results[0].is_reachable);
        assert!(!results[0].hops[0].routed);
        assert!(results[0].hops[1].routed);
    }

    #[test]
    fn prefer_l2_favours_switched_detour() {
        // a three-hop all-vlan-10 detour sw1 -> x -> y -> sw2b
        let doc = routed()
            .device(up("x"))
            .device(up("y"))
            .interface(Interface::new("sw1:2", "sw1").with_vlan(10))
            .interface(Interface::new("x:1", "x").with_vlan(10))
            .interface(Interface::new("x:2", "x").with_vlan(10))
            .interface(Interface::new("y:1", "y").with_vlan(10))
            .interface(Interface::new("y:2", "y").with_vlan(10))
            .interface(Interface::new("sw2:2", "sw2").with_vlan(10))
            .link(Link::new("l3", "sw1:2", "x:1", DiscoverySource::Lldp))
            .link(Link::new("l4", "x:2", "y:1", DiscoverySource::Lldp))
            .link(Link::new("l5", "y:2", "sw2:2", DiscoverySource::Lldp));
        let finder = finder_for(&doc).with_settings(PathSettings {
            default_max_hops: 8,
            max_paths: 3,
            l3_penalty: 2,
            default_hop_latency_ms: 0.5,
        });

        let unbiased = finder
            .find_paths(&PathQuery::between_devices("sw1", "sw2"))
            .unwrap();
        assert_eq!(unbiased[0].device_names(), vec!["sw1", "r1", "sw2"]);

        let biased = finder
            .find_paths(&PathQuery::between_devices("sw1", "sw2").prefer_l2(true))
            .unwrap();
        assert_eq!(biased[0].device_names(), vec!["sw1", "x", "y", "sw2"]);
        assert!(biased[0].hops.iter().all(|h| !h.routed));
    }

    #[test]
    fn interface_endpoints_pin_the_exit() {
        let finder = finder_for(&ring());
        let query = PathQuery::new(Endpoint::interface("sw1:2"), Endpoint::device("sw2"));
        let results = finder.find_paths(&query).unwrap();
        assert_eq!(results[0].device_names(), vec!["sw1", "core2", "sw2"]);
        assert_eq!(results[0].hops[0].from_interface.as_str(), "sw1:2");
    }

    #[test]
    fn same_device_is_zero_hops() {
        let finder = finder_for(&star());
        let results = finder
            .find_paths(&PathQuery::between_devices("sw1", "sw1"))
            .unwrap();
        assert!(results[0].is_reachable);
        assert_eq!(results[0].hop_count, 0);
        assert_eq!(results[0].device_names(), vec!["sw1"]);
    }

    #[test]
    fn parallel_reports_share_one_hop() {
        let doc = star().link(Link::new("l0", "core1:1", "sw1:1", DiscoverySource::Cdp));
        let finder = finder_for(&doc);
        let results = finder
            .find_paths(&PathQuery::between_devices("sw1", "sw2"))
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].hops[0].link.as_str(), "l0");
        assert!((results[0].hops[0].confidence - 0.985).abs() < 1e-9);
    }

    #[test]
    fn measured_latency_and_speed_drive_hop_latency() {
        let mut doc = star();
        for link in &mut doc.links {
            match link.id.as_str() {
                "l1" => link.latency_ms = Some(2.0),
                _ => link.speed_mbps = Some(1000),
            }
        }
        let finder = finder_for(&doc);
        let path = &finder
            .find_paths(&PathQuery::between_devices("sw1", "sw2"))
            .unwrap()[0];
        assert!((path.hops[0].latency_ms - 2.0).abs() < 1e-9);
        // 0.5 ms + 12000 bits at 1 Gb/s
        assert!((path.hops[1].latency_ms - 0.512).abs() < 1e-9);
    }

    #[test]
    fn structural_errors_are_returned() {
        let finder = finder_for(&star());
        assert!(matches!(
            finder.find_paths(&PathQuery::between_devices("sw1", "ghost")),
            Err(TopologyError::UnknownEntity { .. })
        ));
        assert!(matches!(
            finder.find_paths(&PathQuery::between_devices("sw1", "sw2").max_hops(0)),
            Err(TopologyError::InvalidConstraint(_))
        ));
    }

    #[test]
    fn query_uses_snapshot_pinned_at_start() {
        let finder = finder_for(&star());
        let pinned = finder.store().snapshot();
        finder
            .store()
            .apply_discovery_update(crate::topology::DiscoveryUpdate::new().remove_link("l2"))
            .unwrap();

        let query = PathQuery::between_devices("sw1", "sw2");
        assert!(finder.find_paths_in(&pinned, &query).unwrap()[0].is_reachable);
        assert!(!finder.find_paths(&query).unwrap()[0].is_reachable);
    }

    /// Random mesh: device i gets interface `d{i}:{j}` for every edge (i, j)
    fn mesh(edges: &[(usize, usize, bool)]) -> TopologyDocument {
        let mut doc = TopologyDocument::new(Utc::now());
        for i in 0..6 {
            doc = doc.device(up(&format!("d{}", i)));
        }
        let mut seen = std::collections::BTreeSet::new();
        for (n, &(a, b, is_up)) in edges.iter().enumerate() {
            let (a, b) = (a.min(b), a.max(b));
            if a == b || !seen.insert((a, b)) {
                continue;
            }
            let ia = format!("d{}:{}", a, b);
            let ib = format!("d{}:{}", b, a);
            doc = doc
                .interface(Interface::new(ia.as_str(), format!("d{}", a)))
                .interface(Interface::new(ib.as_str(), format!("d{}", b)))
                .link(Link::new(format!("l{}", n), ia, ib, DiscoverySource::Lldp).with_up(is_up));
        }
        doc
    }

    proptest! {
        #[test]
        fn paths_respect_constraints(
            edges in proptest::collection::vec((0usize..6, 0usize..6, proptest::bool::weighted(0.8)), 0..14),
            max_hops in 1u32..5,
            target in 1usize..6,
        ) {
            let doc = mesh(&edges);
            let finder = finder_for(&doc);
            let query = PathQuery::between_devices("d0", format!("d{}", target)).max_hops(max_hops);
            let snapshot = finder.store().snapshot();

            let results = finder.find_paths(&query).unwrap();
            prop_assert!(!results.is_empty());
            prop_assert_eq!(&results, &finder.find_paths(&query).unwrap());

            for path in results.iter().filter(|p| p.is_reachable) {
                prop_assert!(path.hop_count <= max_hops as usize);
                let unique: std::collections::BTreeSet<_> = path.devices.iter().collect();
                prop_assert_eq!(unique.len(), path.devices.len());
                for hop in &path.hops {
                    prop_assert!(snapshot.link(hop.link.as_str()).unwrap().is_up);
                }
            }
        }
    }
}
