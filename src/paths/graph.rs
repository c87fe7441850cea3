//! Interface-level search graph
//!
//! Nodes are interfaces plus a virtual source and target. Link edges cost one hop,
//! transit edges move between interfaces of the same device for free unless they
//! cross a broadcast domain. Costs compare lexicographically and ties fall back to
//! the node index, so every search over the same snapshot takes the same route.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, VecDeque};

use super::types::PathConstraints;
use crate::config::{PathSettings, REFERENCE_FRAME_BITS};
use crate::models::{DeviceId, Endpoint, InterfaceId, LinkId};
use crate::scoring::ConfidenceScorer;
use crate::error::Result;
use crate::topology::TopologySnapshot;

pub(crate) const SOURCE: usize = 0;
pub(crate) const TARGET: usize = 1;

/// Lexicographic edge/path cost: hop penalty, then uncertainty, then latency.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PathCost {
    pub penalty: u32,
    /// Sum of `-ln(confidence)`; minimising it maximises the confidence product.
    pub uncertainty: f64,
    pub latency: f64,
}

impl PathCost {
    fn add(self, other: PathCost) -> PathCost {
        PathCost {
            penalty: self.penalty.saturating_add(other.penalty),
            uncertainty: self.uncertainty + other.uncertainty,
            latency: self.latency + other.latency,
        }
    }
}

impl PartialEq for PathCost {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PathCost {}

impl Ord for PathCost {
    fn cmp(&self, other: &Self) -> Ordering {
        self.penalty
            .cmp(&other.penalty)
            .then_with(|| self.uncertainty.total_cmp(&other.uncertainty))
            .then_with(|| self.latency.total_cmp(&other.latency))
    }
}

impl PartialOrd for PathCost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EdgeKind {
    Attach,
    /// Index into `SearchGraph::links`
    Link(usize),
    Transit { routed: bool },
    Detach,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Edge {
    pub to: usize,
    pub kind: EdgeKind,
    pub cost: PathCost,
}

impl Edge {
    fn hops(&self) -> u32 {
        match self.kind {
            EdgeKind::Link(_) => 1,
            _ => 0,
        }
    }
}

/// A fused adjacency usable by the search
#[derive(Debug, Clone)]
pub(crate) struct LinkEdge {
    pub link: LinkId,
    pub confidence: f64,
    pub latency_ms: f64,
    pub routed: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct InterfaceNode {
    pub interface: InterfaceId,
    pub device: usize,
}

/// A route through the search graph, SOURCE first and TARGET last
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Route {
    pub cost: PathCost,
    /// Link indices in traversal order; candidates with the same sequence are duplicates.
    pub links: Vec<usize>,
    pub nodes: Vec<usize>,
}

impl Route {
    pub fn hop_count(&self) -> usize {
        self.links.len()
    }
}

/// Min-heap entry. Ordered and compared on (cost, node); `hops` rides along.
#[derive(Debug, Clone, Copy)]
struct Frontier {
    cost: PathCost,
    hops: u32,
    node: usize,
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed for BinaryHeap
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Nodes, devices and edges banned for one spur search
#[derive(Debug, Default)]
struct Exclusions {
    nodes: BTreeSet<usize>,
    devices: BTreeSet<usize>,
    edges: BTreeSet<(usize, usize)>,
}

/// What a hop-unbounded sweep from the source could reach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Sweep {
    /// Fewest links needed to reach the target, if it is reachable at all
    pub target_hops: Option<u32>,
    /// Largest hop depth any reached node needed
    pub deepest_hop: u32,
}

#[derive(Debug)]
pub(crate) struct SearchGraph {
    pub devices: Vec<DeviceId>,
    pub nodes: Vec<Option<InterfaceNode>>,
    pub links: Vec<LinkEdge>,
    adjacency: Vec<Vec<Edge>>,
}

impl SearchGraph {
    /// Build the search graph for one query. `prefer_l2` adds the routed penalty.
    pub fn build(
        snapshot: &TopologySnapshot,
        scorer: &ConfidenceScorer,
        settings: &PathSettings,
        constraints: &PathConstraints,
        source: &Endpoint,
        target: &Endpoint,
        prefer_l2: bool,
    ) -> Result<Self> {
        let exclude_down = constraints.exclude_down_links;
        let routed_penalty = if prefer_l2 { settings.l3_penalty } else { 0 };

        let devices: Vec<DeviceId> = snapshot.devices().map(|d| d.id.clone()).collect();
        let device_index: BTreeMap<&DeviceId, usize> =
            devices.iter().enumerate().map(|(i, id)| (id, i)).collect();

        let mut nodes: Vec<Option<InterfaceNode>> = vec![None, None];
        let mut node_index: BTreeMap<InterfaceId, usize> = BTreeMap::new();
        for interface in snapshot.interfaces() {
            if exclude_down && !interface.is_up() {
                continue;
            }
            let Some(&device) = device_index.get(&interface.device) else {
                continue;
            };
            node_index.insert(interface.id.clone(), nodes.len());
            nodes.push(Some(InterfaceNode {
                interface: interface.id.clone(),
                device,
            }));
        }

        let mut adjacency: Vec<Vec<Edge>> = vec![Vec::new(); nodes.len()];
        let mut links = Vec::new();

        for ((a, b), score) in scorer.score_pairs(snapshot, exclude_down) {
            let (Some(&ia), Some(&ib)) = (node_index.get(&a), node_index.get(&b)) else {
                continue;
            };
            if score.confidence <= 0.0 || node_device(&nodes, ia) == node_device(&nodes, ib) {
                continue;
            }
            let routed = snapshot.interface(a.as_str())?.broadcast_domain()
                != snapshot.interface(b.as_str())?.broadcast_domain();
            if routed && !constraints.include_l3_hops {
                continue;
            }

            let latency_ms = match (score.latency_ms, score.speed_mbps) {
                (Some(ms), _) => ms,
                (None, Some(mbps)) if mbps > 0 => {
                    settings.default_hop_latency_ms + REFERENCE_FRAME_BITS / (mbps as f64 * 1000.0)
                }
                _ => settings.default_hop_latency_ms,
            };
            let cost = PathCost {
                penalty: 1 + if routed { routed_penalty } else { 0 },
                uncertainty: -score.confidence.ln(),
                latency: latency_ms,
            };
            let index = links.len();
            links.push(LinkEdge {
                link: score.representative,
                confidence: score.confidence,
                latency_ms,
                routed,
            });
            for (from, to) in [(ia, ib), (ib, ia)] {
                adjacency[from].push(Edge {
                    to,
                    kind: EdgeKind::Link(index),
                    cost,
                });
            }
        }

        // Endpoint devices are only entered or left through their attach/detach interfaces.
        let source_device = snapshot.endpoint_device(source)?.id.clone();
        let target_device = snapshot.endpoint_device(target)?.id.clone();
        for device in snapshot.devices() {
            if exclude_down && device.status.is_down() {
                continue;
            }
            if device.id == source_device || device.id == target_device {
                continue;
            }
            let members: Vec<(usize, u16)> = device
                .interfaces
                .iter()
                .filter_map(|id| {
                    let node = *node_index.get(id)?;
                    let domain = snapshot.interface(id.as_str()).ok()?.broadcast_domain();
                    Some((node, domain))
                })
                .collect();
            for &(from, from_domain) in &members {
                for &(to, to_domain) in &members {
                    if from == to {
                        continue;
                    }
                    let routed = from_domain != to_domain;
                    if routed && !constraints.include_l3_hops {
                        continue;
                    }
                    adjacency[from].push(Edge {
                        to,
                        kind: EdgeKind::Transit { routed },
                        cost: PathCost {
                            penalty: if routed { routed_penalty } else { 0 },
                            ..PathCost::default()
                        },
                    });
                }
            }
        }

        for interface in snapshot.endpoint_interfaces(source)? {
            if let Some(&node) = node_index.get(&interface.id) {
                adjacency[SOURCE].push(Edge {
                    to: node,
                    kind: EdgeKind::Attach,
                    cost: PathCost::default(),
                });
            }
        }
        for interface in snapshot.endpoint_interfaces(target)? {
            if let Some(&node) = node_index.get(&interface.id) {
                adjacency[node].push(Edge {
                    to: TARGET,
                    kind: EdgeKind::Detach,
                    cost: PathCost::default(),
                });
            }
        }

        for edges in &mut adjacency {
            edges.sort_by_key(|e| e.to);
        }

        Ok(Self {
            devices,
            nodes,
            links,
            adjacency,
        })
    }

    pub fn node(&self, index: usize) -> Option<&InterfaceNode> {
        self.nodes.get(index).and_then(Option::as_ref)
    }

    pub fn edge(&self, from: usize, to: usize) -> Option<&Edge> {
        self.adjacency.get(from)?.iter().find(|e| e.to == to)
    }

    fn device_of(&self, node: usize) -> Option<usize> {
        self.node(node).map(|n| n.device)
    }

    /// Cost and link sequence of a node sequence.
    fn measure(&self, nodes: &[usize]) -> Option<(PathCost, Vec<usize>, u32)> {
        let mut cost = PathCost::default();
        let mut links = Vec::new();
        let mut hops = 0;
        for pair in nodes.windows(2) {
            let edge = self.edge(pair[0], pair[1])?;
            cost = cost.add(edge.cost);
            hops += edge.hops();
            if let EdgeKind::Link(index) = edge.kind {
                links.push(index);
            }
        }
        Some((cost, links, hops))
    }

    fn route(&self, nodes: Vec<usize>) -> Option<Route> {
        let (cost, links, _) = self.measure(&nodes)?;
        Some(Route { cost, links, nodes })
    }

    /// Least-cost route from `start` to TARGET that fits `max_hops`.
    ///
    /// A route never revisits an interface or a device.
    fn shortest(
        &self,
        start: usize,
        start_hops: u32,
        max_hops: u32,
        exclusions: &Exclusions,
    ) -> Option<Vec<usize>> {
        let len = self.nodes.len();
        let mut best: Vec<Option<PathCost>> = vec![None; len];
        let mut prev: Vec<Option<usize>> = vec![None; len];
        let mut settled = vec![false; len];
        let mut heap = BinaryHeap::new();

        best[start] = Some(PathCost::default());
        heap.push(Frontier {
            cost: PathCost::default(),
            hops: start_hops,
            node: start,
        });

        while let Some(Frontier { cost, hops, node }) = heap.pop() {
            if settled[node] {
                continue;
            }
            settled[node] = true;

            if node == TARGET {
                let mut nodes = vec![TARGET];
                let mut current = TARGET;
                while let Some(p) = prev[current] {
                    nodes.push(p);
                    current = p;
                }
                nodes.reverse();
                return Some(nodes);
            }

            for edge in &self.adjacency[node] {
                let next = edge.to;
                if settled[next]
                    || exclusions.nodes.contains(&next)
                    || exclusions.edges.contains(&(node, next))
                {
                    continue;
                }
                let next_hops = hops + edge.hops();
                if next_hops > max_hops {
                    continue;
                }
                if matches!(edge.kind, EdgeKind::Link(_)) {
                    let Some(device) = self.device_of(next) else {
                        continue;
                    };
                    if exclusions.devices.contains(&device)
                        || self.chain_visits(&prev, node, device)
                    {
                        continue;
                    }
                }

                let next_cost = cost.add(edge.cost);
                let improves = match best[next] {
                    None => true,
                    Some(current) => next_cost < current,
                };
                if improves {
                    best[next] = Some(next_cost);
                    prev[next] = Some(node);
                    heap.push(Frontier {
                        cost: next_cost,
                        hops: next_hops,
                        node: next,
                    });
                }
            }
        }

        None
    }

    /// Whether the route ending at `node` already passed through `device`.
    fn chain_visits(&self, prev: &[Option<usize>], node: usize, device: usize) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if self.device_of(n) == Some(device) {
                return true;
            }
            current = prev[n];
        }
        false
    }

    /// Up to `k` loopless routes in ascending cost (Yen's algorithm).
    pub fn k_shortest(&self, k: usize, max_hops: u32) -> Vec<Route> {
        let mut accepted: Vec<Route> = Vec::new();
        let Some(first) = self
            .shortest(SOURCE, 0, max_hops, &Exclusions::default())
            .and_then(|nodes| self.route(nodes))
        else {
            return accepted;
        };

        let mut seen: BTreeSet<Vec<usize>> = BTreeSet::new();
        seen.insert(first.links.clone());
        accepted.push(first);
        let mut candidates: BTreeSet<Route> = BTreeSet::new();

        while accepted.len() < k {
            let Some(last) = accepted.last() else {
                break;
            };
            let last_nodes = last.nodes.clone();

            for spur_index in 0..last_nodes.len().saturating_sub(1) {
                let spur = last_nodes[spur_index];
                let root = &last_nodes[..=spur_index];
                let Some((_, _, root_hops)) = self.measure(root) else {
                    continue;
                };

                let mut exclusions = Exclusions::default();
                for route in &accepted {
                    if route.nodes.len() > spur_index + 1 && route.nodes[..=spur_index] == *root {
                        exclusions
                            .edges
                            .insert((spur, route.nodes[spur_index + 1]));
                    }
                }
                let spur_device = self.device_of(spur);
                for &node in &root[..spur_index] {
                    exclusions.nodes.insert(node);
                    if let Some(device) = self.device_of(node).filter(|d| Some(*d) != spur_device) {
                        exclusions.devices.insert(device);
                    }
                }

                let Some(spur_nodes) = self.shortest(spur, root_hops, max_hops, &exclusions) else {
                    continue;
                };
                let mut nodes = root[..spur_index].to_vec();
                nodes.extend(spur_nodes);
                if let Some(route) = self.route(nodes) {
                    if seen.insert(route.links.clone()) {
                        candidates.insert(route);
                    }
                }
            }

            match candidates.pop_first() {
                Some(next) => accepted.push(next),
                None => break,
            }
        }

        accepted
    }

    /// Hop-unbounded reachability sweep from the source (0-1 BFS on hop count).
    pub fn sweep(&self) -> Sweep {
        let mut depth: Vec<Option<u32>> = vec![None; self.nodes.len()];
        let mut queue = VecDeque::new();
        depth[SOURCE] = Some(0);
        queue.push_back(SOURCE);

        while let Some(node) = queue.pop_front() {
            let Some(d) = depth[node] else {
                continue;
            };
            for edge in &self.adjacency[node] {
                let next_depth = d + edge.hops();
                if depth[edge.to].is_some_and(|existing| existing <= next_depth) {
                    continue;
                }
                depth[edge.to] = Some(next_depth);
                if edge.hops() == 0 {
                    queue.push_front(edge.to);
                } else {
                    queue.push_back(edge.to);
                }
            }
        }

        Sweep {
            target_hops: depth[TARGET],
            deepest_hop: depth.iter().flatten().copied().max().unwrap_or(0),
        }
    }
}

fn node_device(nodes: &[Option<InterfaceNode>], index: usize) -> Option<usize> {
    nodes.get(index).and_then(Option::as_ref).map(|n| n.device)
}
