// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! FPLF ("fill preferred link first") path selection.
//!
//! Dijkstra over the topology with edge weight
//!
//! ```text
//!     w(e) = load(e) · (P_max + 1 − priority) + ε
//! ```
//!
//! The multiplier shrinks as priority rises: VIDEO (priority 4) sees
//! load differences amplified ×1 and gravitates to the fewest hops
//! among near-equal paths, while UNKNOWN (priority 0) sees them ×5 and
//! is steered onto the least-loaded path even when it is longer. ε
//! keeps every weight positive so the search always terminates and
//! equal-load graphs reduce to shortest-hop routing.
//!
//! Ties on total weight break toward fewer hops, then toward the
//! lexicographically smaller predecessor, so racing computations of
//! the same flow always produce identical rules.

use crate::topology::Topology;
use crate::{DpId, PortNo};
use ahash::RandomState;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

#[allow(unused)]
use tracing::{debug, info, trace};

/// Keeps weights strictly positive and penalises hop count.
pub const EPSILON: f64 = 1.0;

/// Highest traffic priority the weight formula recognises.
pub const P_MAX: u8 = 4;

/// A computed switch path with the egress port of every non-final hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub switches: Vec<DpId>,
    /// `egress_ports[i]` leaves `switches[i]`; one entry per link, so
    /// one fewer than `switches`.
    pub egress_ports: Vec<PortNo>,
}

impl Route {
    /// Number of links traversed.
    #[must_use]
    pub fn hop_count(&self) -> usize {
        self.egress_ports.len()
    }
}

/// Path computation failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("switch {0} is not in the topology")]
    UnknownSwitch(DpId),
    #[error("no path from switch {0} to switch {1}")]
    NoPath(DpId, DpId),
}

/// The path engine. Holds policy knobs only; all state lives in the
/// [`Topology`] it runs over.
#[derive(Debug, Clone, Copy, Default)]
pub struct FplfEngine {
    /// Weigh `load/capacity` instead of raw load, so a loaded slow
    /// link is penalised in proportion to what it can carry.
    pub weight_by_utilization: bool,
}

#[derive(Debug, PartialEq)]
struct Candidate {
    cost: f64,
    hops: u32,
    node: DpId,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then(self.hops.cmp(&other.hops))
            .then(self.node.cmp(&other.node))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FplfEngine {
    /// Find the FPLF path without touching link loads.
    ///
    /// Deterministic: identical topology and inputs yield an identical
    /// route.
    pub fn find(
        &self,
        topology: &Topology,
        src: DpId,
        dst: DpId,
        priority: u8,
    ) -> Result<Route, RouteError> {
        if !topology.switches().any(|dp| dp == src) {
            return Err(RouteError::UnknownSwitch(src));
        }
        if !topology.switches().any(|dp| dp == dst) {
            return Err(RouteError::UnknownSwitch(dst));
        }
        if src == dst {
            return Ok(Route {
                switches: vec![src],
                egress_ports: Vec::new(),
            });
        }

        let multiplier = f64::from(P_MAX.saturating_add(1) - priority.min(P_MAX));
        let mut best: HashMap<DpId, (f64, u32), RandomState> =
            HashMap::with_hasher(RandomState::with_seed(0));
        let mut prev: HashMap<DpId, (DpId, PortNo), RandomState> =
            HashMap::with_hasher(RandomState::with_seed(0));
        let mut heap = BinaryHeap::new();

        best.insert(src, (0.0, 0));
        heap.push(std::cmp::Reverse(Candidate {
            cost: 0.0,
            hops: 0,
            node: src,
        }));

        while let Some(std::cmp::Reverse(candidate)) = heap.pop() {
            let Some(&(cost, hops)) = best.get(&candidate.node) else {
                continue;
            };
            if candidate.cost.total_cmp(&cost) == Ordering::Greater || candidate.hops > hops {
                continue; // superseded entry
            }
            for (neighbor, ports) in topology.neighbors(candidate.node) {
                let Some((port, weight)) =
                    self.cheapest_port(topology, candidate.node, ports, multiplier)
                else {
                    continue;
                };
                let next_cost = candidate.cost + weight;
                let next_hops = candidate.hops + 1;
                if self.improves(&best, &prev, neighbor, next_cost, next_hops, candidate.node) {
                    best.insert(neighbor, (next_cost, next_hops));
                    prev.insert(neighbor, (candidate.node, port));
                    heap.push(std::cmp::Reverse(Candidate {
                        cost: next_cost,
                        hops: next_hops,
                        node: neighbor,
                    }));
                }
            }
        }

        let mut switches = vec![dst];
        let mut egress_ports = Vec::new();
        let mut cursor = dst;
        while cursor != src {
            let Some(&(parent, port)) = prev.get(&cursor) else {
                return Err(RouteError::NoPath(src, dst));
            };
            switches.push(parent);
            egress_ports.push(port);
            cursor = parent;
        }
        switches.reverse();
        egress_ports.reverse();
        Ok(Route {
            switches,
            egress_ports,
        })
    }

    /// Find the FPLF path and attribute `bandwidth_bps` to every link
    /// on it, so computations later in the same tick already see the
    /// congestion this flow is expected to add.
    pub fn route(
        &self,
        topology: &mut Topology,
        src: DpId,
        dst: DpId,
        priority: u8,
        bandwidth_bps: f64,
    ) -> Result<Route, RouteError> {
        let route = self.find(topology, src, dst, priority)?;
        for (switch, port) in route.switches.iter().zip(&route.egress_ports) {
            topology.add_load_on(*switch, *port, bandwidth_bps);
        }
        Ok(route)
    }

    /// Least-weight parallel link toward one neighbor, ties to the
    /// lowest port number.
    fn cheapest_port(
        &self,
        topology: &Topology,
        src: DpId,
        ports: &[PortNo],
        multiplier: f64,
    ) -> Option<(PortNo, f64)> {
        let effective_load = |load: f64, capacity: f64| {
            if self.weight_by_utilization && capacity > 0.0 {
                load / capacity
            } else {
                load
            }
        };
        ports
            .iter()
            .filter_map(|port| {
                let link = topology.link(src, *port)?;
                let weight =
                    effective_load(link.load_bps, link.capacity_bps) * multiplier + EPSILON;
                Some((*port, weight))
            })
            .min_by(|(pa, wa), (pb, wb)| wa.total_cmp(wb).then(pa.cmp(pb)))
    }

    #[allow(clippy::too_many_arguments)]
    fn improves(
        &self,
        best: &HashMap<DpId, (f64, u32), RandomState>,
        prev: &HashMap<DpId, (DpId, PortNo), RandomState>,
        node: DpId,
        cost: f64,
        hops: u32,
        via: DpId,
    ) -> bool {
        match best.get(&node) {
            None => true,
            Some((old_cost, old_hops)) => match cost.total_cmp(old_cost) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => {
                    hops < *old_hops
                        || (hops == *old_hops
                            && prev.get(&node).is_some_and(|(old_via, _)| via < *old_via))
                }
            },
        }
    }
}

// the weight of one link at a given priority; exposed for tests and
// for operators reasoning about routing decisions in the logs
#[must_use]
pub fn link_weight(load_bps: f64, priority: u8) -> f64 {
    load_bps * f64::from(P_MAX + 1 - priority.min(P_MAX)) + EPSILON
}
