// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Directed multigraph of switches with per-link load tracking.
//!
//! A link is keyed by its (switch, egress port) pair, so parallel
//! links between the same switch pair coexist on distinct ports.
//! Loads are attributed by the path engine, never go negative, and
//! decay exponentially between ticks so stale congestion does not
//! bias routing forever.

use crate::{DpId, PortNo};
use ahash::RandomState;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};

#[allow(unused)]
use tracing::{debug, info, warn};

/// Loads below this are snapped to zero during decay.
const LOAD_FLOOR_BPS: f64 = 1.0;

#[derive(Debug, Clone)]
struct Link {
    dst: DpId,
    dst_port: PortNo,
    capacity_bps: f64,
    load_bps: f64,
    updated_at: Instant,
}

/// Read-only view of one directed link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkView {
    pub src: DpId,
    pub src_port: PortNo,
    pub dst: DpId,
    pub dst_port: PortNo,
    pub capacity_bps: f64,
    pub load_bps: f64,
}

/// The directed multigraph.
#[derive(Debug)]
pub struct Topology {
    switches: BTreeSet<DpId>,
    links: HashMap<(DpId, PortNo), Link, RandomState>,
    /// src → dst → egress ports, ordered for deterministic walks.
    adjacency: BTreeMap<DpId, BTreeMap<DpId, Vec<PortNo>>>,
    inter_switch: HashSet<(DpId, PortNo), RandomState>,
    last_decay: Instant,
}

impl Default for Topology {
    fn default() -> Self {
        Topology::new()
    }
}

impl Topology {
    #[must_use]
    pub fn new() -> Topology {
        Topology {
            switches: BTreeSet::new(),
            links: HashMap::with_hasher(RandomState::with_seed(0)),
            adjacency: BTreeMap::new(),
            inter_switch: HashSet::with_hasher(RandomState::with_seed(0)),
            last_decay: Instant::now(),
        }
    }

    pub fn add_switch(&mut self, dp: DpId) {
        if self.switches.insert(dp) {
            debug!("topology: switch {dp} added");
        }
    }

    /// Drop a switch and every link touching it.
    pub fn remove_switch(&mut self, dp: DpId) {
        self.switches.remove(&dp);
        let stale: Vec<(DpId, PortNo)> = self
            .links
            .iter()
            .filter(|(key, link)| key.0 == dp || link.dst == dp)
            .map(|(key, _)| *key)
            .collect();
        for key in stale {
            self.remove_link(key.0, key.1);
        }
        self.adjacency.remove(&dp);
    }

    /// Insert (or replace) the directed link out of (`src`, `src_port`).
    pub fn add_link(
        &mut self,
        src: DpId,
        src_port: PortNo,
        dst: DpId,
        dst_port: PortNo,
        capacity_bps: f64,
    ) {
        self.add_switch(src);
        self.add_switch(dst);
        if let Some(old) = self.links.insert(
            (src, src_port),
            Link {
                dst,
                dst_port,
                capacity_bps,
                load_bps: 0.0,
                updated_at: Instant::now(),
            },
        ) {
            // same egress port now points elsewhere; unindex the old edge
            if let Some(ports) = self
                .adjacency
                .get_mut(&src)
                .and_then(|m| m.get_mut(&old.dst))
            {
                ports.retain(|p| *p != src_port);
            }
        }
        let ports = self
            .adjacency
            .entry(src)
            .or_default()
            .entry(dst)
            .or_default();
        if !ports.contains(&src_port) {
            ports.push(src_port);
            ports.sort_unstable();
        }
        self.inter_switch.insert((src, src_port));
        self.inter_switch.insert((dst, dst_port));
        debug!("topology: link s{src}:{src_port} -> s{dst}:{dst_port}");
    }

    pub fn remove_link(&mut self, src: DpId, src_port: PortNo) {
        if let Some(link) = self.links.remove(&(src, src_port)) {
            if let Some(ports) = self
                .adjacency
                .get_mut(&src)
                .and_then(|m| m.get_mut(&link.dst))
            {
                ports.retain(|p| *p != src_port);
            }
            self.inter_switch.remove(&(src, src_port));
            self.inter_switch.remove(&(link.dst, link.dst_port));
            debug!("topology: link s{src}:{src_port} removed");
        }
    }

    /// Drop both directions of whatever was attached to (`dp`, `port`).
    pub fn remove_port(&mut self, dp: DpId, port: PortNo) {
        self.remove_link(dp, port);
        let reverse: Vec<(DpId, PortNo)> = self
            .links
            .iter()
            .filter(|(_, link)| link.dst == dp && link.dst_port == port)
            .map(|(key, _)| *key)
            .collect();
        for key in reverse {
            self.remove_link(key.0, key.1);
        }
    }

    /// Forget every link but keep the switch set.
    pub fn clear_links(&mut self) {
        self.links.clear();
        self.adjacency.clear();
        self.inter_switch.clear();
    }

    #[must_use]
    pub fn switch_count(&self) -> usize {
        self.switches.len()
    }

    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn switches(&self) -> impl Iterator<Item = DpId> + '_ {
        self.switches.iter().copied()
    }

    /// True once a link was established over (`dp`, `port`) on either end.
    #[must_use]
    pub fn is_inter_switch(&self, dp: DpId, port: PortNo) -> bool {
        self.inter_switch.contains(&(dp, port))
    }

    pub fn edges(&self) -> impl Iterator<Item = LinkView> + '_ {
        self.links.iter().map(|((src, src_port), link)| LinkView {
            src: *src,
            src_port: *src_port,
            dst: link.dst,
            dst_port: link.dst_port,
            capacity_bps: link.capacity_bps,
            load_bps: link.load_bps,
        })
    }

    /// Neighbors of `src` with their (sorted) egress ports.
    pub(crate) fn neighbors(&self, src: DpId) -> impl Iterator<Item = (DpId, &[PortNo])> + '_ {
        self.adjacency
            .get(&src)
            .into_iter()
            .flat_map(|m| m.iter().map(|(dst, ports)| (*dst, ports.as_slice())))
    }

    pub(crate) fn link(&self, src: DpId, src_port: PortNo) -> Option<LinkView> {
        self.links.get(&(src, src_port)).map(|link| LinkView {
            src,
            src_port,
            dst: link.dst,
            dst_port: link.dst_port,
            capacity_bps: link.capacity_bps,
            load_bps: link.load_bps,
        })
    }

    /// The least-loaded egress port from `src` to `dst`, ties to the
    /// lowest port number.
    #[must_use]
    pub fn best_egress(&self, src: DpId, dst: DpId) -> Option<PortNo> {
        let ports = self.adjacency.get(&src)?.get(&dst)?;
        ports
            .iter()
            .copied()
            .min_by(|a, b| {
                let la = self.links.get(&(src, *a)).map_or(f64::MAX, |l| l.load_bps);
                let lb = self.links.get(&(src, *b)).map_or(f64::MAX, |l| l.load_bps);
                la.total_cmp(&lb).then(a.cmp(b))
            })
    }

    /// Overwrite the load on every (`src` → `dst`) link.
    pub fn set_load(&mut self, src: DpId, dst: DpId, load_bps: f64) {
        let now = Instant::now();
        let Some(ports) = self.adjacency.get(&src).and_then(|m| m.get(&dst)) else {
            return;
        };
        for port in ports.clone() {
            if let Some(link) = self.links.get_mut(&(src, port)) {
                link.load_bps = load_bps.max(0.0);
                link.updated_at = now;
            }
        }
    }

    /// Add `delta_bps` to the least-loaded (`src` → `dst`) link.
    pub fn add_load(&mut self, src: DpId, dst: DpId, delta_bps: f64) {
        if let Some(port) = self.best_egress(src, dst) {
            self.add_load_on(src, port, delta_bps);
        }
    }

    /// Add `delta_bps` to one specific link.
    pub(crate) fn add_load_on(&mut self, src: DpId, src_port: PortNo, delta_bps: f64) {
        if let Some(link) = self.links.get_mut(&(src, src_port)) {
            link.load_bps = (link.load_bps + delta_bps).max(0.0);
            link.updated_at = Instant::now();
        }
    }

    /// Exponentially decay every link load with time constant `tau`.
    pub fn decay(&mut self, now: Instant, tau: Duration) {
        let elapsed = now.saturating_duration_since(self.last_decay);
        self.last_decay = now;
        if elapsed.is_zero() || tau.is_zero() {
            return;
        }
        let factor = (-elapsed.as_secs_f64() / tau.as_secs_f64()).exp();
        for link in self.links.values_mut() {
            link.load_bps *= factor;
            if link.load_bps < LOAD_FLOOR_BPS {
                link.load_bps = 0.0;
            }
        }
    }
}
