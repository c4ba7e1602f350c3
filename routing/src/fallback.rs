// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Static topology maps for when link discovery yields nothing.
//!
//! The emulated testbeds sometimes swallow LLDP; after a grace period
//! with switches connected but zero links discovered, the controller
//! loads the map matching the connected switch count. Port numbering
//! follows the emulator's convention of handing hosts the low port
//! numbers first.

use crate::topology::Topology;
use crate::{DpId, PortNo};

#[allow(unused)]
use tracing::{info, warn};

/// Assumed capacity of mapped links.
pub const DEFAULT_CAPACITY_BPS: f64 = 100e6;

/// One directed link of a static map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticLink {
    pub src: DpId,
    pub src_port: PortNo,
    pub dst: DpId,
    pub dst_port: PortNo,
    pub capacity_bps: f64,
}

/// Both directions of a symmetric cable between two switch ports.
fn pair(a: DpId, a_port: PortNo, b: DpId, b_port: PortNo) -> [StaticLink; 2] {
    [
        StaticLink {
            src: a,
            src_port: a_port,
            dst: b,
            dst_port: b_port,
            capacity_bps: DEFAULT_CAPACITY_BPS,
        },
        StaticLink {
            src: b,
            src_port: b_port,
            dst: a,
            dst_port: a_port,
            capacity_bps: DEFAULT_CAPACITY_BPS,
        },
    ]
}

/// The built-in map for `switch_count` connected switches.
///
/// Known demo layouts get their exact wiring; anything else falls back
/// to a daisy chain over consecutive datapath ids.
#[must_use]
pub fn builtin_map(switch_count: usize) -> Vec<StaticLink> {
    match switch_count {
        4 => {
            // multi-path demo: s1/s2 carry two hosts each, s3/s4 one
            let mut links = Vec::new();
            links.extend(pair(1, 3, 2, 3));
            links.extend(pair(1, 4, 3, 2));
            links.extend(pair(2, 4, 4, 2));
            links.extend(pair(3, 3, 4, 3));
            links.extend(pair(1, 5, 4, 4));
            links
        }
        2 => pair(1, 2, 2, 2).to_vec(),
        3 => {
            let mut links = Vec::new();
            links.extend(pair(1, 2, 2, 2));
            links.extend(pair(2, 3, 3, 2));
            links
        }
        n => {
            // daisy chain: each switch keeps its low ports for hosts
            let mut links = Vec::new();
            for i in 1..n as DpId {
                links.extend(pair(i, (i + 1) as PortNo, i + 1, i as PortNo));
            }
            links
        }
    }
}

/// Replace the topology's links with `map`.
pub fn apply_map(topology: &mut Topology, map: &[StaticLink]) {
    topology.clear_links();
    for link in map {
        topology.add_link(
            link.src,
            link.src_port,
            link.dst,
            link.dst_port,
            link.capacity_bps,
        );
    }
    info!(
        "static topology applied: {} switches, {} links",
        topology.switch_count(),
        topology.link_count()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fplf::FplfEngine;

    #[test]
    fn four_switch_map_is_symmetric_and_multipath() {
        let map = builtin_map(4);
        assert_eq!(map.len(), 10);
        for link in &map {
            assert!(
                map.iter().any(|other| other.src == link.dst
                    && other.dst == link.src
                    && other.src_port == link.dst_port),
                "missing reverse of {link:?}"
            );
        }
    }

    #[test]
    fn applied_map_routes_between_all_pairs() {
        let mut topology = Topology::new();
        apply_map(&mut topology, &builtin_map(4));
        let engine = FplfEngine::default();
        for src in 1..=4 {
            for dst in 1..=4 {
                assert!(engine.find(&topology, src, dst, 0).is_ok(), "{src}->{dst}");
            }
        }
    }

    #[test]
    fn mapped_ports_become_inter_switch() {
        let mut topology = Topology::new();
        apply_map(&mut topology, &builtin_map(2));
        assert!(topology.is_inter_switch(1, 2));
        assert!(topology.is_inter_switch(2, 2));
        assert!(!topology.is_inter_switch(1, 1));
    }

    #[test]
    fn unknown_counts_daisy_chain() {
        let map = builtin_map(5);
        assert_eq!(map.len(), 8);
        let mut topology = Topology::new();
        apply_map(&mut topology, &map);
        let engine = FplfEngine::default();
        let route = engine.find(&topology, 1, 5, 0).unwrap();
        assert_eq!(route.switches, vec![1, 2, 3, 4, 5]);
    }
}
