// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Latest-sample store for switch counters.
//!
//! The poller folds every multipart reply in here; each (switch,
//! port) and each (switch, match) keeps only its newest sample, which
//! is all the energy monitor and the operator views need.

use ahash::RandomState;
use openflow::{DatapathId, FlowStatsEntry, PortStats};
use std::collections::HashMap;

#[allow(unused)]
use tracing::{debug, trace};

/// Newest counters per switch.
#[derive(Debug, Default)]
pub struct StatsDb {
    ports: HashMap<(DatapathId, u32), PortStats, RandomState>,
    flows: HashMap<DatapathId, Vec<FlowStatsEntry>, RandomState>,
}

impl StatsDb {
    #[must_use]
    pub fn new() -> StatsDb {
        StatsDb {
            ports: HashMap::with_hasher(RandomState::with_seed(0)),
            flows: HashMap::with_hasher(RandomState::with_seed(0)),
        }
    }

    /// Fold one port-stats reply segment in.
    pub fn record_port_stats(&mut self, dp: DatapathId, stats: Vec<PortStats>) {
        trace!("port stats from {dp:#x}: {} entries", stats.len());
        for entry in stats {
            self.ports.insert((dp, entry.port_no), entry);
        }
    }

    /// Replace the flow sample set of one switch.
    pub fn record_flow_stats(&mut self, dp: DatapathId, entries: Vec<FlowStatsEntry>) {
        trace!("flow stats from {dp:#x}: {} entries", entries.len());
        self.flows.insert(dp, entries);
    }

    /// Newest sample for one port.
    #[must_use]
    pub fn port(&self, dp: DatapathId, port_no: u32) -> Option<&PortStats> {
        self.ports.get(&(dp, port_no))
    }

    /// All port samples, in no particular order.
    pub fn ports(&self) -> impl Iterator<Item = (DatapathId, &PortStats)> + '_ {
        self.ports.iter().map(|((dp, _), stats)| (*dp, stats))
    }

    /// Newest flow sample set for one switch.
    #[must_use]
    pub fn flows(&self, dp: DatapathId) -> &[FlowStatsEntry] {
        self.flows.get(&dp).map_or(&[], Vec::as_slice)
    }

    /// Forget everything about a disconnected switch.
    pub fn remove_switch(&mut self, dp: DatapathId) {
        self.ports.retain(|(owner, _), _| *owner != dp);
        self.flows.remove(&dp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port_sample(port_no: u32, tx_bytes: u64) -> PortStats {
        PortStats {
            port_no,
            tx_bytes,
            ..PortStats::default()
        }
    }

    #[test]
    fn newest_sample_wins() {
        let mut db = StatsDb::new();
        db.record_port_stats(1, vec![port_sample(1, 100)]);
        db.record_port_stats(1, vec![port_sample(1, 250)]);
        assert_eq!(db.port(1, 1).unwrap().tx_bytes, 250);
    }

    #[test]
    fn switch_removal_forgets_samples() {
        let mut db = StatsDb::new();
        db.record_port_stats(1, vec![port_sample(1, 100)]);
        db.record_port_stats(2, vec![port_sample(1, 7)]);
        db.record_flow_stats(1, Vec::new());
        db.remove_switch(1);
        assert!(db.port(1, 1).is_none());
        assert_eq!(db.port(2, 1).unwrap().tx_bytes, 7);
    }

    #[test]
    fn flows_default_to_empty() {
        let db = StatsDb::new();
        assert!(db.flows(9).is_empty());
    }
}
