// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The learned-MAC directory: where is this host attached?
//!
//! Entries come exclusively from access ports; the packet handler
//! refuses to learn from inter-switch ports and this table drops any
//! entry whose port later turns out to be one, so a host MAC seen
//! across a trunk can never shadow its real attachment point.

use crate::{DpId, PortNo};
use ahash::RandomState;
use net::Mac;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[allow(unused)]
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
struct MacEntry {
    switch: DpId,
    port: PortNo,
    last_seen: Instant,
}

/// MAC → (switch, access port) directory with inactivity aging.
#[derive(Debug, Default)]
pub struct MacTable {
    entries: HashMap<Mac, MacEntry, RandomState>,
}

impl MacTable {
    #[must_use]
    pub fn new() -> MacTable {
        MacTable {
            entries: HashMap::with_hasher(RandomState::with_seed(0)),
        }
    }

    /// Record `mac` at (`switch`, `port`).
    ///
    /// Idempotent; a different attachment point overwrites the entry
    /// only when the observation is not older than what is stored.
    pub fn learn(&mut self, mac: Mac, switch: DpId, port: PortNo, now: Instant) {
        match self.entries.get_mut(&mac) {
            Some(entry) if entry.switch == switch && entry.port == port => {
                entry.last_seen = entry.last_seen.max(now);
            }
            Some(entry) => {
                if now >= entry.last_seen {
                    debug!("mac {mac} moved: s{}:{} -> s{switch}:{port}", entry.switch, entry.port);
                    *entry = MacEntry {
                        switch,
                        port,
                        last_seen: now,
                    };
                }
            }
            None => {
                self.entries.insert(
                    mac,
                    MacEntry {
                        switch,
                        port,
                        last_seen: now,
                    },
                );
            }
        }
    }

    /// Attachment point of `mac`, if known.
    #[must_use]
    pub fn locate(&self, mac: Mac) -> Option<(DpId, PortNo)> {
        self.entries.get(&mac).map(|e| (e.switch, e.port))
    }

    /// Drop entries idle longer than `max_age`; returns how many.
    pub fn age(&mut self, now: Instant, max_age: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.last_seen) <= max_age);
        before - self.entries.len()
    }

    /// Drop entries referencing (`switch`, `port`), used when the port
    /// is reclassified as inter-switch or goes down.
    pub fn invalidate_port(&mut self, switch: DpId, port: PortNo) {
        self.entries
            .retain(|_, e| !(e.switch == switch && e.port == port));
    }

    /// Drop every entry learned on `switch`.
    pub fn remove_switch(&mut self, switch: DpId) {
        self.entries.retain(|_, e| e.switch != switch);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H1: Mac = Mac([0, 0, 0, 0, 0, 1]);
    const H2: Mac = Mac([0, 0, 0, 0, 0, 2]);

    #[test]
    fn learn_then_locate() {
        let mut table = MacTable::new();
        let now = Instant::now();
        table.learn(H1, 1, 1, now);
        assert_eq!(table.locate(H1), Some((1, 1)));
        assert_eq!(table.locate(H2), None);
    }

    #[test]
    fn newer_observation_moves_entry() {
        let mut table = MacTable::new();
        let now = Instant::now();
        table.learn(H1, 1, 1, now);
        table.learn(H1, 2, 3, now + Duration::from_secs(1));
        assert_eq!(table.locate(H1), Some((2, 3)));
    }

    #[test]
    fn stale_observation_ignored() {
        let mut table = MacTable::new();
        let now = Instant::now();
        table.learn(H1, 1, 1, now + Duration::from_secs(5));
        table.learn(H1, 2, 3, now);
        assert_eq!(table.locate(H1), Some((1, 1)));
    }

    #[test]
    fn aging_removes_idle_entries() {
        let mut table = MacTable::new();
        let now = Instant::now();
        table.learn(H1, 1, 1, now);
        table.learn(H2, 1, 2, now + Duration::from_secs(200));
        let removed = table.age(now + Duration::from_secs(301), Duration::from_secs(300));
        assert_eq!(removed, 1);
        assert_eq!(table.locate(H1), None);
        assert_eq!(table.locate(H2), Some((1, 2)));
    }

    #[test]
    fn port_invalidation_drops_entries() {
        let mut table = MacTable::new();
        let now = Instant::now();
        table.learn(H1, 1, 4, now);
        table.learn(H2, 1, 5, now);
        table.invalidate_port(1, 4);
        assert_eq!(table.locate(H1), None);
        assert_eq!(table.locate(H2), Some((1, 5)));
    }

    #[test]
    fn switch_removal_drops_its_hosts() {
        let mut table = MacTable::new();
        let now = Instant::now();
        table.learn(H1, 1, 1, now);
        table.learn(H2, 2, 1, now);
        table.remove_switch(1);
        assert!(table.locate(H1).is_none());
        assert_eq!(table.len(), 1);
    }
}
