// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Process-wide controller state.
//!
//! Built once at startup and handed by `Arc` into every task; nothing
//! here is reachable through ambient singletons, so tests wire mock
//! switch handles into the same structures the live controller uses.
//!
//! Locking stays coarse: writers take a short write lock, readers a
//! snapshot, and no lock is ever held across a socket write. Session
//! output goes through per-switch unbounded channels drained by a
//! writer task.

use classify::ClassificationTable;
use config::ControllerConfig;
use openflow::{Message, PortDesc};
use routing::{DpId, FplfEngine, MacTable, PortNo, Topology};
use stats::{EnergyMonitor, PowerModel, StatsDb};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

#[allow(unused)]
use tracing::{debug, info, warn};

/// Outbound handle of one connected switch session.
#[derive(Debug)]
pub struct SwitchHandle {
    tx: tokio::sync::mpsc::UnboundedSender<Message>,
    /// Ports as last described by the switch.
    pub ports: HashMap<PortNo, PortDesc>,
}

impl SwitchHandle {
    #[must_use]
    pub fn new(tx: tokio::sync::mpsc::UnboundedSender<Message>) -> SwitchHandle {
        SwitchHandle {
            tx,
            ports: HashMap::new(),
        }
    }

    /// Queue a message for the session writer. Errors (a torn-down
    /// session) are logged and swallowed; the next packet-in retries.
    pub fn send(&self, dp: DpId, msg: Message) {
        if self.tx.send(msg).is_err() {
            warn!("switch {dp:#x}: write channel closed, message dropped");
        }
    }

    /// Data ports currently up, lowest first.
    #[must_use]
    pub fn data_ports(&self) -> Vec<PortNo> {
        let mut ports: Vec<PortNo> = self
            .ports
            .values()
            .filter(|desc| desc.is_data_port() && desc.is_up())
            .map(|desc| desc.port_no)
            .collect();
        ports.sort_unstable();
        ports
    }
}

/// Counters for events that are logged sparsely.
#[derive(Debug, Default)]
pub struct Counters {
    pub packets_in: AtomicU64,
    pub parse_errors: AtomicU64,
    pub no_route: AtomicU64,
    pub flows_installed: AtomicU64,
}

/// Everything the controller's tasks share.
pub struct ControllerState {
    pub config: ControllerConfig,
    pub classifier: ClassificationTable,
    pub engine: FplfEngine,
    pub topology: RwLock<Topology>,
    pub macs: RwLock<MacTable>,
    pub switches: RwLock<HashMap<DpId, SwitchHandle>>,
    pub stats: RwLock<StatsDb>,
    pub energy: Mutex<EnergyMonitor>,
    pub counters: Counters,
    /// Set once the static fallback map was applied.
    pub fallback_applied: AtomicBool,
    next_xid: AtomicU32,
}

impl ControllerState {
    #[must_use]
    pub fn new(config: ControllerConfig, classifier: ClassificationTable) -> ControllerState {
        let engine = FplfEngine {
            weight_by_utilization: config.weight_by_utilization,
        };
        let power = PowerModel {
            active_watts: config.power_active_watts,
            idle_watts: config.power_idle_watts,
            active_threshold_bytes: config.active_port_threshold_bytes,
        };
        ControllerState {
            config,
            classifier,
            engine,
            topology: RwLock::new(Topology::new()),
            macs: RwLock::new(MacTable::new()),
            switches: RwLock::new(HashMap::new()),
            stats: RwLock::new(StatsDb::new()),
            energy: Mutex::new(EnergyMonitor::new(power)),
            counters: Counters::default(),
            fallback_applied: AtomicBool::new(false),
            next_xid: AtomicU32::new(1),
        }
    }

    /// Fresh transaction id for an outbound request.
    pub fn next_xid(&self) -> u32 {
        self.next_xid.fetch_add(1, Ordering::Relaxed)
    }

    /// Queue `msg` toward switch `dp`, if its session is up.
    pub fn send(&self, dp: DpId, msg: Message) {
        let switches = self.switches.read().unwrap_or_else(|e| e.into_inner());
        match switches.get(&dp) {
            Some(handle) => handle.send(dp, msg),
            None => debug!("switch {dp:#x} not connected, message dropped"),
        }
    }

    /// Connected switch ids, ascending.
    #[must_use]
    pub fn switch_ids(&self) -> Vec<DpId> {
        let switches = self.switches.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<DpId> = switches.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Tear down every trace of a disconnected switch.
    pub fn forget_switch(&self, dp: DpId) {
        self.switches
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&dp);
        self.topology
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove_switch(dp);
        self.macs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove_switch(dp);
        self.stats
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove_switch(dp);
        self.energy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove_switch(dp);
        info!("switch {dp:#x} removed");
    }
}
