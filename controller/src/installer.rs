// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Writes forwarding state to the switches: per-path flow rules, the
//! baseline rules every switch carries, and the flow-table reset.

use crate::state::ControllerState;
use classify::FlowClass;
use net::{EtherType, Mac};
use openflow::{Action, FlowMod, Match, Message, PacketIn, PacketOut, port_no};
use routing::{DpId, Route};
use std::sync::atomic::Ordering;

#[allow(unused)]
use tracing::{debug, info, warn};

/// Flow-table priority floor for data flows; the class priority is
/// added on top so VIDEO outranks FTP when matches overlap.
const DATA_FLOW_PRIORITY_BASE: u16 = 10;

/// Priority of the proactive ARP punt-and-flood rule.
const ARP_RULE_PRIORITY: u16 = 100;

/// Install the table-miss rule: empty match, everything to the
/// controller unbuffered.
pub fn install_table_miss(state: &ControllerState, dp: DpId) {
    let flow_mod = FlowMod::add(Match::any(), vec![Action::to_controller()], 0, 0);
    state.send(
        dp,
        Message::FlowMod {
            xid: state.next_xid(),
            flow_mod,
        },
    );
}

/// Install the proactive ARP rule: punt to the controller and flood in
/// hardware, so address resolution survives an empty flow table.
pub fn install_arp_rule(state: &ControllerState, dp: DpId) {
    let flow_mod = FlowMod::add(
        Match::ethertype(EtherType::ARP),
        vec![Action::to_controller(), Action::output(port_no::FLOOD)],
        ARP_RULE_PRIORITY,
        0,
    );
    state.send(
        dp,
        Message::FlowMod {
            xid: state.next_xid(),
            flow_mod,
        },
    );
}

/// Wipe one switch back to its baseline: delete everything, then
/// reinstall the table-miss and ARP rules. Afterwards exactly those
/// two rules exist and host-specific state is relearned lazily.
pub fn reset_switch(state: &ControllerState, dp: DpId) {
    state.send(
        dp,
        Message::FlowMod {
            xid: state.next_xid(),
            flow_mod: FlowMod::delete_all(),
        },
    );
    install_table_miss(state, dp);
    install_arp_rule(state, dp);
    info!("switch {dp:#x}: flow table reset to baseline rules");
}

/// Wipe every connected switch.
pub fn reset_all(state: &ControllerState) {
    for dp in state.switch_ids() {
        reset_switch(state, dp);
    }
}

/// Why a computed path could not be written out.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("destination mac {0} no longer resolves on switch {1:#x}")]
    DestinationVanished(Mac, DpId),
}

/// Install direction-specific rules for (`eth_src` → `eth_dst`) along
/// `route` and release the triggering packet from the first hop.
///
/// Rules match the MAC pair only (no ingress port), so they survive
/// path changes of the reverse direction. Per-switch write failures do
/// not roll anything back; unprogrammed hops repair themselves on the
/// next packet-in.
pub fn install_path(
    state: &ControllerState,
    route: &Route,
    eth_src: Mac,
    eth_dst: Mac,
    class: &FlowClass,
    packet_in: &PacketIn,
    in_port: u32,
) -> Result<(), InstallError> {
    let Some(&last) = route.switches.last() else {
        return Ok(());
    };
    let access_port = {
        let macs = state.macs.read().unwrap_or_else(|e| e.into_inner());
        match macs.locate(eth_dst) {
            Some((dp, port)) if dp == last => port,
            _ => return Err(InstallError::DestinationVanished(eth_dst, last)),
        }
    };

    let priority = DATA_FLOW_PRIORITY_BASE + u16::from(class.priority);
    let idle_timeout = state.config.flow_idle_timeout_seconds;
    let match_ = Match::eth_pair(eth_src, eth_dst);

    let mut first_egress = access_port;
    for (i, switch) in route.switches.iter().enumerate() {
        let egress = match route.egress_ports.get(i) {
            Some(port) => *port,
            None => access_port,
        };
        if i == 0 {
            first_egress = egress;
        }
        let flow_mod = FlowMod::add(match_, vec![Action::output(egress)], priority, idle_timeout);
        state.send(
            *switch,
            Message::FlowMod {
                xid: state.next_xid(),
                flow_mod,
            },
        );
    }

    // release the packet that triggered all this from the first hop
    let first = route.switches[0];
    let packet_out = if packet_in.is_buffered() {
        PacketOut::from_buffer(packet_in.buffer_id, in_port, first_egress)
    } else {
        PacketOut::from_payload(in_port, first_egress, packet_in.data.clone())
    };
    state.send(
        first,
        Message::PacketOut {
            xid: state.next_xid(),
            packet_out,
        },
    );

    state.counters.flows_installed.fetch_add(1, Ordering::Relaxed);
    Ok(())
}
