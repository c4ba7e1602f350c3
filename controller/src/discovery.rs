// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Link discovery, and the static fallback when it produces nothing.
//!
//! Every cycle the controller injects one LLDP announcement per
//! (switch, data port); an announcement surfacing as a packet-in on
//! another switch pins down one directed link. If the emulated fabric
//! swallows LLDP, a grace timer loads the static map matching the
//! connected switch count. Rules installed under the old (empty)
//! topology are then suspect, so the same sweep clears the MAC
//! directory and resets every flow table.

use crate::installer;
use crate::state::ControllerState;
use bytes::Bytes;
use net::{LldpAnnouncement, Mac};
use openflow::{Message, PacketOut, port_no};
use routing::fallback::{self, StaticLink};
use routing::{DpId, PortNo};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[allow(unused)]
use tracing::{debug, info, warn};

/// Cadence of LLDP injection.
pub const LLDP_INTERVAL: Duration = Duration::from_secs(5);

/// Capacity assumed when the port does not report a current speed.
const FALLBACK_CAPACITY_BPS: f64 = 100e6;

/// Inject one LLDP announcement per data port of every switch.
pub fn emit_announcements(state: &ControllerState) {
    let targets: Vec<(DpId, Vec<(PortNo, Mac)>)> = {
        let switches = state.switches.read().unwrap_or_else(|e| e.into_inner());
        switches
            .iter()
            .map(|(dp, handle)| {
                let ports = handle
                    .data_ports()
                    .into_iter()
                    .filter_map(|port| {
                        handle.ports.get(&port).map(|desc| (port, desc.hw_addr))
                    })
                    .collect();
                (*dp, ports)
            })
            .collect()
    };
    for (dp, ports) in targets {
        for (port, hw_addr) in ports {
            let frame = LldpAnnouncement {
                datapath_id: dp,
                port_no: port,
            }
            .encode_frame(hw_addr);
            state.send(
                dp,
                Message::PacketOut {
                    xid: state.next_xid(),
                    packet_out: PacketOut::from_payload(
                        port_no::CONTROLLER,
                        port,
                        Bytes::from(frame),
                    ),
                },
            );
        }
    }
}

/// An announcement for (`origin`, `origin_port`) arrived on
/// (`dp`, `in_port`): that is one directed link, end to end.
pub fn handle_announcement(
    state: &ControllerState,
    dp: DpId,
    in_port: PortNo,
    announcement: &LldpAnnouncement,
) {
    let origin = announcement.datapath_id;
    let origin_port = announcement.port_no;
    if origin == dp {
        return; // reflected frame
    }

    let capacity = port_speed_bps(state, origin, origin_port).unwrap_or(FALLBACK_CAPACITY_BPS);
    {
        let mut topology = state.topology.write().unwrap_or_else(|e| e.into_inner());
        topology.add_link(origin, origin_port, dp, in_port, capacity);
    }
    // both endpoints just became inter-switch ports; host entries
    // learned there are no longer trustworthy
    {
        let mut macs = state.macs.write().unwrap_or_else(|e| e.into_inner());
        macs.invalidate_port(origin, origin_port);
        macs.invalidate_port(dp, in_port);
    }
    info!("link discovered: s{origin}:{origin_port} -> s{dp}:{in_port}");
}

fn port_speed_bps(state: &ControllerState, dp: DpId, port: PortNo) -> Option<f64> {
    let switches = state.switches.read().unwrap_or_else(|e| e.into_inner());
    let desc = switches.get(&dp)?.ports.get(&port)?;
    if desc.curr_speed > 0 {
        // openflow reports port speed in kb/s
        Some(f64::from(desc.curr_speed) * 1000.0)
    } else {
        None
    }
}

/// Grace-timer check: with two or more switches connected and not a
/// single link discovered, load the static map, wipe the MAC
/// directory and reset every flow table.
///
/// Returns true when the fallback was applied.
pub fn apply_fallback_if_needed(state: &ControllerState) -> bool {
    if state.fallback_applied.load(Ordering::SeqCst) {
        return false;
    }
    let switch_count = {
        let topology = state.topology.read().unwrap_or_else(|e| e.into_inner());
        if topology.link_count() > 0 {
            return false;
        }
        topology.switch_count()
    };
    if switch_count < 2 {
        return false;
    }

    let map: Vec<StaticLink> = match &state.config.static_topology_map {
        Some(configured) => configured
            .iter()
            .map(|link| StaticLink {
                src: link.src,
                src_port: link.src_port,
                dst: link.dst,
                dst_port: link.dst_port,
                capacity_bps: link.capacity_bps,
            })
            .collect(),
        None => fallback::builtin_map(switch_count),
    };

    warn!(
        "link discovery produced nothing for {switch_count} switches, \
         loading static map ({} links)",
        map.len()
    );
    {
        let mut topology = state.topology.write().unwrap_or_else(|e| e.into_inner());
        fallback::apply_map(&mut topology, &map);
    }
    // relearn everything: locations learned under the linkless view
    // may sit on what are now inter-switch ports, and installed rules
    // may forward into the wrong fabric
    state
        .macs
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .clear();
    installer::reset_all(state);
    state.fallback_applied.store(true, Ordering::SeqCst);
    true
}
