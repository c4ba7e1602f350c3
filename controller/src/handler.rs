// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The packet-in pipeline: learn, resolve, route, install.

use crate::discovery;
use crate::installer;
use crate::state::ControllerState;
use bytes::Bytes;
use classify::{FlowClass, FlowKey, Protocol, host_label};
use net::{ArpOp, Frame, FramePayload, Mac, Transport};
use openflow::{Message, PacketIn, PacketOut};
use routing::{DpId, PortNo, Route, RouteError};
use std::net::IpAddr;
use std::sync::atomic::Ordering;
use std::time::Instant;

#[allow(unused)]
use tracing::{debug, info, trace, warn};

/// Handle one packet-in from switch `dp`.
pub fn handle_packet_in(state: &ControllerState, dp: DpId, packet_in: &PacketIn) {
    state.counters.packets_in.fetch_add(1, Ordering::Relaxed);

    let Some(in_port) = packet_in.in_port() else {
        count_parse_error(state, dp, "packet-in without ingress port");
        return;
    };
    let frame = match Frame::decode(&packet_in.data) {
        Ok(frame) => frame,
        Err(e) => {
            count_parse_error(state, dp, &e.to_string());
            return;
        }
    };

    // link discovery traffic never reaches the forwarding pipeline
    if let FramePayload::Lldp(announcement) = &frame.payload {
        discovery::handle_announcement(state, dp, in_port, announcement);
        return;
    }

    learn_source(state, dp, in_port, &frame);

    match &frame.payload {
        FramePayload::Arp(arp) => handle_arp(state, dp, in_port, packet_in, frame.dst, arp.op),
        FramePayload::Ipv4 { src, dst, transport } => handle_ip(
            state,
            dp,
            in_port,
            packet_in,
            &frame,
            IpAddr::V4(*src),
            IpAddr::V4(*dst),
            *transport,
        ),
        FramePayload::Ipv6 { src, dst, transport } => handle_ip(
            state,
            dp,
            in_port,
            packet_in,
            &frame,
            IpAddr::V6(*src),
            IpAddr::V6(*dst),
            *transport,
        ),
        FramePayload::Other => {
            flood(state, dp, in_port, &packet_in.data);
        }
        FramePayload::Lldp(_) => {} // returned above
    }
}

fn count_parse_error(state: &ControllerState, dp: DpId, detail: &str) {
    let seen = state.counters.parse_errors.fetch_add(1, Ordering::Relaxed);
    if seen == 0 {
        debug!("switch {dp:#x}: discarding unparseable packet-in ({detail})");
    }
}

/// Learn the source MAC, but only on access ports: once a port carries
/// a link to another switch, hosts seen through it are transit and
/// must not move in the directory.
fn learn_source(state: &ControllerState, dp: DpId, in_port: PortNo, frame: &Frame) {
    if !frame.src.is_valid_src() {
        return;
    }
    let inter_switch = {
        let topology = state.topology.read().unwrap_or_else(|e| e.into_inner());
        topology.is_inter_switch(dp, in_port)
    };
    if inter_switch {
        trace!("switch {dp:#x}: not learning {} from inter-switch port {in_port}", frame.src);
        return;
    }
    state
        .macs
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .learn(frame.src, dp, in_port, Instant::now());
}

/// ARP: replies toward known hosts are delivered straight to their
/// access port; everything else floods one packet-out per eligible
/// port, so delivery does not depend on switch-side flood behavior.
fn handle_arp(
    state: &ControllerState,
    dp: DpId,
    in_port: PortNo,
    packet_in: &PacketIn,
    eth_dst: Mac,
    op: ArpOp,
) {
    if op == ArpOp::Reply {
        let located = {
            let macs = state.macs.read().unwrap_or_else(|e| e.into_inner());
            macs.locate(eth_dst)
        };
        if let Some((dst_dp, dst_port)) = located {
            debug!("switch {dp:#x}: arp reply for {eth_dst} delivered to s{dst_dp}:{dst_port}");
            state.send(
                dst_dp,
                Message::PacketOut {
                    xid: state.next_xid(),
                    packet_out: PacketOut::from_payload(
                        openflow::port_no::CONTROLLER,
                        dst_port,
                        packet_in.data.clone(),
                    ),
                },
            );
            return;
        }
    }
    flood(state, dp, in_port, &packet_in.data);
}

/// IPv4/IPv6 toward a known destination: classify, route with FPLF,
/// hand off to the installer. Unknown destinations flood.
#[allow(clippy::too_many_arguments)]
fn handle_ip(
    state: &ControllerState,
    dp: DpId,
    in_port: PortNo,
    packet_in: &PacketIn,
    frame: &Frame,
    src_ip: IpAddr,
    dst_ip: IpAddr,
    transport: Transport,
) {
    let located = {
        let macs = state.macs.read().unwrap_or_else(|e| e.into_inner());
        macs.locate(frame.dst)
    };
    let Some((dst_dp, _)) = located else {
        flood(state, dp, in_port, &packet_in.data);
        return;
    };

    let key = flow_key(src_ip, dst_ip, transport);
    let class = state.classifier.lookup(&key);

    let route = {
        let mut topology = state.topology.write().unwrap_or_else(|e| e.into_inner());
        state
            .engine
            .route(&mut topology, dp, dst_dp, class.priority, class.bandwidth_hint)
    };
    let route = match route {
        Ok(route) => route,
        Err(RouteError::NoPath(..) | RouteError::UnknownSwitch(_)) => {
            state.counters.no_route.fetch_add(1, Ordering::Relaxed);
            info!("no route from {dp:#x} to {dst_dp:#x}, flooding");
            flood(state, dp, in_port, &packet_in.data);
            return;
        }
    };

    match installer::install_path(state, &route, frame.src, frame.dst, &class, packet_in, in_port)
    {
        Ok(()) => log_route(&key, &class, &route),
        Err(e) => {
            warn!("path install failed: {e}");
            flood(state, dp, in_port, &packet_in.data);
        }
    }
}

fn flow_key(src_ip: IpAddr, dst_ip: IpAddr, transport: Transport) -> FlowKey {
    let protocol = match transport {
        Transport::Tcp { .. } => Protocol::Tcp,
        Transport::Udp { .. } => Protocol::Udp,
        Transport::Icmp | Transport::Other(_) => Protocol::Other,
    };
    FlowKey {
        src_host: host_label(src_ip),
        dst_host: host_label(dst_ip),
        dst_port: transport.dst_port(),
        protocol,
    }
}

/// The one INFO line per installed path.
fn log_route(key: &FlowKey, class: &FlowClass, route: &Route) {
    let hops: Vec<String> = route.switches.iter().map(|dp| format!("s{dp}")).collect();
    info!(
        "installed {} -> {}:{} ({}) type {} priority {} path {}",
        key.src_host,
        key.dst_host,
        key.dst_port,
        key.protocol,
        class.traffic_type,
        class.priority,
        hops.join(" -> ")
    );
}

/// One packet-out per up data port except the ingress.
fn flood(state: &ControllerState, dp: DpId, in_port: PortNo, data: &Bytes) {
    let ports = {
        let switches = state.switches.read().unwrap_or_else(|e| e.into_inner());
        match switches.get(&dp) {
            Some(handle) => handle.data_ports(),
            None => return,
        }
    };
    for port in ports {
        if port == in_port {
            continue;
        }
        state.send(
            dp,
            Message::PacketOut {
                xid: state.next_xid(),
                packet_out: PacketOut::from_payload(in_port, port, data.clone()),
            },
        );
    }
}
