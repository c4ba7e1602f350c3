// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Shared fixtures for the controller's unit tests: a live
//! [`ControllerState`] with mock switch sessions whose outbound
//! messages are captured for inspection.

use crate::state::{ControllerState, SwitchHandle};
use bytes::Bytes;
use classify::ClassificationTable;
use config::ControllerConfig;
use net::Mac;
use openflow::{Match, Message, PacketIn, PacketInReason, PortDesc};
use routing::{DpId, PortNo};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

pub(crate) fn test_state() -> Arc<ControllerState> {
    state_with(ControllerConfig::default(), ClassificationTable::empty())
}

pub(crate) fn state_with(
    config: ControllerConfig,
    classifier: ClassificationTable,
) -> Arc<ControllerState> {
    Arc::new(ControllerState::new(config, classifier))
}

/// Load a classification table from inline CSV text.
pub(crate) fn classifier_from(text: &str) -> ClassificationTable {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    ClassificationTable::load(file.path()).unwrap()
}

fn port_desc(port_no: PortNo) -> PortDesc {
    PortDesc {
        port_no,
        hw_addr: Mac([0, 0, 0, 0, 0x10, port_no as u8]),
        name: format!("eth{port_no}"),
        config: 0,
        state: 0,
        curr: 0,
        advertised: 0,
        supported: 0,
        peer: 0,
        curr_speed: 0,
        max_speed: 0,
    }
}

/// Register a mock switch session with the given data ports and hand
/// back the capture side of its outbound channel.
pub(crate) fn attach_switch(
    state: &ControllerState,
    dp: DpId,
    ports: &[PortNo],
) -> UnboundedReceiver<Message> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let mut handle = SwitchHandle::new(tx);
    for port in ports {
        handle.ports.insert(*port, port_desc(*port));
    }
    state
        .switches
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .insert(dp, handle);
    state
        .topology
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .add_switch(dp);
    rx
}

/// Everything the mock switch was sent so far.
pub(crate) fn sent(rx: &mut UnboundedReceiver<Message>) -> Vec<Message> {
    let mut messages = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        messages.push(msg);
    }
    messages
}

/// A table-miss style packet-in carrying `data` that arrived on
/// `in_port`, unbuffered.
pub(crate) fn packet_in(in_port: PortNo, data: Vec<u8>) -> PacketIn {
    PacketIn {
        buffer_id: openflow::NO_BUFFER,
        total_len: data.len() as u16,
        reason: PacketInReason::NoMatch,
        table_id: 0,
        cookie: 0,
        match_: Match {
            in_port: Some(in_port),
            ..Match::default()
        },
        data: Bytes::from(data),
    }
}

/// A full ethernet ARP frame.
pub(crate) fn arp_frame(
    op: net::ArpOp,
    src: Mac,
    dst: Mac,
    sender_ip: [u8; 4],
    target_ip: [u8; 4],
) -> Vec<u8> {
    let arp = net::ArpPacket {
        op,
        sender_mac: src,
        sender_ip: sender_ip.into(),
        target_mac: if dst.is_broadcast() { Mac::ZERO } else { dst },
        target_ip: target_ip.into(),
    };
    let mut frame = Vec::new();
    frame.extend_from_slice(&dst.0);
    frame.extend_from_slice(&src.0);
    frame.extend_from_slice(&net::EtherType::ARP.to_be_bytes());
    frame.extend_from_slice(&arp.encode());
    frame
}

/// A UDP-over-IPv4 ethernet frame between two 10.0.0.0/24 hosts.
pub(crate) fn udp_frame(src: Mac, dst: Mac, src_ip: [u8; 4], dst_ip: [u8; 4], dst_port: u16) -> Vec<u8> {
    let builder = etherparse::PacketBuilder::ethernet2(src.0, dst.0)
        .ipv4(src_ip, dst_ip, 64)
        .udp(40000, dst_port);
    let mut frame = Vec::new();
    builder.write(&mut frame, &[0xab; 8]).unwrap();
    frame
}
