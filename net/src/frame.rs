// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A tagged view over one packet-in frame.
//!
//! The handler pattern-matches a [`Frame`] instead of sniffing raw
//! ethertypes; each variant carries exactly the fields forwarding
//! needs. IPv4/IPv6 and transport headers are dissected with
//! `etherparse`; ARP and LLDP are decoded by the sibling modules.

use crate::arp::{ArpError, ArpPacket};
use crate::eth::{EtherType, Mac};
use crate::lldp::{LldpAnnouncement, LldpError};
use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use std::net::{Ipv4Addr, Ipv6Addr};

const ETH_HEADER_LEN: usize = 14;

/// Transport-layer summary of an IP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp { src_port: u16, dst_port: u16 },
    Udp { src_port: u16, dst_port: u16 },
    Icmp,
    Other(u8),
}

impl Transport {
    /// Destination port, 0 where the transport has none.
    #[must_use]
    pub fn dst_port(&self) -> u16 {
        match self {
            Transport::Tcp { dst_port, .. } | Transport::Udp { dst_port, .. } => *dst_port,
            Transport::Icmp | Transport::Other(_) => 0,
        }
    }
}

/// Parsed body of a frame, one variant per layer the handler acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePayload {
    Lldp(LldpAnnouncement),
    Arp(ArpPacket),
    Ipv4 {
        src: Ipv4Addr,
        dst: Ipv4Addr,
        transport: Transport,
    },
    Ipv6 {
        src: Ipv6Addr,
        dst: Ipv6Addr,
        transport: Transport,
    },
    Other,
}

/// One decoded ethernet frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub src: Mac,
    pub dst: Mac,
    pub ethertype: EtherType,
    pub payload: FramePayload,
}

/// Errors decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame truncated: {0} bytes")]
    Truncated(usize),
    #[error(transparent)]
    Arp(#[from] ArpError),
    #[error(transparent)]
    Lldp(#[from] LldpError),
    #[error("ip dissection failed: {0}")]
    Ip(#[from] etherparse::err::packet::SliceError),
}

impl Frame {
    /// Decode a raw frame as delivered by a packet-in.
    pub fn decode(data: &[u8]) -> Result<Frame, FrameError> {
        if data.len() < ETH_HEADER_LEN {
            return Err(FrameError::Truncated(data.len()));
        }
        let mut dst = [0u8; 6];
        dst.copy_from_slice(&data[0..6]);
        let mut src = [0u8; 6];
        src.copy_from_slice(&data[6..12]);
        let raw_type = u16::from_be_bytes([data[12], data[13]]);
        let ethertype = EtherType::from(raw_type);
        let body = &data[ETH_HEADER_LEN..];

        let payload = match ethertype {
            EtherType::Lldp => FramePayload::Lldp(LldpAnnouncement::decode(body)?),
            EtherType::Arp => FramePayload::Arp(ArpPacket::decode(body)?),
            EtherType::Ipv4 | EtherType::Ipv6 => dissect_ip(raw_type, body)?,
            EtherType::Other(_) => FramePayload::Other,
        };

        Ok(Frame {
            src: Mac(src),
            dst: Mac(dst),
            ethertype,
            payload,
        })
    }
}

fn dissect_ip(raw_type: u16, body: &[u8]) -> Result<FramePayload, FrameError> {
    let sliced = SlicedPacket::from_ether_type(etherparse::EtherType(raw_type), body)?;
    let transport = match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => Transport::Tcp {
            src_port: tcp.source_port(),
            dst_port: tcp.destination_port(),
        },
        Some(TransportSlice::Udp(udp)) => Transport::Udp {
            src_port: udp.source_port(),
            dst_port: udp.destination_port(),
        },
        Some(TransportSlice::Icmpv4(_) | TransportSlice::Icmpv6(_)) => Transport::Icmp,
        None => Transport::Other(ip_protocol(&sliced)),
    };
    match &sliced.net {
        Some(NetSlice::Ipv4(ip)) => Ok(FramePayload::Ipv4 {
            src: ip.header().source_addr(),
            dst: ip.header().destination_addr(),
            transport,
        }),
        Some(NetSlice::Ipv6(ip)) => Ok(FramePayload::Ipv6 {
            src: ip.header().source_addr(),
            dst: ip.header().destination_addr(),
            transport,
        }),
        _ => Ok(FramePayload::Other),
    }
}

fn ip_protocol(sliced: &SlicedPacket<'_>) -> u8 {
    match &sliced.net {
        Some(NetSlice::Ipv4(ip)) => ip.header().protocol().0,
        Some(NetSlice::Ipv6(ip)) => ip.header().next_header().0,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::PacketBuilder;

    #[test]
    fn decodes_udp_over_ipv4() {
        let builder = PacketBuilder::ethernet2([0, 0, 0, 0, 0, 1], [0, 0, 0, 0, 0, 9])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 9], 64)
            .udp(40000, 5001);
        let mut raw = Vec::new();
        builder.write(&mut raw, &[1, 2, 3]).unwrap();

        let frame = Frame::decode(&raw).unwrap();
        assert_eq!(frame.src, Mac([0, 0, 0, 0, 0, 1]));
        assert_eq!(frame.ethertype, EtherType::Ipv4);
        match frame.payload {
            FramePayload::Ipv4 { src, dst, transport } => {
                assert_eq!(src, Ipv4Addr::new(10, 0, 0, 1));
                assert_eq!(dst, Ipv4Addr::new(10, 0, 0, 9));
                assert_eq!(transport, Transport::Udp { src_port: 40000, dst_port: 5001 });
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn decodes_tcp_over_ipv6() {
        let builder = PacketBuilder::ethernet2([0, 0, 0, 0, 0, 2], [0, 0, 0, 0, 0, 3])
            .ipv6([1; 16], [2; 16], 64)
            .tcp(1234, 22, 0, 1024);
        let mut raw = Vec::new();
        builder.write(&mut raw, &[]).unwrap();

        let frame = Frame::decode(&raw).unwrap();
        match frame.payload {
            FramePayload::Ipv6 { transport, .. } => {
                assert_eq!(transport.dst_port(), 22);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn decodes_arp_request_frame() {
        let arp = ArpPacket {
            op: crate::arp::ArpOp::Request,
            sender_mac: Mac([0, 0, 0, 0, 0, 1]),
            sender_ip: Ipv4Addr::new(10, 0, 0, 1),
            target_mac: Mac::ZERO,
            target_ip: Ipv4Addr::new(10, 0, 0, 7),
        };
        let mut raw = Vec::new();
        raw.extend_from_slice(&Mac::BROADCAST.0);
        raw.extend_from_slice(&[0, 0, 0, 0, 0, 1]);
        raw.extend_from_slice(&EtherType::ARP.to_be_bytes());
        raw.extend_from_slice(&arp.encode());

        let frame = Frame::decode(&raw).unwrap();
        assert_eq!(frame.payload, FramePayload::Arp(arp));
    }

    #[test]
    fn icmp_maps_to_port_zero() {
        let builder = PacketBuilder::ethernet2([0, 0, 0, 0, 0, 1], [0, 0, 0, 0, 0, 9])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 9], 64)
            .icmpv4_echo_request(1, 1);
        let mut raw = Vec::new();
        builder.write(&mut raw, &[]).unwrap();

        let frame = Frame::decode(&raw).unwrap();
        match frame.payload {
            FramePayload::Ipv4 { transport, .. } => {
                assert_eq!(transport, Transport::Icmp);
                assert_eq!(transport.dst_port(), 0);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn short_frame_rejected() {
        assert!(matches!(
            Frame::decode(&[0u8; 10]),
            Err(FrameError::Truncated(10))
        ));
    }

    #[test]
    fn unknown_ethertype_is_other() {
        let mut raw = vec![0u8; 14];
        raw[12] = 0x12;
        raw[13] = 0x34;
        let frame = Frame::decode(&raw).unwrap();
        assert_eq!(frame.ethertype, EtherType::Other(0x1234));
        assert_eq!(frame.payload, FramePayload::Other);
    }
}
