// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! ARP over ethernet/IPv4, the only flavor the emulated hosts speak.

use crate::eth::Mac;
use std::net::Ipv4Addr;

const HTYPE_ETHERNET: u16 = 1;
const PTYPE_IPV4: u16 = 0x0800;
const PACKET_LEN: usize = 28;

/// ARP operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOp {
    Request,
    Reply,
    Other(u16),
}

impl From<u16> for ArpOp {
    fn from(value: u16) -> Self {
        match value {
            1 => ArpOp::Request,
            2 => ArpOp::Reply,
            other => ArpOp::Other(other),
        }
    }
}

impl ArpOp {
    #[must_use]
    pub fn as_u16(&self) -> u16 {
        match self {
            ArpOp::Request => 1,
            ArpOp::Reply => 2,
            ArpOp::Other(v) => *v,
        }
    }
}

/// A parsed ARP payload (sender/target hardware and protocol addresses).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    pub op: ArpOp,
    pub sender_mac: Mac,
    pub sender_ip: Ipv4Addr,
    pub target_mac: Mac,
    pub target_ip: Ipv4Addr,
}

/// Errors decoding an ARP payload.
#[derive(Debug, thiserror::Error)]
pub enum ArpError {
    #[error("arp payload truncated: {0} bytes")]
    Truncated(usize),
    #[error("unsupported arp hardware/protocol pair: htype={htype} ptype={ptype:#06x}")]
    Unsupported { htype: u16, ptype: u16 },
}

impl ArpPacket {
    /// Decode an ARP payload (the bytes after the ethernet header).
    pub fn decode(data: &[u8]) -> Result<ArpPacket, ArpError> {
        if data.len() < PACKET_LEN {
            return Err(ArpError::Truncated(data.len()));
        }
        let htype = u16::from_be_bytes([data[0], data[1]]);
        let ptype = u16::from_be_bytes([data[2], data[3]]);
        if htype != HTYPE_ETHERNET || ptype != PTYPE_IPV4 {
            return Err(ArpError::Unsupported { htype, ptype });
        }
        let op = ArpOp::from(u16::from_be_bytes([data[6], data[7]]));
        let mut sha = [0u8; 6];
        sha.copy_from_slice(&data[8..14]);
        let spa = Ipv4Addr::new(data[14], data[15], data[16], data[17]);
        let mut tha = [0u8; 6];
        tha.copy_from_slice(&data[18..24]);
        let tpa = Ipv4Addr::new(data[24], data[25], data[26], data[27]);
        Ok(ArpPacket {
            op,
            sender_mac: Mac(sha),
            sender_ip: spa,
            target_mac: Mac(tha),
            target_ip: tpa,
        })
    }

    /// Encode this ARP payload into its 28-byte wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; PACKET_LEN] {
        let mut buf = [0u8; PACKET_LEN];
        buf[0..2].copy_from_slice(&HTYPE_ETHERNET.to_be_bytes());
        buf[2..4].copy_from_slice(&PTYPE_IPV4.to_be_bytes());
        buf[4] = 6; // hardware address length
        buf[5] = 4; // protocol address length
        buf[6..8].copy_from_slice(&self.op.as_u16().to_be_bytes());
        buf[8..14].copy_from_slice(&self.sender_mac.0);
        buf[14..18].copy_from_slice(&self.sender_ip.octets());
        buf[18..24].copy_from_slice(&self.target_mac.0);
        buf[24..28].copy_from_slice(&self.target_ip.octets());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ArpPacket {
        ArpPacket {
            op: ArpOp::Reply,
            sender_mac: Mac([0, 0, 0, 0, 0, 7]),
            sender_ip: Ipv4Addr::new(10, 0, 0, 7),
            target_mac: Mac([0, 0, 0, 0, 0, 1]),
            target_ip: Ipv4Addr::new(10, 0, 0, 1),
        }
    }

    #[test]
    fn encode_decode() {
        let pkt = sample();
        let decoded = ArpPacket::decode(&pkt.encode()).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn truncated_rejected() {
        let bytes = sample().encode();
        assert!(matches!(
            ArpPacket::decode(&bytes[..20]),
            Err(ArpError::Truncated(20))
        ));
    }

    #[test]
    fn non_ethernet_rejected() {
        let mut bytes = sample().encode();
        bytes[0] = 0;
        bytes[1] = 6; // IEEE 802 hardware type
        assert!(matches!(
            ArpPacket::decode(&bytes),
            Err(ArpError::Unsupported { htype: 6, .. })
        ));
    }
}
