// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The OXM match set used by this controller.
//!
//! Flow rules match eth_src + eth_dst (and eth_type for the ARP
//! baseline rule); packet-ins carry in_port. Everything else in the
//! openflow-basic class is skipped on decode rather than rejected.

use crate::wire::{WireError, need};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use net::Mac;

const OFPMT_OXM: u16 = 1;
const OXM_CLASS_BASIC: u16 = 0x8000;

const OXM_IN_PORT: u8 = 0;
const OXM_ETH_DST: u8 = 3;
const OXM_ETH_SRC: u8 = 4;
const OXM_ETH_TYPE: u8 = 5;

/// A (possibly empty) OXM match.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub in_port: Option<u32>,
    pub eth_src: Option<Mac>,
    pub eth_dst: Option<Mac>,
    pub eth_type: Option<u16>,
}

impl Match {
    /// The empty match (matches every packet).
    #[must_use]
    pub fn any() -> Match {
        Match::default()
    }

    /// Match an (eth_src, eth_dst) host pair.
    #[must_use]
    pub fn eth_pair(src: Mac, dst: Mac) -> Match {
        Match {
            eth_src: Some(src),
            eth_dst: Some(dst),
            ..Match::default()
        }
    }

    /// Match a bare ethertype.
    #[must_use]
    pub fn ethertype(eth_type: u16) -> Match {
        Match {
            eth_type: Some(eth_type),
            ..Match::default()
        }
    }

    fn oxm_payload_len(&self) -> usize {
        let mut len = 0;
        if self.in_port.is_some() {
            len += 4 + 4;
        }
        if self.eth_dst.is_some() {
            len += 4 + 6;
        }
        if self.eth_src.is_some() {
            len += 4 + 6;
        }
        if self.eth_type.is_some() {
            len += 4 + 2;
        }
        len
    }

    /// Encoded size including trailing pad to an 8-byte boundary.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let unpadded = 4 + self.oxm_payload_len();
        unpadded + padding(unpadded)
    }

    pub(crate) fn encode(&self, dst: &mut BytesMut) {
        let unpadded = 4 + self.oxm_payload_len();
        dst.put_u16(OFPMT_OXM);
        dst.put_u16(unpadded as u16);
        if let Some(port) = self.in_port {
            put_oxm_header(dst, OXM_IN_PORT, 4);
            dst.put_u32(port);
        }
        if let Some(mac) = self.eth_dst {
            put_oxm_header(dst, OXM_ETH_DST, 6);
            dst.put_slice(&mac.0);
        }
        if let Some(mac) = self.eth_src {
            put_oxm_header(dst, OXM_ETH_SRC, 6);
            dst.put_slice(&mac.0);
        }
        if let Some(eth_type) = self.eth_type {
            put_oxm_header(dst, OXM_ETH_TYPE, 2);
            dst.put_u16(eth_type);
        }
        dst.put_bytes(0, padding(unpadded));
    }

    pub(crate) fn decode(buf: &mut Bytes) -> Result<Match, WireError> {
        need(buf, 4, "match header")?;
        let match_type = buf.get_u16();
        let length = usize::from(buf.get_u16());
        if match_type != OFPMT_OXM || length < 4 {
            return Err(WireError::Malformed {
                context: "match header",
                detail: format!("type {match_type}, length {length}"),
            });
        }
        let oxm_len = length - 4;
        need(buf, oxm_len + padding(length), "match body")?;
        let mut fields = buf.split_to(oxm_len);
        buf.advance(padding(length));

        let mut m = Match::default();
        while fields.has_remaining() {
            need(&fields, 4, "oxm tlv")?;
            let class = fields.get_u16();
            let field_hm = fields.get_u8();
            let value_len = usize::from(fields.get_u8());
            need(&fields, value_len, "oxm value")?;
            let field = field_hm >> 1;
            let has_mask = field_hm & 1 == 1;
            if class != OXM_CLASS_BASIC || has_mask {
                fields.advance(value_len);
                continue;
            }
            match (field, value_len) {
                (OXM_IN_PORT, 4) => m.in_port = Some(fields.get_u32()),
                (OXM_ETH_DST, 6) => m.eth_dst = Some(get_mac(&mut fields)),
                (OXM_ETH_SRC, 6) => m.eth_src = Some(get_mac(&mut fields)),
                (OXM_ETH_TYPE, 2) => m.eth_type = Some(fields.get_u16()),
                _ => fields.advance(value_len),
            }
        }
        Ok(m)
    }
}

fn put_oxm_header(dst: &mut BytesMut, field: u8, len: u8) {
    dst.put_u16(OXM_CLASS_BASIC);
    dst.put_u8(field << 1);
    dst.put_u8(len);
}

fn get_mac(buf: &mut Bytes) -> Mac {
    let mut octets = [0u8; 6];
    buf.copy_to_slice(&mut octets);
    Mac(octets)
}

pub(crate) fn padding(len: usize) -> usize {
    (8 - len % 8) % 8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(m: Match) -> Match {
        let mut buf = BytesMut::new();
        m.encode(&mut buf);
        assert_eq!(buf.len(), m.encoded_len());
        let mut bytes = buf.freeze();
        let decoded = Match::decode(&mut bytes).unwrap();
        assert!(bytes.is_empty());
        decoded
    }

    #[test]
    fn empty_match_is_eight_bytes() {
        let m = Match::any();
        assert_eq!(m.encoded_len(), 8);
        assert_eq!(round_trip(m), m);
    }

    #[test]
    fn eth_pair_round_trip() {
        let m = Match::eth_pair(Mac([1, 2, 3, 4, 5, 6]), Mac([6, 5, 4, 3, 2, 1]));
        assert_eq!(round_trip(m), m);
    }

    #[test]
    fn in_port_round_trip() {
        let m = Match {
            in_port: Some(3),
            ..Match::default()
        };
        assert_eq!(round_trip(m), m);
    }

    #[test]
    fn unknown_fields_skipped() {
        // in_port followed by ipv4_src (field 11, 4 bytes), which we skip
        let mut buf = BytesMut::new();
        buf.put_u16(OFPMT_OXM);
        buf.put_u16(4 + 8 + 8);
        put_oxm_header(&mut buf, OXM_IN_PORT, 4);
        buf.put_u32(7);
        put_oxm_header(&mut buf, 11, 4);
        buf.put_u32(0x0a00_0001);
        buf.put_bytes(0, padding(4 + 16));
        let mut bytes = buf.freeze();
        let m = Match::decode(&mut bytes).unwrap();
        assert_eq!(m.in_port, Some(7));
        assert_eq!(m.eth_src, None);
    }

    #[test]
    fn bad_match_type_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u16(0); // OFPMT_STANDARD, not supported in 1.3
        buf.put_u16(4);
        buf.put_bytes(0, 4);
        let mut bytes = buf.freeze();
        assert!(Match::decode(&mut bytes).is_err());
    }
}
