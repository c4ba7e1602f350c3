// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Minimal LLDP encode/decode for link discovery.
//!
//! The controller announces each (datapath, port) out of every switch
//! port and reads the announcements back from packet-ins on the far
//! end; a received announcement therefore identifies one directed
//! link. Only the mandatory TLVs are emitted, with locally-assigned
//! chassis and port identifiers carrying the datapath id and port
//! number in text form.

use crate::eth::{EtherType, Mac};

const TLV_END: u8 = 0;
const TLV_CHASSIS_ID: u8 = 1;
const TLV_PORT_ID: u8 = 2;
const TLV_TTL: u8 = 3;
const SUBTYPE_LOCAL: u8 = 7;
const TTL_SECONDS: u16 = 120;

const CHASSIS_PREFIX: &str = "dpid:";

/// One (datapath, port) link-discovery announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LldpAnnouncement {
    pub datapath_id: u64,
    pub port_no: u32,
}

/// Errors decoding an LLDP payload.
#[derive(Debug, thiserror::Error)]
pub enum LldpError {
    #[error("lldp payload truncated")]
    Truncated,
    #[error("lldp announcement missing {0} tlv")]
    MissingTlv(&'static str),
    #[error("lldp {kind} identifier malformed: {value:?}")]
    BadIdentifier { kind: &'static str, value: String },
}

fn push_tlv(buf: &mut Vec<u8>, tlv_type: u8, value: &[u8]) {
    debug_assert!(value.len() < 512);
    let head = (u16::from(tlv_type) << 9) | (value.len() as u16);
    buf.extend_from_slice(&head.to_be_bytes());
    buf.extend_from_slice(value);
}

impl LldpAnnouncement {
    /// Build the complete ethernet frame carrying this announcement.
    #[must_use]
    pub fn encode_frame(&self, src: Mac) -> Vec<u8> {
        let mut frame = Vec::with_capacity(64);
        frame.extend_from_slice(&Mac::LLDP_MULTICAST.0);
        frame.extend_from_slice(&src.0);
        frame.extend_from_slice(&EtherType::LLDP.to_be_bytes());

        let chassis = format!("{CHASSIS_PREFIX}{:016x}", self.datapath_id);
        let mut value = vec![SUBTYPE_LOCAL];
        value.extend_from_slice(chassis.as_bytes());
        push_tlv(&mut frame, TLV_CHASSIS_ID, &value);

        let port = self.port_no.to_string();
        let mut value = vec![SUBTYPE_LOCAL];
        value.extend_from_slice(port.as_bytes());
        push_tlv(&mut frame, TLV_PORT_ID, &value);

        push_tlv(&mut frame, TLV_TTL, &TTL_SECONDS.to_be_bytes());
        push_tlv(&mut frame, TLV_END, &[]);
        frame
    }

    /// Decode an announcement from an LLDP payload (the bytes after
    /// the ethernet header). Announcements from other LLDP speakers
    /// (non-matching chassis formats) are rejected.
    pub fn decode(payload: &[u8]) -> Result<LldpAnnouncement, LldpError> {
        let mut datapath_id = None;
        let mut port_no = None;
        let mut rest = payload;
        loop {
            if rest.len() < 2 {
                return Err(LldpError::Truncated);
            }
            let head = u16::from_be_bytes([rest[0], rest[1]]);
            let tlv_type = (head >> 9) as u8;
            let len = (head & 0x1ff) as usize;
            rest = &rest[2..];
            if rest.len() < len {
                return Err(LldpError::Truncated);
            }
            let (value, tail) = rest.split_at(len);
            rest = tail;
            match tlv_type {
                TLV_END => break,
                TLV_CHASSIS_ID => {
                    let text = identifier_text("chassis", value)?;
                    let hex = text.strip_prefix(CHASSIS_PREFIX).ok_or_else(|| {
                        LldpError::BadIdentifier {
                            kind: "chassis",
                            value: text.to_string(),
                        }
                    })?;
                    let id = u64::from_str_radix(hex, 16).map_err(|_| {
                        LldpError::BadIdentifier {
                            kind: "chassis",
                            value: text.to_string(),
                        }
                    })?;
                    datapath_id = Some(id);
                }
                TLV_PORT_ID => {
                    let text = identifier_text("port", value)?;
                    let port = text.parse::<u32>().map_err(|_| LldpError::BadIdentifier {
                        kind: "port",
                        value: text.to_string(),
                    })?;
                    port_no = Some(port);
                }
                _ => {}
            }
        }
        Ok(LldpAnnouncement {
            datapath_id: datapath_id.ok_or(LldpError::MissingTlv("chassis id"))?,
            port_no: port_no.ok_or(LldpError::MissingTlv("port id"))?,
        })
    }
}

fn identifier_text<'a>(kind: &'static str, value: &'a [u8]) -> Result<&'a str, LldpError> {
    // subtype octet, then the identifier itself
    let bytes = value.split_first().map(|(_, rest)| rest).unwrap_or(&[]);
    std::str::from_utf8(bytes).map_err(|_| LldpError::BadIdentifier {
        kind,
        value: format!("{bytes:?}"),
    })
}
