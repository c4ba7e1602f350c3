// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Multipart (statistics) requests and replies.
//!
//! The controller periodically asks every switch for flow stats and
//! port stats, and asks once at handshake for the port descriptions;
//! only those three families are modelled. Requests encode and replies
//! decode, each direction being the half the controller uses.

use crate::oxm::Match;
use crate::port::{PORT_DESC_LEN, PortDesc};
use crate::wire::{WireError, need};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const MP_FLOW: u16 = 1;
const MP_PORT_STATS: u16 = 4;
const MP_PORT_DESC: u16 = 13;

/// Reply flag: more reply segments follow for the same request.
const OFPMPF_REPLY_MORE: u16 = 1;

const MP_HEADER_LEN: usize = 8;
const PORT_STATS_LEN: usize = 112;
const FLOW_STATS_FIXED_LEN: usize = 48;

/// Body of a flow-stats request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowStatsRequest {
    pub table_id: u8,
    pub out_port: u32,
    pub out_group: u32,
    pub cookie: u64,
    pub cookie_mask: u64,
    pub match_: Match,
}

impl Default for FlowStatsRequest {
    /// Request every rule in every table.
    fn default() -> Self {
        FlowStatsRequest {
            table_id: crate::TABLE_ALL,
            out_port: crate::port_no::ANY,
            out_group: crate::GROUP_ANY,
            cookie: 0,
            cookie_mask: 0,
            match_: Match::any(),
        }
    }
}

/// Body of a port-stats request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortStatsRequest {
    pub port_no: u32,
}

impl Default for PortStatsRequest {
    /// Request counters for every port.
    fn default() -> Self {
        PortStatsRequest {
            port_no: crate::port_no::ANY,
        }
    }
}

/// One port's counters from a port-stats reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortStats {
    pub port_no: u32,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub duration_sec: u32,
}

/// One rule's counters from a flow-stats reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowStatsEntry {
    pub table_id: u8,
    pub duration_sec: u32,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub cookie: u64,
    pub packet_count: u64,
    pub byte_count: u64,
    pub match_: Match,
}

/// Multipart request bodies the controller emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipartRequestBody {
    PortDesc,
    PortStats(PortStatsRequest),
    FlowStats(FlowStatsRequest),
}

impl MultipartRequestBody {
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        MP_HEADER_LEN
            + match self {
                MultipartRequestBody::PortDesc => 0,
                MultipartRequestBody::PortStats(_) => 8,
                MultipartRequestBody::FlowStats(req) => 32 + req.match_.encoded_len(),
            }
    }

    pub(crate) fn encode(&self, dst: &mut BytesMut) {
        let mp_type = match self {
            MultipartRequestBody::PortDesc => MP_PORT_DESC,
            MultipartRequestBody::PortStats(_) => MP_PORT_STATS,
            MultipartRequestBody::FlowStats(_) => MP_FLOW,
        };
        dst.put_u16(mp_type);
        dst.put_u16(0); // request flags
        dst.put_bytes(0, 4);
        match self {
            MultipartRequestBody::PortDesc => {}
            MultipartRequestBody::PortStats(req) => {
                dst.put_u32(req.port_no);
                dst.put_bytes(0, 4);
            }
            MultipartRequestBody::FlowStats(req) => {
                dst.put_u8(req.table_id);
                dst.put_bytes(0, 3);
                dst.put_u32(req.out_port);
                dst.put_u32(req.out_group);
                dst.put_bytes(0, 4);
                dst.put_u64(req.cookie);
                dst.put_u64(req.cookie_mask);
                req.match_.encode(dst);
            }
        }
    }
}

/// Multipart reply bodies the controller understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartReplyBody {
    PortDesc(Vec<PortDesc>),
    PortStats(Vec<PortStats>),
    FlowStats(Vec<FlowStatsEntry>),
    Other { mp_type: u16 },
}

/// A decoded multipart reply segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartReply {
    pub body: MultipartReplyBody,
    /// More segments of the same reply follow.
    pub more: bool,
}

impl MultipartReply {
    pub(crate) fn encode(&self, dst: &mut BytesMut) {
        let mp_type = match &self.body {
            MultipartReplyBody::PortDesc(_) => MP_PORT_DESC,
            MultipartReplyBody::PortStats(_) => MP_PORT_STATS,
            MultipartReplyBody::FlowStats(_) => MP_FLOW,
            MultipartReplyBody::Other { mp_type } => *mp_type,
        };
        dst.put_u16(mp_type);
        dst.put_u16(if self.more { OFPMPF_REPLY_MORE } else { 0 });
        dst.put_bytes(0, 4);
        match &self.body {
            MultipartReplyBody::PortDesc(ports) => {
                for port in ports {
                    port.encode(dst);
                }
            }
            MultipartReplyBody::PortStats(stats) => {
                for entry in stats {
                    encode_port_stats(entry, dst);
                }
            }
            MultipartReplyBody::FlowStats(entries) => {
                for entry in entries {
                    encode_flow_stats(entry, dst);
                }
            }
            MultipartReplyBody::Other { .. } => {}
        }
    }

    pub(crate) fn decode(buf: &mut Bytes) -> Result<MultipartReply, WireError> {
        need(buf, MP_HEADER_LEN, "multipart header")?;
        let mp_type = buf.get_u16();
        let flags = buf.get_u16();
        buf.advance(4);
        let more = flags & OFPMPF_REPLY_MORE != 0;
        let body = match mp_type {
            MP_PORT_DESC => {
                let mut ports = Vec::with_capacity(buf.remaining() / PORT_DESC_LEN);
                while buf.has_remaining() {
                    ports.push(PortDesc::decode(buf)?);
                }
                MultipartReplyBody::PortDesc(ports)
            }
            MP_PORT_STATS => {
                let mut stats = Vec::with_capacity(buf.remaining() / PORT_STATS_LEN);
                while buf.has_remaining() {
                    stats.push(decode_port_stats(buf)?);
                }
                MultipartReplyBody::PortStats(stats)
            }
            MP_FLOW => {
                let mut entries = Vec::new();
                while buf.has_remaining() {
                    entries.push(decode_flow_stats(buf)?);
                }
                MultipartReplyBody::FlowStats(entries)
            }
            other => MultipartReplyBody::Other { mp_type: other },
        };
        Ok(MultipartReply { body, more })
    }
}

fn encode_port_stats(entry: &PortStats, dst: &mut BytesMut) {
    dst.put_u32(entry.port_no);
    dst.put_bytes(0, 4);
    dst.put_u64(entry.rx_packets);
    dst.put_u64(entry.tx_packets);
    dst.put_u64(entry.rx_bytes);
    dst.put_u64(entry.tx_bytes);
    dst.put_u64(entry.rx_dropped);
    dst.put_u64(entry.tx_dropped);
    dst.put_u64(entry.rx_errors);
    dst.put_u64(entry.tx_errors);
    dst.put_bytes(0, 4 * 8); // frame/overrun/crc errors, collisions
    dst.put_u32(entry.duration_sec);
    dst.put_u32(0); // duration_nsec
}

fn encode_flow_stats(entry: &FlowStatsEntry, dst: &mut BytesMut) {
    let length = FLOW_STATS_FIXED_LEN + entry.match_.encoded_len();
    dst.put_u16(length as u16);
    dst.put_u8(entry.table_id);
    dst.put_u8(0);
    dst.put_u32(entry.duration_sec);
    dst.put_u32(0); // duration_nsec
    dst.put_u16(entry.priority);
    dst.put_u16(entry.idle_timeout);
    dst.put_u16(entry.hard_timeout);
    dst.put_u16(0); // flags
    dst.put_bytes(0, 4);
    dst.put_u64(entry.cookie);
    dst.put_u64(entry.packet_count);
    dst.put_u64(entry.byte_count);
    entry.match_.encode(dst);
}

fn decode_port_stats(buf: &mut Bytes) -> Result<PortStats, WireError> {
    need(buf, PORT_STATS_LEN, "port stats entry")?;
    let port_no = buf.get_u32();
    buf.advance(4);
    let rx_packets = buf.get_u64();
    let tx_packets = buf.get_u64();
    let rx_bytes = buf.get_u64();
    let tx_bytes = buf.get_u64();
    let rx_dropped = buf.get_u64();
    let tx_dropped = buf.get_u64();
    let rx_errors = buf.get_u64();
    let tx_errors = buf.get_u64();
    // frame/overrun/crc errors and collisions are not consumed downstream
    buf.advance(4 * 8);
    let duration_sec = buf.get_u32();
    buf.advance(4); // duration_nsec
    Ok(PortStats {
        port_no,
        rx_packets,
        tx_packets,
        rx_bytes,
        tx_bytes,
        rx_dropped,
        tx_dropped,
        rx_errors,
        tx_errors,
        duration_sec,
    })
}

fn decode_flow_stats(buf: &mut Bytes) -> Result<FlowStatsEntry, WireError> {
    need(buf, FLOW_STATS_FIXED_LEN, "flow stats entry")?;
    let length = usize::from(buf.get_u16());
    if length < FLOW_STATS_FIXED_LEN {
        return Err(WireError::Malformed {
            context: "flow stats entry",
            detail: format!("length {length}"),
        });
    }
    need(buf, length - 2, "flow stats entry")?;
    let mut entry = buf.split_to(length - 2);
    let table_id = entry.get_u8();
    entry.advance(1);
    let duration_sec = entry.get_u32();
    entry.advance(4); // duration_nsec
    let priority = entry.get_u16();
    let idle_timeout = entry.get_u16();
    let hard_timeout = entry.get_u16();
    entry.advance(2 + 4); // flags + pad
    let cookie = entry.get_u64();
    let packet_count = entry.get_u64();
    let byte_count = entry.get_u64();
    let match_ = Match::decode(&mut entry)?;
    // whatever remains is the instruction list, which stats do not need
    Ok(FlowStatsEntry {
        table_id,
        duration_sec,
        priority,
        idle_timeout,
        hard_timeout,
        cookie,
        packet_count,
        byte_count,
        match_,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use net::Mac;

    #[test]
    fn port_stats_reply_decodes() {
        let mut buf = BytesMut::new();
        buf.put_u16(MP_PORT_STATS);
        buf.put_u16(0);
        buf.put_bytes(0, 4);
        // one entry
        buf.put_u32(2);
        buf.put_bytes(0, 4);
        for counter in [10u64, 20, 1000, 2000, 0, 0, 0, 0, 0, 0, 0, 0] {
            buf.put_u64(counter);
        }
        buf.put_u32(60);
        buf.put_u32(0);

        let reply = MultipartReply::decode(&mut buf.freeze()).unwrap();
        assert!(!reply.more);
        let MultipartReplyBody::PortStats(stats) = reply.body else {
            panic!("wrong body");
        };
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].port_no, 2);
        assert_eq!(stats[0].tx_bytes, 2000);
        assert_eq!(stats[0].duration_sec, 60);
    }

    #[test]
    fn flow_stats_reply_decodes_match_and_skips_instructions() {
        let match_ = Match::eth_pair(Mac([1; 6]), Mac([2; 6]));
        let mut entry = BytesMut::new();
        entry.put_u8(0); // table
        entry.put_u8(0);
        entry.put_u32(31); // duration_sec
        entry.put_u32(0);
        entry.put_u16(14); // priority
        entry.put_u16(30);
        entry.put_u16(0);
        entry.put_u16(0);
        entry.put_bytes(0, 4);
        entry.put_u64(0);
        entry.put_u64(5); // packets
        entry.put_u64(500); // bytes
        match_.encode(&mut entry);
        // one apply-actions instruction with a single output action
        entry.put_u16(4);
        entry.put_u16(24);
        entry.put_bytes(0, 4);
        crate::Action::output(1).encode(&mut entry);

        let mut buf = BytesMut::new();
        buf.put_u16(MP_FLOW);
        buf.put_u16(OFPMPF_REPLY_MORE);
        buf.put_bytes(0, 4);
        buf.put_u16((entry.len() + 2) as u16);
        buf.extend_from_slice(&entry);

        let reply = MultipartReply::decode(&mut buf.freeze()).unwrap();
        assert!(reply.more);
        let MultipartReplyBody::FlowStats(entries) = reply.body else {
            panic!("wrong body");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].priority, 14);
        assert_eq!(entries[0].byte_count, 500);
        assert_eq!(entries[0].match_, match_);
    }

    #[test]
    fn unknown_reply_type_is_other() {
        let mut buf = BytesMut::new();
        buf.put_u16(3); // table stats
        buf.put_u16(0);
        buf.put_bytes(0, 4);
        buf.put_bytes(0, 24);
        let reply = MultipartReply::decode(&mut buf.freeze()).unwrap();
        assert_eq!(reply.body, MultipartReplyBody::Other { mp_type: 3 });
    }

    #[test]
    fn request_lengths_match_encoding() {
        for body in [
            MultipartRequestBody::PortDesc,
            MultipartRequestBody::PortStats(PortStatsRequest::default()),
            MultipartRequestBody::FlowStats(FlowStatsRequest::default()),
        ] {
            let mut buf = BytesMut::new();
            body.encode(&mut buf);
            assert_eq!(buf.len(), body.encoded_len());
        }
    }
}
