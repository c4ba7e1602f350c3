// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Port descriptions, shared by port-status and the port-desc multipart.

use crate::wire::{WireError, need};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use net::Mac;

pub(crate) const PORT_DESC_LEN: usize = 64;
const PORT_NAME_LEN: usize = 16;

/// Port is administratively down (`config` bit).
const OFPPC_PORT_DOWN: u32 = 1 << 0;
/// No physical link present (`state` bit).
const OFPPS_LINK_DOWN: u32 = 1 << 0;

/// One switch port as described by the datapath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDesc {
    pub port_no: u32,
    pub hw_addr: Mac,
    pub name: String,
    pub config: u32,
    pub state: u32,
    pub curr: u32,
    pub advertised: u32,
    pub supported: u32,
    pub peer: u32,
    pub curr_speed: u32,
    pub max_speed: u32,
}

impl PortDesc {
    /// True for numbered data ports (excludes LOCAL and the reserved range).
    #[must_use]
    pub fn is_data_port(&self) -> bool {
        self.port_no <= crate::port_no::MAX
    }

    /// True when the port can carry traffic right now.
    #[must_use]
    pub fn is_up(&self) -> bool {
        self.config & OFPPC_PORT_DOWN == 0 && self.state & OFPPS_LINK_DOWN == 0
    }

    pub(crate) fn decode(buf: &mut Bytes) -> Result<PortDesc, WireError> {
        need(buf, PORT_DESC_LEN, "port desc")?;
        let port_no = buf.get_u32();
        buf.advance(4);
        let mut hw_addr = [0u8; 6];
        buf.copy_to_slice(&mut hw_addr);
        buf.advance(2);
        let mut name_bytes = [0u8; PORT_NAME_LEN];
        buf.copy_to_slice(&mut name_bytes);
        let name_end = name_bytes
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(PORT_NAME_LEN);
        let name = String::from_utf8_lossy(&name_bytes[..name_end]).into_owned();
        Ok(PortDesc {
            port_no,
            hw_addr: Mac(hw_addr),
            name,
            config: buf.get_u32(),
            state: buf.get_u32(),
            curr: buf.get_u32(),
            advertised: buf.get_u32(),
            supported: buf.get_u32(),
            peer: buf.get_u32(),
            curr_speed: buf.get_u32(),
            max_speed: buf.get_u32(),
        })
    }

    pub(crate) fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32(self.port_no);
        dst.put_bytes(0, 4);
        dst.put_slice(&self.hw_addr.0);
        dst.put_bytes(0, 2);
        let mut name_bytes = [0u8; PORT_NAME_LEN];
        let take = self.name.len().min(PORT_NAME_LEN - 1);
        name_bytes[..take].copy_from_slice(&self.name.as_bytes()[..take]);
        dst.put_slice(&name_bytes);
        dst.put_u32(self.config);
        dst.put_u32(self.state);
        dst.put_u32(self.curr);
        dst.put_u32(self.advertised);
        dst.put_u32(self.supported);
        dst.put_u32(self.peer);
        dst.put_u32(self.curr_speed);
        dst.put_u32(self.max_speed);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample(port_no: u32) -> PortDesc {
        PortDesc {
            port_no,
            hw_addr: Mac([0, 0, 0, 0, 0, port_no as u8]),
            name: format!("s1-eth{port_no}"),
            config: 0,
            state: 0,
            curr: 0,
            advertised: 0,
            supported: 0,
            peer: 0,
            curr_speed: 10_000_000,
            max_speed: 10_000_000,
        }
    }

    #[test]
    fn round_trip() {
        let desc = sample(2);
        let mut buf = BytesMut::new();
        desc.encode(&mut buf);
        assert_eq!(buf.len(), PORT_DESC_LEN);
        let decoded = PortDesc::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, desc);
    }

    #[test]
    fn down_bits_reported() {
        let mut desc = sample(1);
        assert!(desc.is_up());
        desc.state = OFPPS_LINK_DOWN;
        assert!(!desc.is_up());
        desc.state = 0;
        desc.config = OFPPC_PORT_DOWN;
        assert!(!desc.is_up());
    }

    #[test]
    fn local_port_is_not_data() {
        let mut desc = sample(1);
        desc.port_no = crate::port_no::LOCAL;
        assert!(!desc.is_data_port());
    }
}
