// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Header framing and the stream codec.

use crate::message::Message;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// The only protocol version this controller speaks.
pub const OFP_VERSION: u8 = 0x04;

/// Fixed header length of every OpenFlow message.
pub const HEADER_LEN: usize = 8;

/// Message type codes (OpenFlow 1.3 §A.1).
pub mod msg_type {
    pub const HELLO: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const ECHO_REQUEST: u8 = 2;
    pub const ECHO_REPLY: u8 = 3;
    pub const FEATURES_REQUEST: u8 = 5;
    pub const FEATURES_REPLY: u8 = 6;
    pub const PACKET_IN: u8 = 10;
    pub const FLOW_REMOVED: u8 = 11;
    pub const PORT_STATUS: u8 = 12;
    pub const PACKET_OUT: u8 = 13;
    pub const FLOW_MOD: u8 = 14;
    pub const MULTIPART_REQUEST: u8 = 18;
    pub const MULTIPART_REPLY: u8 = 19;
    pub const BARRIER_REQUEST: u8 = 20;
    pub const BARRIER_REPLY: u8 = 21;
}

/// Errors raised while framing or parsing messages.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("header announces length {0}, below the 8 byte minimum")]
    BadLength(usize),
    #[error("message body truncated: needed {needed} more bytes in {context}")]
    Truncated {
        context: &'static str,
        needed: usize,
    },
    #[error("peer speaks OpenFlow version {0:#04x}, only 1.3 (0x04) is supported")]
    UnsupportedVersion(u8),
    #[error("malformed {context}: {detail}")]
    Malformed {
        context: &'static str,
        detail: String,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Checks `buf` still holds `n` bytes before a fixed-width read.
pub(crate) fn need(buf: &impl Buf, n: usize, context: &'static str) -> Result<(), WireError> {
    if buf.remaining() < n {
        Err(WireError::Truncated {
            context,
            needed: n - buf.remaining(),
        })
    } else {
        Ok(())
    }
}

/// The 8-byte header prefixed to every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub msg_type: u8,
    pub length: u16,
    pub xid: u32,
}

impl Header {
    pub(crate) fn decode(buf: &mut Bytes) -> Result<Header, WireError> {
        need(buf, HEADER_LEN, "header")?;
        Ok(Header {
            version: buf.get_u8(),
            msg_type: buf.get_u8(),
            length: buf.get_u16(),
            xid: buf.get_u32(),
        })
    }

    pub(crate) fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.version);
        dst.put_u8(self.msg_type);
        dst.put_u16(self.length);
        dst.put_u32(self.xid);
    }
}

/// Length-prefixed framing of [`Message`] values over a byte stream.
///
/// Decoding never kills the stream for an unknown message type; those
/// come out as [`Message::Other`] and the session layer counts and
/// drops them. A version mismatch or a nonsensical length is fatal for
/// the session, mirroring the handshake rules.
#[derive(Debug, Default)]
pub struct OpenFlowCodec;

impl Decoder for OpenFlowCodec {
    type Item = Message;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, WireError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let length = usize::from(u16::from_be_bytes([src[2], src[3]]));
        if length < HEADER_LEN {
            return Err(WireError::BadLength(length));
        }
        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }
        let frame = src.split_to(length).freeze();
        Message::decode(frame).map(Some)
    }
}

impl Encoder<Message> for OpenFlowCodec {
    type Error = WireError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), WireError> {
        item.encode(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_header_needs_more() {
        let mut codec = OpenFlowCodec;
        let mut buf = BytesMut::from(&[0x04u8, 0x00, 0x00][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn short_length_is_fatal() {
        let mut codec = OpenFlowCodec;
        let mut buf = BytesMut::from(&[0x04u8, 0x00, 0x00, 0x04, 0, 0, 0, 1][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(WireError::BadLength(4))
        ));
    }

    #[test]
    fn two_messages_in_one_read() {
        let mut codec = OpenFlowCodec;
        let mut buf = BytesMut::new();
        codec.encode(Message::Hello { xid: 1 }, &mut buf).unwrap();
        codec
            .encode(Message::EchoRequest { xid: 2, data: Bytes::new() }, &mut buf)
            .unwrap();
        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(Message::Hello { xid: 1 })
        ));
        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(Message::EchoRequest { xid: 2, .. })
        ));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
