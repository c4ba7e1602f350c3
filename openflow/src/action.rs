// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow actions. Output is the only action this controller programs.

use crate::wire::{WireError, need};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const OFPAT_OUTPUT: u16 = 0;
const OUTPUT_LEN: u16 = 16;

/// One action in a flow-mod instruction or packet-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Forward out `port`, delivering at most `max_len` bytes when the
    /// port is the controller.
    Output { port: u32, max_len: u16 },
}

impl Action {
    /// Output action toward a data port (max_len ignored by switches).
    #[must_use]
    pub fn output(port: u32) -> Action {
        Action::Output { port, max_len: 0 }
    }

    /// Output action toward the controller with full payload delivery.
    #[must_use]
    pub fn to_controller() -> Action {
        Action::Output {
            port: crate::port_no::CONTROLLER,
            max_len: crate::CONTROLLER_MAX_LEN,
        }
    }

    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Action::Output { .. } => usize::from(OUTPUT_LEN),
        }
    }

    pub(crate) fn encode(&self, dst: &mut BytesMut) {
        match self {
            Action::Output { port, max_len } => {
                dst.put_u16(OFPAT_OUTPUT);
                dst.put_u16(OUTPUT_LEN);
                dst.put_u32(*port);
                dst.put_u16(*max_len);
                dst.put_bytes(0, 6);
            }
        }
    }
}

/// Total encoded size of an action list.
#[must_use]
pub fn list_len(actions: &[Action]) -> usize {
    actions.iter().map(Action::encoded_len).sum()
}

pub(crate) fn encode_list(actions: &[Action], dst: &mut BytesMut) {
    for action in actions {
        action.encode(dst);
    }
}

/// Decode `len` bytes of actions, keeping the ones we model and
/// skipping the rest by their self-declared lengths.
pub(crate) fn decode_list(buf: &mut Bytes, len: usize) -> Result<Vec<Action>, WireError> {
    need(buf, len, "action list")?;
    let mut region = buf.split_to(len);
    let mut actions = Vec::new();
    while region.has_remaining() {
        need(&region, 4, "action header")?;
        let action_type = region.get_u16();
        let action_len = usize::from(region.get_u16());
        if action_len < 4 {
            return Err(WireError::Malformed {
                context: "action header",
                detail: format!("length {action_len}"),
            });
        }
        let body_len = action_len - 4;
        need(&region, body_len, "action body")?;
        if action_type == OFPAT_OUTPUT && body_len >= 6 {
            let port = region.get_u32();
            let max_len = region.get_u16();
            region.advance(body_len - 6);
            actions.push(Action::Output { port, max_len });
        } else {
            region.advance(body_len);
        }
    }
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_round_trip() {
        let actions = vec![Action::output(3), Action::to_controller()];
        let mut buf = BytesMut::new();
        encode_list(&actions, &mut buf);
        assert_eq!(buf.len(), list_len(&actions));
        let mut bytes = buf.freeze();
        let decoded = decode_list(&mut bytes, list_len(&actions)).unwrap();
        assert_eq!(decoded, actions);
    }

    #[test]
    fn unknown_action_skipped() {
        let mut buf = BytesMut::new();
        // group action (type 22), 8 bytes
        buf.put_u16(22);
        buf.put_u16(8);
        buf.put_u32(1);
        Action::output(9).encode(&mut buf);
        let total = buf.len();
        let mut bytes = buf.freeze();
        let decoded = decode_list(&mut bytes, total).unwrap();
        assert_eq!(decoded, vec![Action::output(9)]);
    }
}
