// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! OpenFlow 1.3 wire protocol, restricted to the message families the
//! controller actually exchanges with its switches: the handshake
//! (hello, features), echo keepalives, flow-mods, packet-in/out,
//! port-status and the port-desc / port-stats / flow-stats multiparts.
//!
//! Framing follows the tokio-util codec model: [`OpenFlowCodec`] turns
//! a TCP byte stream into [`Message`] values and back. Messages the
//! controller has no use for still frame correctly and surface as
//! [`Message::Other`], so a session never dies on an unexpected type.

#![deny(clippy::all)]

pub mod action;
pub mod message;
pub mod multipart;
pub mod oxm;
pub mod port;
pub mod wire;

pub use action::Action;
pub use message::{
    FlowMod, FlowModCommand, Message, PacketIn, PacketInReason, PacketOut, PortStatusReason,
    SwitchFeatures,
};
pub use multipart::{
    FlowStatsEntry, FlowStatsRequest, MultipartReply, MultipartReplyBody, MultipartRequestBody,
    PortStats, PortStatsRequest,
};
pub use oxm::Match;
pub use port::PortDesc;
pub use wire::{OpenFlowCodec, WireError, OFP_VERSION};

/// 64-bit switch identity from the features reply.
pub type DatapathId = u64;

/// Reserved port numbers (OpenFlow 1.3 §7.2.1).
pub mod port_no {
    /// Maximum number of a physical port.
    pub const MAX: u32 = 0xffff_ff00;
    /// Output to the ingress port.
    pub const IN_PORT: u32 = 0xffff_fff8;
    /// Flood within the spanning-tree-less broadcast domain.
    pub const FLOOD: u32 = 0xffff_fffb;
    /// All physical ports except ingress.
    pub const ALL: u32 = 0xffff_fffc;
    /// Send to the controller.
    pub const CONTROLLER: u32 = 0xffff_fffd;
    /// The switch-local stack port.
    pub const LOCAL: u32 = 0xffff_fffe;
    /// Wildcard for flow-mod deletes and stats requests.
    pub const ANY: u32 = 0xffff_ffff;
}

/// Sentinel buffer id: the packet-in carried the full payload.
pub const NO_BUFFER: u32 = 0xffff_ffff;

/// "Send the complete packet" max_len for controller-bound output actions.
pub const CONTROLLER_MAX_LEN: u16 = 0xffff;

/// Group number wildcard.
pub const GROUP_ANY: u32 = 0xffff_ffff;

/// All-tables id for flow stats requests.
pub const TABLE_ALL: u8 = 0xff;
