// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Frame-level types for the controller's packet-in path: ethernet
//! addressing, ARP, LLDP announcements and a tagged view over the
//! layers the forwarding plane cares about.

#![deny(clippy::all)]

pub mod arp;
pub mod eth;
pub mod frame;
pub mod lldp;

pub use arp::{ArpOp, ArpPacket};
pub use eth::{EtherType, Mac};
pub use frame::{Frame, FrameError, FramePayload, Transport};
pub use lldp::LldpAnnouncement;
