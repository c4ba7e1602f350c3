// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The controller's routing state: the link-load topology graph, the
//! FPLF path engine that runs over it, the learned-MAC directory and
//! the static fallback maps used when link discovery comes up empty.

#![deny(clippy::all)]

pub mod fallback;
pub mod fplf;
pub mod mactable;
pub mod topology;

pub use fallback::{StaticLink, builtin_map};
pub use fplf::{FplfEngine, Route, RouteError};
pub use mactable::MacTable;
pub use topology::{LinkView, Topology};

/// Switch identity (the OpenFlow datapath id).
pub type DpId = u64;

/// Switch port number.
pub type PortNo = u32;
