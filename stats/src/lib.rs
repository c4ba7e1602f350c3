// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Counter samples collected from the switches and the energy
//! accounting derived from them.

#![deny(clippy::all)]

mod db;
mod energy;

pub use db::StatsDb;
pub use energy::{EnergyLog, EnergyLogError, EnergyMonitor, EnergySample, EnergySummary, PowerModel};
