// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Command line of the controller binary.

use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fplf-controller")]
#[command(version = option_env!("VERSION").unwrap_or("dev"))]
#[command(about = "Priority- and load-aware OpenFlow 1.3 controller", long_about = None)]
pub struct CmdArgs {
    /// YAML configuration file; defaults apply when omitted.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the configured listen address.
    #[arg(long, value_name = "ADDR")]
    listen_address: Option<IpAddr>,

    /// Override the configured listen port.
    #[arg(long, value_name = "PORT")]
    listen_port: Option<u16>,

    /// Tracing filter, e.g. "info" or "fplf_controller=debug,info".
    #[arg(long, value_name = "FILTER")]
    tracing: Option<String>,
}

impl CmdArgs {
    pub fn config(&self) -> Option<&PathBuf> {
        self.config.as_ref()
    }

    pub fn listen_address(&self) -> Option<IpAddr> {
        self.listen_address
    }

    pub fn listen_port(&self) -> Option<u16> {
        self.listen_port
    }

    pub fn tracing(&self) -> Option<&str> {
        self.tracing.as_deref()
    }
}
