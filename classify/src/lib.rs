// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The traffic classification table.
//!
//! An offline classifier labels host-to-host flows and exports them as
//! a CSV; this crate loads that file once at startup and answers
//! lookups keyed by (src host, dst host, dst port, protocol). The
//! classifier itself stays external: this is a plain lookup table with
//! a priority order and a bandwidth estimate per flow.

#![deny(clippy::all)]

use ahash::RandomState;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::path::Path;

#[allow(unused)]
use tracing::{debug, info, warn};

/// Traffic classes in ascending priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrafficClass {
    Unknown,
    Ftp,
    Http,
    Ssh,
    Video,
}

impl TrafficClass {
    /// Highest priority any class carries.
    pub const MAX_PRIORITY: u8 = 4;

    /// Routing priority of this class (VIDEO=4 … UNKNOWN=0).
    #[must_use]
    pub fn priority(&self) -> u8 {
        match self {
            TrafficClass::Unknown => 0,
            TrafficClass::Ftp => 1,
            TrafficClass::Http => 2,
            TrafficClass::Ssh => 3,
            TrafficClass::Video => 4,
        }
    }

    fn from_label(label: &str) -> TrafficClass {
        match label {
            "VIDEO" => TrafficClass::Video,
            "SSH" => TrafficClass::Ssh,
            "HTTP" => TrafficClass::Http,
            "FTP" => TrafficClass::Ftp,
            _ => TrafficClass::Unknown,
        }
    }
}

impl fmt::Display for TrafficClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TrafficClass::Unknown => "UNKNOWN",
            TrafficClass::Ftp => "FTP",
            TrafficClass::Http => "HTTP",
            TrafficClass::Ssh => "SSH",
            TrafficClass::Video => "VIDEO",
        };
        write!(f, "{label}")
    }
}

/// Transport tag used in flow identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Other,
}

impl Protocol {
    fn from_label(label: &str) -> Protocol {
        match label {
            "TCP" => Protocol::Tcp,
            "UDP" => Protocol::Udp,
            _ => Protocol::Other,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Other => "OTHER",
        };
        write!(f, "{label}")
    }
}

/// Canonical host label for an IP address.
///
/// Emulated hosts live in 10.0.0.0/24 and are named after their last
/// octet (`10.0.0.7` is `h7`), which is the join key with the
/// classifier's export. Anything else keeps its textual address.
#[must_use]
pub fn host_label(addr: IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            if octets[0] == 10 && octets[1] == 0 && octets[2] == 0 {
                format!("h{}", octets[3])
            } else {
                v4.to_string()
            }
        }
        IpAddr::V6(v6) => v6.to_string(),
    }
}

/// Identity of one classified flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src_host: String,
    pub dst_host: String,
    pub dst_port: u16,
    pub protocol: Protocol,
}

/// What the table knows about one flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowClass {
    pub traffic_type: TrafficClass,
    pub priority: u8,
    /// Estimated rate in bits per second.
    pub bandwidth_hint: f64,
}

impl FlowClass {
    /// The fallback for unclassified flows.
    pub const UNKNOWN: FlowClass = FlowClass {
        traffic_type: TrafficClass::Unknown,
        priority: 0,
        bandwidth_hint: 0.0,
    };
}

/// One row of the classifier export.
#[derive(Debug, Deserialize)]
struct ClassifiedRow {
    src_host: String,
    dst_host: String,
    dst_port: u16,
    protocol: String,
    traffic_type: String,
    total_bytes: f64,
    flow_duration: f64,
}

/// Errors loading the classification CSV.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("failed to read classification csv: {0}")]
    Csv(#[from] csv::Error),
}

/// Immutable flow-identity → class table.
#[derive(Debug, Default)]
pub struct ClassificationTable {
    flows: HashMap<FlowKey, FlowClass, RandomState>,
}

impl ClassificationTable {
    /// An empty table; every lookup returns [`FlowClass::UNKNOWN`].
    #[must_use]
    pub fn empty() -> ClassificationTable {
        ClassificationTable::default()
    }

    /// Load the classifier export from `path`.
    ///
    /// Rows whose duration is zero or negative get a zero bandwidth
    /// hint rather than poisoning the table.
    pub fn load(path: &Path) -> Result<ClassificationTable, ClassifyError> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut flows: HashMap<FlowKey, FlowClass, RandomState> =
            HashMap::with_hasher(RandomState::with_seed(0));
        for row in reader.deserialize() {
            let row: ClassifiedRow = row?;
            let traffic_type = TrafficClass::from_label(&row.traffic_type);
            let bandwidth_hint = if row.flow_duration > 0.0 {
                row.total_bytes / row.flow_duration
            } else {
                0.0
            };
            flows.insert(
                FlowKey {
                    src_host: row.src_host,
                    dst_host: row.dst_host,
                    dst_port: row.dst_port,
                    protocol: Protocol::from_label(&row.protocol),
                },
                FlowClass {
                    traffic_type,
                    priority: traffic_type.priority(),
                    bandwidth_hint,
                },
            );
        }
        info!("loaded {} classified flows from {}", flows.len(), path.display());
        Ok(ClassificationTable { flows })
    }

    /// Look up a flow identity; misses return [`FlowClass::UNKNOWN`].
    #[must_use]
    pub fn lookup(&self, key: &FlowKey) -> FlowClass {
        self.flows.get(key).copied().unwrap_or(FlowClass::UNKNOWN)
    }

    /// Number of classified flows loaded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    /// True when no export was loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::Ipv4Addr;

    const SAMPLE: &str = "\
src_host,dst_host,dst_port,protocol,traffic_type,total_bytes,flow_duration
h1,h9,5001,UDP,VIDEO,80000000,10.0
h1,h9,21,TCP,FTP,50000000,25.0
h2,h3,22,TCP,SSH,120000,60.0
h4,h5,9999,SCTP,BULK,1000,0.0
";

    fn table() -> ClassificationTable {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        ClassificationTable::load(file.path()).unwrap()
    }

    #[test]
    fn classified_flow_found() {
        let t = table();
        let class = t.lookup(&FlowKey {
            src_host: "h1".into(),
            dst_host: "h9".into(),
            dst_port: 5001,
            protocol: Protocol::Udp,
        });
        assert_eq!(class.traffic_type, TrafficClass::Video);
        assert_eq!(class.priority, 4);
        assert!((class.bandwidth_hint - 8_000_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn miss_returns_unknown() {
        let t = table();
        let class = t.lookup(&FlowKey {
            src_host: "h1".into(),
            dst_host: "h2".into(),
            dst_port: 80,
            protocol: Protocol::Tcp,
        });
        assert_eq!(class, FlowClass::UNKNOWN);
    }

    #[test]
    fn unknown_protocol_and_type_degrade() {
        let t = table();
        let class = t.lookup(&FlowKey {
            src_host: "h4".into(),
            dst_host: "h5".into(),
            dst_port: 9999,
            protocol: Protocol::Other,
        });
        assert_eq!(class.traffic_type, TrafficClass::Unknown);
        assert_eq!(class.priority, 0);
        // zero duration must not divide
        assert_eq!(class.bandwidth_hint, 0.0);
    }

    #[test]
    fn host_labels_canonicalised() {
        assert_eq!(host_label(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))), "h7");
        assert_eq!(host_label(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 254))), "h254");
        assert_eq!(
            host_label(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 5))),
            "192.168.1.5"
        );
    }

    #[test]
    fn priorities_total_order() {
        assert!(TrafficClass::Video > TrafficClass::Ssh);
        assert!(TrafficClass::Ssh > TrafficClass::Http);
        assert!(TrafficClass::Http > TrafficClass::Ftp);
        assert!(TrafficClass::Ftp > TrafficClass::Unknown);
    }
}
