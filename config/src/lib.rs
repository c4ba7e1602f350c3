// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Controller configuration.
//!
//! One YAML file, read exactly once at startup; every key is optional
//! and falls back to the defaults below. The controller never reloads
//! configuration at runtime, so an unreadable or malformed file is
//! fatal before any switch connects.

#![deny(clippy::all)]

use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[allow(unused)]
use tracing::{debug, info};

/// Errors producing a usable configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml_ng::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// One directed link of a user-supplied static topology map.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct StaticLinkSpec {
    pub src: u64,
    pub src_port: u32,
    pub dst: u64,
    pub dst_port: u32,
    #[serde(default = "default_link_capacity")]
    pub capacity_bps: f64,
}

fn default_link_capacity() -> f64 {
    100e6
}

/// The controller's runtime settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: IpAddr,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    #[serde(default = "default_stats_poll_interval")]
    pub stats_poll_interval_seconds: u64,
    #[serde(default = "default_energy_poll_interval")]
    pub energy_poll_interval_seconds: u64,
    #[serde(default = "default_energy_flush_interval")]
    pub energy_flush_interval_seconds: u64,

    #[serde(default = "default_mac_age")]
    pub mac_age_seconds: u64,
    #[serde(default = "default_flow_idle_timeout")]
    pub flow_idle_timeout_seconds: u16,
    #[serde(default = "default_discovery_grace")]
    pub discovery_grace_seconds: u64,
    #[serde(default = "default_decay_time_constant")]
    pub decay_time_constant_seconds: f64,

    /// Weigh links by load/capacity instead of raw load.
    #[serde(default)]
    pub weight_by_utilization: bool,

    /// Periodically wipe data flows so routes re-form under current
    /// loads; off when absent.
    #[serde(default)]
    pub flow_reset_interval_seconds: Option<u64>,

    #[serde(default = "default_power_active")]
    pub power_active_watts: f64,
    #[serde(default = "default_power_idle")]
    pub power_idle_watts: f64,
    #[serde(default = "default_active_port_threshold")]
    pub active_port_threshold_bytes: u64,

    /// Classifier export; absence means every flow is UNKNOWN.
    #[serde(default)]
    pub classification_csv_path: Option<PathBuf>,
    #[serde(default = "default_energy_csv_path")]
    pub energy_csv_path: PathBuf,

    /// Overrides the built-in fallback maps when discovery fails.
    #[serde(default)]
    pub static_topology_map: Option<Vec<StaticLinkSpec>>,
}

fn default_listen_address() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}
fn default_listen_port() -> u16 {
    6653
}
fn default_stats_poll_interval() -> u64 {
    10
}
fn default_energy_poll_interval() -> u64 {
    1
}
fn default_energy_flush_interval() -> u64 {
    10
}
fn default_mac_age() -> u64 {
    300
}
fn default_flow_idle_timeout() -> u16 {
    30
}
fn default_discovery_grace() -> u64 {
    10
}
fn default_decay_time_constant() -> f64 {
    90.0
}
fn default_power_active() -> f64 {
    5.0
}
fn default_power_idle() -> f64 {
    2.0
}
fn default_active_port_threshold() -> u64 {
    1000
}
fn default_energy_csv_path() -> PathBuf {
    PathBuf::from("energy_consumption.csv")
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            listen_address: default_listen_address(),
            listen_port: default_listen_port(),
            stats_poll_interval_seconds: default_stats_poll_interval(),
            energy_poll_interval_seconds: default_energy_poll_interval(),
            energy_flush_interval_seconds: default_energy_flush_interval(),
            mac_age_seconds: default_mac_age(),
            flow_idle_timeout_seconds: default_flow_idle_timeout(),
            discovery_grace_seconds: default_discovery_grace(),
            decay_time_constant_seconds: default_decay_time_constant(),
            weight_by_utilization: false,
            flow_reset_interval_seconds: None,
            power_active_watts: default_power_active(),
            power_idle_watts: default_power_idle(),
            active_port_threshold_bytes: default_active_port_threshold(),
            classification_csv_path: None,
            energy_csv_path: default_energy_csv_path(),
            static_topology_map: None,
        }
    }
}

impl ControllerConfig {
    /// Read and validate `path`.
    pub fn load(path: &Path) -> Result<ControllerConfig, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ControllerConfig =
            serde_yaml_ng::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        info!("configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Reject settings that would stall a periodic task or divide by zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stats_poll_interval_seconds == 0 {
            return Err(ConfigError::Invalid("stats_poll_interval_seconds must be > 0"));
        }
        if self.energy_poll_interval_seconds == 0 {
            return Err(ConfigError::Invalid("energy_poll_interval_seconds must be > 0"));
        }
        if self.decay_time_constant_seconds <= 0.0 {
            return Err(ConfigError::Invalid("decay_time_constant_seconds must be > 0"));
        }
        if self.power_active_watts < self.power_idle_watts {
            return Err(ConfigError::Invalid(
                "power_active_watts must be >= power_idle_watts",
            ));
        }
        if self.flow_reset_interval_seconds == Some(0) {
            return Err(ConfigError::Invalid("flow_reset_interval_seconds must be > 0"));
        }
        Ok(())
    }

    #[must_use]
    pub fn stats_poll_interval(&self) -> Duration {
        Duration::from_secs(self.stats_poll_interval_seconds)
    }

    #[must_use]
    pub fn energy_poll_interval(&self) -> Duration {
        Duration::from_secs(self.energy_poll_interval_seconds)
    }

    #[must_use]
    pub fn energy_flush_interval(&self) -> Duration {
        Duration::from_secs(self.energy_flush_interval_seconds)
    }

    #[must_use]
    pub fn mac_age(&self) -> Duration {
        Duration::from_secs(self.mac_age_seconds)
    }

    #[must_use]
    pub fn discovery_grace(&self) -> Duration {
        Duration::from_secs(self.discovery_grace_seconds)
    }

    #[must_use]
    pub fn decay_time_constant(&self) -> Duration {
        Duration::from_secs_f64(self.decay_time_constant_seconds)
    }

    #[must_use]
    pub fn flow_reset_interval(&self) -> Option<Duration> {
        self.flow_reset_interval_seconds.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{}").unwrap();
        let config = ControllerConfig::load(file.path()).unwrap();
        assert_eq!(config.listen_port, 6653);
        assert_eq!(config.stats_poll_interval_seconds, 10);
        assert_eq!(config.flow_idle_timeout_seconds, 30);
        assert_eq!(config.mac_age_seconds, 300);
        assert!(!config.weight_by_utilization);
        assert!(config.flow_reset_interval().is_none());
    }

    #[test]
    fn overrides_and_static_map_parse() {
        let text = "\
listen_port: 6700
weight_by_utilization: true
flow_reset_interval_seconds: 60
static_topology_map:
  - { src: 1, src_port: 2, dst: 2, dst_port: 2 }
  - { src: 2, src_port: 2, dst: 1, dst_port: 2, capacity_bps: 10000000 }
";
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        let config = ControllerConfig::load(file.path()).unwrap();
        assert_eq!(config.listen_port, 6700);
        assert!(config.weight_by_utilization);
        assert_eq!(config.flow_reset_interval(), Some(Duration::from_secs(60)));
        let map = config.static_topology_map.unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[0].capacity_bps, 100e6);
        assert_eq!(map[1].capacity_bps, 10e6);
    }

    #[test]
    fn unknown_keys_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"listen_prot: 6700\n").unwrap();
        assert!(matches!(
            ControllerConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn zero_intervals_rejected() {
        let config = ControllerConfig {
            stats_poll_interval_seconds: 0,
            ..ControllerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ControllerConfig {
            decay_time_constant_seconds: 0.0,
            ..ControllerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ControllerConfig {
            flow_reset_interval_seconds: Some(0),
            ..ControllerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_read_error() {
        assert!(matches!(
            ControllerConfig::load(Path::new("/nonexistent/fplf.yml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
