//! Topology file
//!
//! A topology names the devices to simulate and the links between their
//! secondary ports:
//!
//! ```json
//! {
//!   "devices": [
//!     { "name": "alice" },
//!     { "name": "bob", "config": { "port_check_delay_ms": 300 } }
//!   ],
//!   "links": [{ "a": "alice", "a_port": 0, "b": "bob", "b_port": 0 }]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use mesh_link::SECONDARY_PORTS;
use mesh_sim::DeviceConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A device to simulate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSpec {
    /// Device name, also used on the wire
    pub name: String,
    /// Timing overrides
    #[serde(default)]
    pub config: DeviceConfig,
}

/// A link between two secondary ports
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkSpec {
    pub a: String,
    pub a_port: usize,
    pub b: String,
    pub b_port: usize,
}

/// Devices and links to build at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Topology {
    pub devices: Vec<DeviceSpec>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
}

/// Inconsistencies in a topology
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("device {0} is declared twice")]
    DuplicateDevice(String),

    #[error("link references unknown device {0}")]
    UnknownDevice(String),

    #[error("port {port} of {device} is out of range (0-3)")]
    InvalidPort { device: String, port: usize },

    #[error("port {port} of {device} is used by more than one link")]
    PortInUse { device: String, port: usize },
}

fn device(name: &str) -> DeviceSpec {
    DeviceSpec {
        name: name.to_string(),
        config: DeviceConfig::default(),
    }
}

fn link(a: &str, a_port: usize, b: &str, b_port: usize) -> LinkSpec {
    LinkSpec {
        a: a.to_string(),
        a_port,
        b: b.to_string(),
        b_port,
    }
}

impl Default for Topology {
    /// Three devices in a chain: alice - bob - carol
    fn default() -> Self {
        Self {
            devices: vec![device("alice"), device("bob"), device("carol")],
            links: vec![link("alice", 0, "bob", 0), link("bob", 1, "carol", 0)],
        }
    }
}

impl Topology {
    /// Load and validate a topology file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read topology {}", path.display()))?;
        let topology: Topology = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse topology {}", path.display()))?;
        topology.validate()?;
        Ok(topology)
    }

    /// Check that every link joins two distinct, declared, free ports
    pub fn validate(&self) -> Result<(), TopologyError> {
        let mut names = HashSet::new();
        for spec in &self.devices {
            if !names.insert(spec.name.as_str()) {
                return Err(TopologyError::DuplicateDevice(spec.name.clone()));
            }
        }

        let mut used = HashSet::new();
        for link in &self.links {
            for (device, port) in [(&link.a, link.a_port), (&link.b, link.b_port)] {
                if !names.contains(device.as_str()) {
                    return Err(TopologyError::UnknownDevice(device.clone()));
                }
                if port >= SECONDARY_PORTS {
                    return Err(TopologyError::InvalidPort {
                        device: device.clone(),
                        port,
                    });
                }
                if !used.insert((device.as_str(), port)) {
                    return Err(TopologyError::PortInUse {
                        device: device.clone(),
                        port,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chain_is_valid() {
        let topology = Topology::default();
        assert_eq!(topology.devices.len(), 3);
        assert_eq!(topology.validate(), Ok(()));
    }

    #[test]
    fn test_parse_with_config_overrides() {
        let json = r#"{
            "devices": [
                { "name": "alice" },
                { "name": "bob", "config": { "port_check_delay_ms": 300 } }
            ],
            "links": [{ "a": "alice", "a_port": 0, "b": "bob", "b_port": 2 }]
        }"#;
        let topology: Topology = serde_json::from_str(json).unwrap();

        assert_eq!(topology.devices[0].config, DeviceConfig::default());
        assert_eq!(topology.devices[1].config.port_check_delay_ms, 300);
        assert_eq!(topology.devices[1].config.after_rts_delay_ms, 500);
        assert_eq!(topology.links[0], link("alice", 0, "bob", 2));
        assert_eq!(topology.validate(), Ok(()));
    }

    #[test]
    fn test_links_default_to_empty() {
        let topology: Topology = serde_json::from_str(r#"{"devices": [{"name": "solo"}]}"#).unwrap();
        assert!(topology.links.is_empty());
    }

    #[test]
    fn test_validation_errors() {
        let mut topology = Topology::default();
        topology.devices.push(device("bob"));
        assert_eq!(
            topology.validate(),
            Err(TopologyError::DuplicateDevice("bob".into()))
        );

        let mut topology = Topology::default();
        topology.links.push(link("alice", 1, "dave", 0));
        assert_eq!(
            topology.validate(),
            Err(TopologyError::UnknownDevice("dave".into()))
        );

        let mut topology = Topology::default();
        topology.links.push(link("alice", 4, "carol", 1));
        assert_eq!(
            topology.validate(),
            Err(TopologyError::InvalidPort {
                device: "alice".into(),
                port: 4
            })
        );

        let mut topology = Topology::default();
        topology.links.push(link("carol", 0, "alice", 2));
        assert_eq!(
            topology.validate(),
            Err(TopologyError::PortInUse {
                device: "carol".into(),
                port: 0
            })
        );
    }
}
