//! Learned routing table
//!
//! Maps each secondary port to the name of the device last heard on it.
//! All four entries always exist; unlearned entries hold
//! [`UNKNOWN_DEVICE`]. Entries are only ever overwritten or reset, never
//! removed.

use std::fmt;

use mesh_link::SecondaryPort;
use mesh_protocol::UNKNOWN_DEVICE;

use crate::error::RouteError;

/// Port index -> neighbour name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    entries: [String; 4],
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingTable {
    /// Create a table with every route unknown
    pub fn new() -> Self {
        Self {
            entries: std::array::from_fn(|_| UNKNOWN_DEVICE.to_string()),
        }
    }

    fn port(index: usize) -> Result<SecondaryPort, RouteError> {
        SecondaryPort::new(index).ok_or(RouteError::OutOfRange(index))
    }

    /// Name stored for port `index`
    pub fn get(&self, index: usize) -> Result<&str, RouteError> {
        Ok(self.name(Self::port(index)?))
    }

    /// Overwrite the name stored for port `index`
    pub fn set(&mut self, index: usize, name: impl Into<String>) -> Result<(), RouteError> {
        self.learn(Self::port(index)?, name);
        Ok(())
    }

    /// Name stored for `port`
    pub fn name(&self, port: SecondaryPort) -> &str {
        &self.entries[port.index()]
    }

    /// Overwrite the name stored for `port`
    pub fn learn(&mut self, port: SecondaryPort, name: impl Into<String>) {
        self.entries[port.index()] = name.into();
    }

    /// First port whose entry is `name`
    pub fn route(&self, name: &str) -> Option<SecondaryPort> {
        self.iter()
            .find(|(_, entry)| *entry == name)
            .map(|(port, _)| port)
    }

    /// Whether a name has been learned for `port`
    pub fn is_known(&self, port: SecondaryPort) -> bool {
        self.name(port) != UNKNOWN_DEVICE
    }

    /// Reset every entry to unknown
    pub fn clear(&mut self) {
        for entry in &mut self.entries {
            *entry = UNKNOWN_DEVICE.to_string();
        }
    }

    /// Entries in port order
    pub fn iter(&self) -> impl Iterator<Item = (SecondaryPort, &str)> {
        SecondaryPort::ALL
            .into_iter()
            .zip(self.entries.iter().map(String::as_str))
    }
}

impl fmt::Display for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Routing Table:")?;
        for (port, name) in self.iter() {
            writeln!(f, "- Port: {}, Device: {}", port, name)?;
        }
        Ok(())
    }
}
