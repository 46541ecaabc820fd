//! Error types for simulated devices

use mesh_link::LinkError;
use mesh_protocol::ParseError;
use thiserror::Error;

/// Routing table access outside the four secondary ports
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("route {0} out of range (expected 0-3)")]
    OutOfRange(usize),
}

/// Errors that can occur when creating or controlling a device
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Device name cannot be used on the wire
    #[error("invalid device name: {0}")]
    InvalidName(#[from] ParseError),

    /// Link wiring failed
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    /// Routing table access failed
    #[error("routing error: {0}")]
    Route(#[from] RouteError),

    /// The device runtime has exited
    #[error("device {0} is stopped")]
    Stopped(String),
}
