//! Emulated Serial Links
//!
//! This crate provides the physical layer for simulated mesh devices:
//!
//! - **DuplexLink**: one end of an in-memory, full-duplex byte stream that
//!   behaves like a serial cable between exactly two endpoints
//! - **PortSet**: the primary link plus four addressable secondary links
//!   owned by a device
//!
//! # Example
//!
//! ```rust
//! use mesh_link::{DuplexLink, PortId, PortSet, SecondaryPort};
//!
//! let alice = PortSet::new();
//! let bob = PortSet::new();
//!
//! // Wire alice's port 0 to bob's port 2
//! let port0 = PortId::Secondary(SecondaryPort::ALL[0]);
//! let port2 = PortId::Secondary(SecondaryPort::ALL[2]);
//! alice.connect(port0, &bob.link(port2)).unwrap();
//!
//! alice.write_line(port0, "PING");
//! assert_eq!(bob.available(port2), 5);
//!
//! // A bare pair, e.g. for an observer on a primary port
//! let (left, right) = DuplexLink::pair();
//! left.write(b"B1,1\n").unwrap();
//! assert_eq!(right.available(), 5);
//! ```

pub mod error;
pub mod link;
pub mod ports;

pub use error::LinkError;
pub use link::DuplexLink;
pub use ports::{PortId, PortSet, SecondaryPort, PRIMARY_INDEX, SECONDARY_PORTS};
