//! Mesh Device Simulation Library
//!
//! This crate simulates the microcontroller devices of a serial mesh. Each
//! device has one primary port to its collaborator and four secondary ports
//! to neighbouring devices, learns which neighbour sits on which port, and
//! relays commands using an RTS/CTS handshake:
//!
//! - **Engine**: the firmware poll round, handshake, dispatch and forwarding
//! - **Device / DeviceHandle**: runtime with start, pause, step and stop
//! - **RoutingTable**: learned port to neighbour mapping
//! - **Peripherals**: latched buttons and the six reporting LEDs
//!
//! # Example
//!
//! ```rust,no_run
//! use mesh_link::SecondaryPort;
//! use mesh_protocol::Destination;
//! use mesh_sim::{Device, DeviceConfig};
//!
//! # async fn example() -> Result<(), mesh_sim::DeviceError> {
//! let alice = Device::new("alice", DeviceConfig::default())?;
//! let bob = Device::new("bob", DeviceConfig::default())?;
//! let (a, b) = (alice.handle(), bob.handle());
//!
//! a.connect_to(SecondaryPort::ALL[0], &b, SecondaryPort::ALL[0])?;
//! alice.start();
//! bob.start();
//!
//! a.send(Destination::All, "blink leds")?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod events;
pub mod peripherals;
pub mod routing;

pub use config::DeviceConfig;
pub use device::{Device, DeviceHandle, RunState};
pub use engine::{Engine, Signal};
pub use error::{DeviceError, RouteError};
pub use events::{DeviceEvent, EVENT_CHANNEL_CAPACITY};
pub use peripherals::{ButtonLatches, LedController};
pub use routing::RoutingTable;
