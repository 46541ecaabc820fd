//! Observable device activity
//!
//! Every device publishes what it does on a broadcast channel. Observers
//! (tests, the CLI, a visualiser) subscribe through
//! [`DeviceHandle::subscribe`](crate::DeviceHandle::subscribe); a device with
//! no subscribers simply drops the events.

use mesh_link::{PortId, SecondaryPort};
use mesh_protocol::{Button, Envelope, Led};

/// Capacity of each device's event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Something a device did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------
    /// The poll loop started
    Started,
    /// The poll loop exited and the ports were closed
    Stopped,
    /// The poll loop is blocked waiting for resume or step
    Paused,
    /// The poll loop left the paused state
    Resumed,
    /// A single step was taken while paused
    Stepped,

    // -------------------------------------------------------------------------
    // Protocol
    // -------------------------------------------------------------------------
    /// An application message was accepted
    MessageReceived {
        /// Port the message arrived on
        port: PortId,
        /// The message itself
        envelope: Envelope,
    },
    /// A message went out after a successful handshake
    MessageSent {
        port: SecondaryPort,
        envelope: Envelope,
        /// RTS attempts used, including the successful one
        attempts: u32,
    },
    /// A message was abandoned
    SendFailed {
        port: SecondaryPort,
        envelope: Envelope,
        /// RTS attempts made (zero if the port was not connected)
        attempts: u32,
    },
    /// A routing table entry was written
    RouteLearned { port: SecondaryPort, name: String },
    /// The routing table was reset
    RoutesCleared,

    // -------------------------------------------------------------------------
    // Peripherals
    // -------------------------------------------------------------------------
    /// A latched button press was consumed
    ButtonPressed(Button),
    /// An LED state report was emitted on the primary port
    Led { led: Led, on: bool },
}

impl DeviceEvent {
    /// Port a send attempt targeted, for either outcome
    pub fn send_port(&self) -> Option<SecondaryPort> {
        match self {
            DeviceEvent::MessageSent { port, .. } | DeviceEvent::SendFailed { port, .. } => {
                Some(*port)
            }
            _ => None,
        }
    }
}
