//! Per-device port set
//!
//! Every device owns one primary link (the "hardware" serial, index `-1`) and
//! four secondary links (indices `0..=3`) used for device-to-device wiring.
//! All five ends are created eagerly and are never absent: disconnecting or
//! reconnecting a port closes the old end and installs a fresh one.
//!
//! Each slot is guarded by its own mutex. Connect/disconnect swap the slot
//! under the lock; reads and writes clone the current end under the lock and
//! then operate on it, so a blocked read never holds a port hostage. Closing
//! the end wakes the reader instead.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::error::LinkError;
use crate::link::DuplexLink;

/// Number of secondary ports per device
pub const SECONDARY_PORTS: usize = 4;

/// Wire index used for the primary port
pub const PRIMARY_INDEX: i32 = -1;

/// One of the four secondary ports, valid by construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SecondaryPort(u8);

impl SecondaryPort {
    /// All secondary ports in polling order
    pub const ALL: [SecondaryPort; SECONDARY_PORTS] = [
        SecondaryPort(0),
        SecondaryPort(1),
        SecondaryPort(2),
        SecondaryPort(3),
    ];

    /// Create a port from an index in `0..=3`
    pub fn new(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Index of this port (0-3)
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for SecondaryPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i32> for SecondaryPort {
    type Error = LinkError;

    fn try_from(index: i32) -> Result<Self, Self::Error> {
        usize::try_from(index)
            .ok()
            .and_then(Self::new)
            .ok_or(LinkError::InvalidPort(index))
    }
}

/// Address of a port on a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortId {
    /// The hardware serial connected to the collaborator
    Primary,
    /// One of the device-to-device ports
    Secondary(SecondaryPort),
}

impl PortId {
    /// Wire index: -1 for primary, 0-3 for secondary ports
    pub fn index(self) -> i32 {
        match self {
            PortId::Primary => PRIMARY_INDEX,
            PortId::Secondary(port) => port.index() as i32,
        }
    }

    /// The secondary port, if this is one
    pub fn secondary(self) -> Option<SecondaryPort> {
        match self {
            PortId::Primary => None,
            PortId::Secondary(port) => Some(port),
        }
    }
}

impl From<SecondaryPort> for PortId {
    fn from(port: SecondaryPort) -> Self {
        PortId::Secondary(port)
    }
}

impl TryFrom<i32> for PortId {
    type Error = LinkError;

    fn try_from(index: i32) -> Result<Self, Self::Error> {
        if index == PRIMARY_INDEX {
            Ok(PortId::Primary)
        } else {
            SecondaryPort::try_from(index).map(PortId::Secondary)
        }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortId::Primary => write!(f, "primary"),
            PortId::Secondary(port) => write!(f, "port {}", port),
        }
    }
}

fn lock(slot: &Mutex<DuplexLink>) -> MutexGuard<'_, DuplexLink> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The five link ends owned by a device
pub struct PortSet {
    primary: Mutex<DuplexLink>,
    secondary: [Mutex<DuplexLink>; SECONDARY_PORTS],
}

impl Default for PortSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PortSet {
    /// Create a port set with every port unconnected
    pub fn new() -> Self {
        Self {
            primary: Mutex::new(DuplexLink::new()),
            secondary: std::array::from_fn(|_| Mutex::new(DuplexLink::new())),
        }
    }

    fn slot(&self, port: PortId) -> &Mutex<DuplexLink> {
        match port {
            PortId::Primary => &self.primary,
            PortId::Secondary(port) => &self.secondary[port.index()],
        }
    }

    /// Handle to the link end currently installed on `port`
    ///
    /// Pass this to another device's [`PortSet::connect`] (or call
    /// [`DuplexLink::connect`] on it) to wire the two ports together.
    pub fn link(&self, port: PortId) -> DuplexLink {
        lock(self.slot(port)).clone()
    }

    /// Connect `port` to `other`, replacing any existing connection
    ///
    /// If the port is already connected its end is closed and a fresh end is
    /// installed before connecting.
    pub fn connect(&self, port: PortId, other: &DuplexLink) -> Result<(), LinkError> {
        let mut slot = lock(self.slot(port));
        if slot.is_connected() {
            debug!("Replacing existing connection on {}", port);
            slot.close();
            *slot = DuplexLink::new();
        }
        slot.connect(other)
    }

    /// Close the link on `port` and install a fresh unconnected end
    pub fn disconnect(&self, port: PortId) {
        let mut slot = lock(self.slot(port));
        slot.close();
        *slot = DuplexLink::new();
        debug!("Disconnected {}", port);
    }

    /// Whether `port` currently has a peer
    pub fn is_connected(&self, port: PortId) -> bool {
        lock(self.slot(port)).is_connected()
    }

    /// Write `text` followed by a newline; no-op if the port is not connected
    pub fn write_line(&self, port: PortId, text: &str) {
        let link = self.link(port);
        trace!("Writing to {}: {}", port, text);

        let mut frame = Vec::with_capacity(text.len() + 1);
        frame.extend_from_slice(text.as_bytes());
        frame.push(b'\n');

        if let Err(e) = link.write(&frame) {
            debug!("Cannot write to {}: {}", port, e);
        }
    }

    /// Read one line from `port`, without its newline
    ///
    /// Returns an empty string immediately if the port is not connected. For
    /// secondary ports an empty string is also returned when nothing is
    /// waiting. Otherwise waits for a complete line; if the link is closed
    /// while waiting the result is empty.
    pub async fn read_line(&self, port: PortId) -> String {
        let link = self.link(port);
        if !link.is_connected() {
            debug!("{} is not connected", port);
            return String::new();
        }
        if matches!(port, PortId::Secondary(_)) && link.available() == 0 {
            return String::new();
        }

        match link.read_line().await {
            Ok(line) => line,
            Err(e) => {
                debug!("Read on {} interrupted: {}", port, e);
                String::new()
            }
        }
    }

    /// Wait until a complete line is waiting on `port`
    ///
    /// Never completes while the port has no peer, or after its link has been
    /// closed; bound the wait with [`tokio::time::timeout`].
    pub async fn wait_line(&self, port: PortId) {
        let link = self.link(port);
        if let Err(e) = link.wait_line().await {
            trace!("No line will arrive on {}: {}", port, e);
            std::future::pending::<()>().await;
        }
    }

    /// Bytes waiting to be read on `port`
    pub fn available(&self, port: PortId) -> usize {
        lock(self.slot(port)).available()
    }

    /// Discard everything waiting to be read on `port`
    pub fn clear(&self, port: PortId) {
        lock(self.slot(port)).clear();
    }

    /// Flush `port`
    pub fn flush(&self, port: PortId) {
        lock(self.slot(port)).flush();
    }

    /// Close every port; used when the owning device shuts down
    pub fn close_all(&self) {
        self.disconnect(PortId::Primary);
        for port in SecondaryPort::ALL {
            self.disconnect(port.into());
        }
    }
}

impl fmt::Debug for PortSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secondary: Vec<bool> = SecondaryPort::ALL
            .iter()
            .map(|&p| self.is_connected(p.into()))
            .collect();
        f.debug_struct("PortSet")
            .field("primary", &self.is_connected(PortId::Primary))
            .field("secondary", &secondary)
            .finish()
    }
}
