//! Collaborator console
//!
//! Stands in for the GUI attached to a device's primary link: it injects
//! button frames and probes, and listens for `LED,<index>,<state>` reports
//! to keep a model of the device's LED panel.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use mesh_link::{DuplexLink, LinkError, PortId};
use mesh_protocol::{Button, ButtonCommand, Led, LedFrame, LineCodec, Message};
use mesh_sim::{DeviceError, DeviceHandle};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Last reported state of the six LEDs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedPanel {
    lit: [bool; 6],
}

impl LedPanel {
    /// Record a report; returns whether the LED changed
    pub fn apply(&mut self, frame: LedFrame) -> bool {
        let slot = &mut self.lit[usize::from(frame.led.index())];
        let changed = *slot != frame.on;
        *slot = frame.on;
        changed
    }

    pub fn is_on(&self, led: Led) -> bool {
        self.lit[usize::from(led.index())]
    }
}

impl fmt::Display for LedPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<String> = Led::ALL
            .iter()
            .map(|&led| format!("{}:{}", led.color(), if self.is_on(led) { "on" } else { "off" }))
            .collect();
        write!(f, "{}", cells.join(" "))
    }
}

/// Console endpoint on one device's primary link
#[derive(Clone)]
pub struct Console {
    device: String,
    link: DuplexLink,
    panel: Arc<Mutex<LedPanel>>,
}

impl Console {
    /// Connect a new console to `device`'s primary port and start listening
    pub fn attach(device: &DeviceHandle) -> Result<(Self, JoinHandle<()>), DeviceError> {
        let link = DuplexLink::new();
        device.connect(PortId::Primary, &link)?;

        let console = Self {
            device: device.name().to_string(),
            link,
            panel: Arc::new(Mutex::new(LedPanel::default())),
        };
        let listener = tokio::spawn(console.clone().listen());
        Ok((console, listener))
    }

    /// Send a button press frame
    pub fn press(&self, button: Button) -> Result<(), LinkError> {
        self.write(&ButtonCommand::new(button, true).encode())
    }

    /// Send a button release frame
    pub fn release(&self, button: Button) -> Result<(), LinkError> {
        self.write(&ButtonCommand::new(button, false).encode())
    }

    pub fn ping(&self) -> Result<(), LinkError> {
        self.write(&Message::Ping.to_string())
    }

    /// Current LED panel model
    pub fn panel(&self) -> LedPanel {
        *self.panel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, line: &str) -> Result<(), LinkError> {
        debug!("Console -> {}: {}", self.device, line);
        self.link.write(format!("{}\n", line).as_bytes())
    }

    async fn listen(self) {
        let mut codec = LineCodec::new();
        loop {
            let first = match self.link.read(1).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!("Console for {} closed: {}", self.device, e);
                    return;
                }
            };
            codec.push_bytes(&first);

            let waiting = self.link.available();
            if waiting > 0 {
                match self.link.read(waiting).await {
                    Ok(bytes) => codec.push_bytes(&bytes),
                    Err(_) => return,
                }
            }

            while let Some(line) = codec.next_line() {
                self.handle_line(&line);
            }
        }
    }

    fn handle_line(&self, line: &str) {
        if line.starts_with("LED,") {
            match LedFrame::parse(line) {
                Ok(frame) => {
                    let changed = self
                        .panel
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .apply(frame);
                    if changed {
                        debug!("{} LED {} {}", self.device, frame.led.color(), if frame.on { "on" } else { "off" });
                    }
                }
                Err(e) => warn!("Bad LED report from {}: {}", self.device, e),
            }
            return;
        }

        info!("{} says: {}", self.device, line);
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console")
            .field("device", &self.device)
            .field("connected", &self.link.is_connected())
            .finish()
    }
}
