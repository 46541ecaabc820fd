//! Button latches and LED controller
//!
//! Buttons are latched: each state update overwrites the latch, and a press
//! is remembered until the poll loop consumes it or a release clears it. LED changes are reported
//! to the collaborator on the primary port as `LED,<index>,<state>` frames
//! and mirrored on the event channel.

use std::sync::Arc;
use std::time::Duration;

use mesh_link::{PortId, PortSet, SecondaryPort};
use mesh_protocol::{Button, ButtonCommand, Led, LedCommand, LedFrame};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::DeviceConfig;
use crate::events::DeviceEvent;

/// Pending button presses
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ButtonLatches {
    one: bool,
    two: bool,
}

impl ButtonLatches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest state reported for a button
    pub fn apply(&mut self, command: ButtonCommand) {
        if command.pressed {
            debug!("{} pressed", command.button.id());
        } else {
            debug!("{} released", command.button.id());
        }
        *self.slot(command.button) = command.pressed;
    }

    /// Whether a press is waiting for `button`
    pub fn is_pressed(&self, button: Button) -> bool {
        match button {
            Button::One => self.one,
            Button::Two => self.two,
        }
    }

    /// Consume a pending press, returning whether there was one
    pub fn take(&mut self, button: Button) -> bool {
        std::mem::take(self.slot(button))
    }

    fn slot(&mut self, button: Button) -> &mut bool {
        match button {
            Button::One => &mut self.one,
            Button::Two => &mut self.two,
        }
    }
}

/// Drives the six LEDs through the primary port
#[derive(Debug)]
pub struct LedController {
    ports: Arc<PortSet>,
    events: broadcast::Sender<DeviceEvent>,
    show_listening: bool,
    show_sending: bool,
    cycle_delay: Duration,
    blink_count: u32,
    blink_delay: Duration,
}

impl LedController {
    pub fn new(
        ports: Arc<PortSet>,
        events: broadcast::Sender<DeviceEvent>,
        config: &DeviceConfig,
    ) -> Self {
        Self {
            ports,
            events,
            show_listening: config.show_listening,
            show_sending: config.show_sending,
            cycle_delay: config.cycle_leds_delay(),
            blink_count: config.blink_count,
            blink_delay: config.blink_delay(),
        }
    }

    pub fn show_listening(&self) -> bool {
        self.show_listening
    }

    pub fn show_sending(&self) -> bool {
        self.show_sending
    }

    /// Report `led` as on or off, unless its visibility flag is cleared
    ///
    /// Port LEDs follow the listening flag, TX and RX follow the sending flag.
    pub fn show(&self, led: Led, on: bool) {
        let visible = if led.is_port() {
            self.show_listening
        } else {
            self.show_sending
        };
        if !visible {
            return;
        }

        self.ports
            .write_line(PortId::Primary, &LedFrame::new(led, on).to_string());
        let _ = self.events.send(DeviceEvent::Led { led, on });
    }

    /// Report the LED belonging to a secondary port
    pub fn show_port(&self, port: SecondaryPort, on: bool) {
        if let Some(led) = Led::for_port(port.index()) {
            self.show(led, on);
        }
    }

    /// Run an LED command
    pub async fn execute(&mut self, command: LedCommand) {
        debug!("LED command: {:?}", command);
        match command {
            LedCommand::All(on) => {
                for led in Led::PORTS {
                    self.show(led, on);
                }
            }
            LedCommand::Cycle => self.cycle().await,
            LedCommand::Blink => self.blink(self.blink_count, self.blink_delay).await,
            LedCommand::ShowListen(show) => {
                info!("Listening LEDs {}", if show { "shown" } else { "hidden" });
                if !show {
                    for led in Led::PORTS {
                        self.show(led, false);
                    }
                }
                self.show_listening = show;
            }
            LedCommand::ShowSend(show) => {
                info!("Sending LEDs {}", if show { "shown" } else { "hidden" });
                if !show {
                    self.show(Led::Tx, false);
                    self.show(Led::Rx, false);
                }
                self.show_sending = show;
            }
            LedCommand::Set { led, on } => self.show(led, on),
        }
    }

    /// Strobe the port LEDs on in order, then off in order
    pub async fn cycle(&self) {
        for on in [true, false] {
            for led in Led::PORTS {
                self.show(led, on);
                sleep(self.cycle_delay).await;
            }
        }
    }

    /// Turn every LED on then off, `count` times
    pub async fn blink(&self, count: u32, delay: Duration) {
        for _ in 0..count {
            for on in [true, false] {
                for led in Led::ALL {
                    self.show(led, on);
                }
                sleep(delay).await;
            }
        }
    }
}
