//! Device tuning parameters
//!
//! All delays are in milliseconds. The defaults match the timing of the
//! hardware devices; tests shorten or offset them freely.

use std::time::Duration;

use mesh_protocol::CommandRouting;
use serde::{Deserialize, Serialize};

/// Timing and behaviour settings for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Extra delay before each poll round
    pub cycle_delay_ms: u64,
    /// Listening window per port before checking for input
    pub port_check_delay_ms: u64,
    /// Wait for CTS after sending RTS
    pub after_rts_delay_ms: u64,
    /// Wait for MSG after sending CTS
    pub after_cts_delay_ms: u64,
    /// RTS attempts before a send is abandoned
    pub rts_attempts: u32,
    /// Per-LED delay for `cycle leds`
    pub cycle_leds_delay_ms: u64,
    /// Number of blinks for `blink leds`
    pub blink_count: u32,
    /// On and off time of each blink
    pub blink_delay_ms: u64,
    /// On and off time of the single blink after `reset`
    pub reset_blink_ms: u64,
    /// Initial state of the port LED visibility flag
    pub show_listening: bool,
    /// Initial state of the TX/RX LED visibility flag
    pub show_sending: bool,
    /// How button commands are recognised in message content
    pub command_routing: CommandRouting,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            cycle_delay_ms: 0,
            port_check_delay_ms: 500,
            after_rts_delay_ms: 500,
            after_cts_delay_ms: 500,
            rts_attempts: 20,
            cycle_leds_delay_ms: 100,
            blink_count: 10,
            blink_delay_ms: 500,
            reset_blink_ms: 2000,
            show_listening: true,
            show_sending: true,
            command_routing: CommandRouting::Sniff,
        }
    }
}

impl DeviceConfig {
    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }

    pub fn port_check_delay(&self) -> Duration {
        Duration::from_millis(self.port_check_delay_ms)
    }

    pub fn after_rts_delay(&self) -> Duration {
        Duration::from_millis(self.after_rts_delay_ms)
    }

    pub fn after_cts_delay(&self) -> Duration {
        Duration::from_millis(self.after_cts_delay_ms)
    }

    pub fn cycle_leds_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_leds_delay_ms)
    }

    pub fn blink_delay(&self) -> Duration {
        Duration::from_millis(self.blink_delay_ms)
    }

    pub fn reset_blink(&self) -> Duration {
        Duration::from_millis(self.reset_blink_ms)
    }
}
