//! LED identifiers and the `LED,<index>,<state>` output frame
//!
//! A device reports LED changes on its primary link so the attached
//! collaborator can render them. The six LEDs are:
//!
//! | Index | LED | Meaning |
//! |---|---|---|
//! | 0 | Pink | secondary port 0 |
//! | 1 | White | secondary port 1 |
//! | 2 | Green | secondary port 2 |
//! | 3 | Blue | secondary port 3 |
//! | 4 | Red | TX |
//! | 5 | Yellow | RX |

use std::fmt;

use crate::error::ParseError;

/// One of the six device LEDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Led {
    Pink,
    White,
    Green,
    Blue,
    Tx,
    Rx,
}

impl Led {
    /// All LEDs in index order
    pub const ALL: [Led; 6] = [Led::Pink, Led::White, Led::Green, Led::Blue, Led::Tx, Led::Rx];

    /// The four LEDs tied to secondary ports
    pub const PORTS: [Led; 4] = [Led::Pink, Led::White, Led::Green, Led::Blue];

    /// Wire index of this LED
    pub fn index(self) -> u8 {
        match self {
            Led::Pink => 0,
            Led::White => 1,
            Led::Green => 2,
            Led::Blue => 3,
            Led::Tx => 4,
            Led::Rx => 5,
        }
    }

    /// LED for a wire index
    pub fn from_index(index: u8) -> Option<Self> {
        Led::ALL.get(usize::from(index)).copied()
    }

    /// LED for a secondary port index (0-3)
    pub fn for_port(port: usize) -> Option<Self> {
        Led::PORTS.get(port).copied()
    }

    /// Look up a port LED by its color name
    pub fn from_color(color: &str) -> Option<Self> {
        match color {
            "pink" => Some(Led::Pink),
            "white" => Some(Led::White),
            "green" => Some(Led::Green),
            "blue" => Some(Led::Blue),
            _ => None,
        }
    }

    /// Whether this LED shows port activity (as opposed to TX/RX)
    pub fn is_port(self) -> bool {
        self.index() < 4
    }

    /// Human-readable color name
    pub fn color(self) -> &'static str {
        match self {
            Led::Pink => "pink",
            Led::White => "white",
            Led::Green => "green",
            Led::Blue => "blue",
            Led::Tx => "red",
            Led::Rx => "yellow",
        }
    }
}

/// An LED state report sent to the collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedFrame {
    pub led: Led,
    pub on: bool,
}

impl LedFrame {
    pub fn new(led: Led, on: bool) -> Self {
        Self { led, on }
    }

    /// Parse an `LED,<index>,<0|1>` line
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() != 3 {
            return Err(ParseError::FieldCount {
                kind: "LED",
                expected: 3,
                actual: parts.len(),
            });
        }
        if parts[0] != "LED" {
            return Err(ParseError::UnknownType(parts[0].to_string()));
        }

        let led = parts[1]
            .parse::<u8>()
            .ok()
            .and_then(Led::from_index)
            .ok_or_else(|| ParseError::InvalidLed(line.to_string()))?;
        let on = match parts[2] {
            "1" => true,
            "0" => false,
            _ => return Err(ParseError::InvalidLed(line.to_string())),
        };

        Ok(Self { led, on })
    }
}

impl fmt::Display for LedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LED,{},{}", self.led.index(), u8::from(self.on))
    }
}
