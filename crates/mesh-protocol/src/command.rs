//! Peripheral commands carried in `MSG` content
//!
//! Content has no type tag. It is classified by looking at its shape:
//!
//! 1. `reset` clears the routing table
//! 2. anything mentioning `B1` or `B2` is a button update `<B1|B2>,<0|1>`
//! 3. everything else is offered to the LED interpreter, which ignores what
//!    it does not understand
//!
//! Rule 2 is a substring test, so an LED command that happens to contain
//! `B1` is misrouted to the button parser. [`CommandRouting::Strict`] only
//! accepts content that starts with `B1,`/`B2,`; [`CommandRouting::Sniff`]
//! keeps the substring behaviour for compatibility.

use crate::error::CommandError;
use crate::led::Led;

/// Content that resets the routing table
pub const RESET: &str = "reset";

/// Content broadcast when a button is pressed
pub const BLINK_LEDS: &str = "blink leds";

/// How button commands are told apart from LED commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CommandRouting {
    /// Any content containing `B1` or `B2` is a button command
    #[default]
    Sniff,
    /// Only content starting with `B1,` or `B2,` is a button command
    Strict,
}

/// One of the two device buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Button {
    One,
    Two,
}

impl Button {
    /// Wire id (`B1` / `B2`)
    pub fn id(self) -> &'static str {
        match self {
            Button::One => "B1",
            Button::Two => "B2",
        }
    }
}

/// Button state update: `B1,1`, `B2,0`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonCommand {
    pub button: Button,
    pub pressed: bool,
}

impl ButtonCommand {
    pub fn new(button: Button, pressed: bool) -> Self {
        Self { button, pressed }
    }

    /// Parse a `<B1|B2>,<0|1>` command
    pub fn parse(command: &str) -> Result<Self, CommandError> {
        let parts: Vec<&str> = command.split(',').collect();
        if parts.len() != 2 {
            return Err(CommandError::MalformedButton(command.to_string()));
        }

        let button = match parts[0] {
            "B1" => Button::One,
            "B2" => Button::Two,
            other => return Err(CommandError::UnknownButton(other.to_string())),
        };
        let pressed = match parts[1] {
            "1" => true,
            "0" => false,
            other => return Err(CommandError::InvalidButtonState(other.to_string())),
        };

        Ok(Self { button, pressed })
    }

    /// Wire form of this command
    pub fn encode(&self) -> String {
        format!("{},{}", self.button.id(), u8::from(self.pressed))
    }
}

/// Commands understood by the LED interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedCommand {
    /// `all on` / `all off`: the four port LEDs
    All(bool),
    /// `cycle leds`: strobe the port LEDs on, then off
    Cycle,
    /// `blink leds`: blink every LED several times
    Blink,
    /// `show listen on|off`: whether port LED changes are emitted
    ShowListen(bool),
    /// `show send on|off`: whether TX/RX LED changes are emitted
    ShowSend(bool),
    /// `<color> on|off` for pink, white, green, blue
    Set { led: Led, on: bool },
}

impl LedCommand {
    /// Parse an LED command, returning None for anything unrecognized
    pub fn parse(command: &str) -> Option<Self> {
        match command {
            "all on" => Some(LedCommand::All(true)),
            "all off" => Some(LedCommand::All(false)),
            "cycle leds" => Some(LedCommand::Cycle),
            BLINK_LEDS => Some(LedCommand::Blink),
            "show listen on" => Some(LedCommand::ShowListen(true)),
            "show listen off" => Some(LedCommand::ShowListen(false)),
            "show send on" => Some(LedCommand::ShowSend(true)),
            "show send off" => Some(LedCommand::ShowSend(false)),
            _ => {
                let (color, state) = command.split_once(' ')?;
                let led = Led::from_color(color)?;
                let on = match state {
                    "on" => true,
                    "off" => false,
                    _ => return None,
                };
                Some(LedCommand::Set { led, on })
            }
        }
    }
}

/// A classified peripheral command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Clear the routing table and blink once
    Reset,
    /// Latch a button state
    Button(ButtonCommand),
    /// Drive the LEDs
    Led(LedCommand),
    /// Offered to the LED interpreter but not understood
    Unrecognized,
}

impl Command {
    /// Classify message content
    ///
    /// Errors are only returned for content routed to the button parser.
    pub fn classify(content: &str, routing: CommandRouting) -> Result<Self, CommandError> {
        if content == RESET {
            return Ok(Command::Reset);
        }

        let is_button = match routing {
            CommandRouting::Sniff => content.contains("B1") || content.contains("B2"),
            CommandRouting::Strict => content.starts_with("B1,") || content.starts_with("B2,"),
        };
        if is_button {
            return ButtonCommand::parse(content).map(Command::Button);
        }

        Ok(LedCommand::parse(content).map_or(Command::Unrecognized, Command::Led))
    }
}
