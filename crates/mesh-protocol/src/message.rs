//! Wire messages exchanged between devices
//!
//! Every frame is a single line of text terminated by `\n` on the wire. The
//! terminator is added and stripped by the link layer, so everything here
//! works on the bare line.
//!
//! # Format
//! - Control: `RTS`, `CTS`, `PING`, `PONG`
//! - Application: `MSG,<content>,<destination>,<sender>`
//! - Button input (primary link only): `B1,<0|1>`, `B2,<0|1>`
//!
//! The destination and sender fields are taken from the right, so the content
//! field may itself contain commas (`MSG,B1,1,bob,alice` carries `B1,1`).

use std::fmt;

use crate::error::ParseError;

/// Maximum length of a device name in characters
pub const MAX_NAME_LEN: usize = 10;

/// Name used for routing entries that have not been learned yet
pub const UNKNOWN_DEVICE: &str = "UNKNOWN";

/// Destination field value addressing every known route
pub const KNOWN_ROUTES: &str = "?";

/// Where an application message is headed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Destination {
    /// A single device, by name
    Device(String),
    /// Every route whose name has been learned (`?`)
    Known,
    /// Every route, known or not (empty field)
    All,
}

impl Destination {
    /// Interpret a destination field from the wire
    pub fn from_field(field: &str) -> Self {
        match field {
            KNOWN_ROUTES => Destination::Known,
            "" => Destination::All,
            name => Destination::Device(name.to_string()),
        }
    }

    /// The wire representation of this destination
    pub fn as_field(&self) -> &str {
        match self {
            Destination::Device(name) => name,
            Destination::Known => KNOWN_ROUTES,
            Destination::All => "",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Device(name) => write!(f, "{}", name),
            Destination::Known => write!(f, "all known routes"),
            Destination::All => write!(f, "all routes"),
        }
    }
}

/// The payload of a `MSG` frame
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Envelope {
    /// Command text interpreted by the receiving device
    pub content: String,
    /// Addressing scope
    pub destination: Destination,
    /// Name of the device that put this frame on the link
    pub sender: String,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(content: impl Into<String>, destination: Destination, sender: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            destination,
            sender: sender.into(),
        }
    }

    /// Parse the fields following `MSG,`
    fn parse_fields(fields: &str) -> Result<Self, ParseError> {
        let mut parts = fields.rsplitn(3, ',');
        let sender = parts.next();
        let destination = parts.next();
        let content = parts.next();

        match (content, destination, sender) {
            (Some(content), Some(destination), Some(sender)) => Ok(Self {
                content: content.to_string(),
                destination: Destination::from_field(destination),
                sender: sender.to_string(),
            }),
            _ => Err(ParseError::FieldCount {
                kind: "MSG",
                expected: 4,
                actual: fields.split(',').count() + 1,
            }),
        }
    }
}

/// A single frame on a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Request to send
    Rts,
    /// Clear to send
    Cts,
    /// Liveness probe
    Ping,
    /// Liveness reply
    Pong,
    /// Application message
    Msg(Envelope),
    /// Raw button frame (`B1,1` etc.), parsed by the command layer
    Button(String),
}

impl Message {
    /// Parse a line (without its terminator) into a message
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let (token, rest) = match line.split_once(',') {
            Some((token, rest)) => (token, Some(rest)),
            None => (line, None),
        };

        match token {
            "RTS" => Ok(Message::Rts),
            "CTS" => Ok(Message::Cts),
            "PING" => Ok(Message::Ping),
            "PONG" => Ok(Message::Pong),
            "MSG" => match rest {
                Some(fields) => Ok(Message::Msg(Envelope::parse_fields(fields)?)),
                None => Err(ParseError::FieldCount {
                    kind: "MSG",
                    expected: 4,
                    actual: 1,
                }),
            },
            "B1" | "B2" => Ok(Message::Button(line.to_string())),
            other => Err(ParseError::UnknownType(other.to_string())),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Rts => write!(f, "RTS"),
            Message::Cts => write!(f, "CTS"),
            Message::Ping => write!(f, "PING"),
            Message::Pong => write!(f, "PONG"),
            Message::Msg(env) => write!(
                f,
                "MSG,{},{},{}",
                env.content,
                env.destination.as_field(),
                env.sender
            ),
            Message::Button(raw) => write!(f, "{}", raw),
        }
    }
}

/// Normalize a device name so it can travel in a wire field
///
/// Names are truncated to [`MAX_NAME_LEN`] characters. Empty names, names
/// containing field or line separators, the broadcast marker `?` and the
/// reserved [`UNKNOWN_DEVICE`] marker are rejected.
pub fn validate_name(name: &str) -> Result<String, ParseError> {
    let name: String = name.trim().chars().take(MAX_NAME_LEN).collect();

    if name.is_empty()
        || name == UNKNOWN_DEVICE
        || name.contains([',', '?', '\n', '\r'])
    {
        return Err(ParseError::InvalidName(name));
    }

    Ok(name)
}
