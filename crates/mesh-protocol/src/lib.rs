//! Mesh Protocol Library
//!
//! This crate provides parsing and encoding for the line-oriented protocol
//! spoken by simulated serial mesh devices:
//!
//! - **Control frames**: `RTS` / `CTS` handshake and `PING` / `PONG` probes
//! - **Application frames**: `MSG,<content>,<destination>,<sender>`
//! - **Peripheral commands**: button and LED commands carried in `MSG` content
//! - **LED reports**: `LED,<index>,<state>` frames sent to the collaborator
//!
//! Framing is newline based. The link layer adds and strips the terminator;
//! [`LineCodec`] is available for consumers that buffer raw bytes.
//!
//! # Example
//!
//! ```rust
//! use mesh_protocol::{Command, CommandRouting, Destination, Message};
//!
//! let msg = Message::parse("MSG,blink leds,?,alice").unwrap();
//! let Message::Msg(envelope) = msg else { unreachable!() };
//! assert_eq!(envelope.destination, Destination::Known);
//!
//! let command = Command::classify(&envelope.content, CommandRouting::Sniff).unwrap();
//! assert!(matches!(command, Command::Led(_)));
//! ```

pub mod codec;
pub mod command;
pub mod error;
pub mod led;
pub mod message;

pub use codec::LineCodec;
pub use command::{Button, ButtonCommand, Command, CommandRouting, LedCommand, BLINK_LEDS, RESET};
pub use error::{CommandError, ParseError};
pub use led::{Led, LedFrame};
pub use message::{
    validate_name, Destination, Envelope, Message, KNOWN_ROUTES, MAX_NAME_LEN, UNKNOWN_DEVICE,
};
