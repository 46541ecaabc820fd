//! Error types for mesh protocol parsing

use thiserror::Error;

/// Errors that can occur while parsing a wire frame
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line carried no bytes at all
    #[error("empty frame")]
    Empty,

    /// Leading token is not a known message type
    #[error("unknown message type: {0:?}")]
    UnknownType(String),

    /// Frame had the wrong number of comma separated fields
    #[error("malformed {kind} frame: expected {expected} fields, got {actual}")]
    FieldCount {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Device name cannot be carried in a wire field
    #[error("invalid device name: {0:?}")]
    InvalidName(String),

    /// LED frame with an out-of-range index or state
    #[error("invalid LED frame: {0:?}")]
    InvalidLed(String),
}

/// Errors produced by the peripheral command layer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Button command without exactly two fields
    #[error("malformed button command: {0:?}")]
    MalformedButton(String),

    /// Button id other than B1 or B2
    #[error("unknown button: {0:?}")]
    UnknownButton(String),

    /// Button state other than 0 or 1
    #[error("invalid button state: {0:?}")]
    InvalidButtonState(String),
}
