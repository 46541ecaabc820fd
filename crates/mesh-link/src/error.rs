//! Error types for emulated links

use thiserror::Error;

/// Errors that can occur on an emulated link or port
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// This end already has a peer
    #[error("link is already connected")]
    AlreadyConnected,

    /// The requested peer already has a peer
    #[error("peer link is already connected")]
    PeerAlreadyConnected,

    /// Attempted to connect a link to itself
    #[error("cannot connect a link to itself")]
    SelfConnection,

    /// Operation requires a connected link
    #[error("link is not connected")]
    NotConnected,

    /// The link was closed while waiting for data
    #[error("link closed")]
    Closed,

    /// Port index outside the primary/secondary range
    #[error("invalid port index: {0}")]
    InvalidPort(i32),
}
