//! Error types for SwarmLink mesh operations.
//!
//! Every variant here is scoped to a single connection, delivery or beacon:
//! none of them is allowed to take down the listener, the registry or the
//! broadcast handler.

use std::net::SocketAddr;
use swarmlink_core::codec::DecodeError;
use swarmlink_core::envelope::MessageKind;
use swarmlink_core::CoreError;
use thiserror::Error;

/// Errors that can occur in mesh operations.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Peer did not identify itself correctly in time
    #[error("Handshake failed with {peer}: {reason}")]
    Handshake {
        /// Remote address
        peer: SocketAddr,
        /// What went wrong
        reason: String,
    },

    /// Frame could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Length prefix out of bounds; the stream can no longer be trusted
    #[error("Stream desynchronized: {0}")]
    Desync(String),

    /// No route handler or provider answered a request
    #[error("No provider answered {kind}")]
    DispatchMiss {
        /// Kind of the unanswered request
        kind: MessageKind,
    },

    /// Socket-level failure
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Beacon could not be sent
    #[error("Broadcast send failed: {0}")]
    BroadcastSend(String),

    /// Outbound queue of a connection is gone
    #[error("Connection {0} is closed")]
    ConnectionClosed(u64),

    /// Encoding or configuration failure from the core crate
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Result type for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;
