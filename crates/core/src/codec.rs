//! Envelope codec and stream framing
//!
//! Frames are length-prefixed: a 4-byte big-endian length followed by a JSON
//! body. The first frame on every connection is the identification frame (a
//! JSON string holding the peer name); every frame after it is an
//! [`Envelope`].
//!
//! Decoding is split in three steps so a failure can be classified:
//! 1. parse the outer object (`MalformedFrame`)
//! 2. resolve the `type` tag against [`MessageKind`] (`UnknownType`)
//! 3. decode the payload for that kind (`SchemaMismatch`)
//!
//! A frame that fails any step is skipped by the reader; only a broken length
//! prefix (reported by the framing layer itself) desynchronizes the stream.

use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;
use tokio_util::codec::LengthDelimitedCodec;

use crate::envelope::{Envelope, MessageKind};
use crate::error::CoreResult;

/// Default upper bound on a single frame body
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// Frame-level decode failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Frame body is not a well-formed envelope object
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Envelope `type` tag is not a known message kind
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// Payload does not match the schema of its kind
    #[error("payload does not match schema for {kind}: {detail}")]
    SchemaMismatch {
        /// Kind named by the frame
        kind: MessageKind,
        /// Deserializer message
        detail: String,
    },
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
}

/// Build the length-delimited framing codec shared by every connection
pub fn frame_codec(max_frame_len: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .max_frame_length(max_frame_len)
        .big_endian()
        .new_codec()
}

/// Serialize an envelope into a frame body
pub fn encode(envelope: &Envelope) -> CoreResult<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(envelope)?))
}

/// Decode a frame body into an envelope
pub fn decode(frame: &[u8]) -> Result<Envelope, DecodeError> {
    let raw: RawEnvelope = serde_json::from_slice(frame)
        .map_err(|e| DecodeError::MalformedFrame(e.to_string()))?;

    let kind: MessageKind = raw
        .kind
        .parse()
        .map_err(|_| DecodeError::UnknownType(raw.kind.clone()))?;

    serde_json::from_slice(frame).map_err(|e| DecodeError::SchemaMismatch {
        kind,
        detail: e.to_string(),
    })
}

/// Serialize the identification frame carrying the peer name
pub fn encode_handshake(peer_name: &str) -> CoreResult<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(peer_name)?))
}

/// Decode the identification frame; the name must be non-blank
pub fn decode_handshake(frame: &[u8]) -> Result<String, DecodeError> {
    let name: String = serde_json::from_slice(frame)
        .map_err(|e| DecodeError::MalformedFrame(e.to_string()))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(DecodeError::MalformedFrame("empty peer name".to_string()));
    }
    Ok(name.to_string())
}
