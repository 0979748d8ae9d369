use std::io;

use thiserror::Error;
use wiremq_core::endpoint::EndpointError;
use wiremq_core::queue::QueueError;

use crate::codec::CodecError;

/// Errors surfaced by the wire protocol and the socket patterns.
#[derive(Debug, Error)]
pub enum WireError {
    /// IO error on the underlying stream.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Peer closed the stream mid-read. This is the terminal signal of a
    /// connection's frame sequence, not an application error.
    #[error("end of stream")]
    EndOfStream,

    /// Greeting or READY exchange went wrong. Fatal to that connection.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Malformed frame or command. Fatal to the operation (and, on a read
    /// path, to the connection: there is no resynchronization).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Size field inconsistent with the buffer it describes.
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Unsupported or malformed bind/connect address.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// send/receive before the required connect + handshake.
    #[error("socket is not connected")]
    NotConnected,

    /// REP send before any request was received.
    #[error("no active connection to reply to")]
    NoActiveConnection,

    /// Socket reused beyond its single-use bind contract.
    #[error("socket is already bound")]
    AlreadyBound,

    /// Socket reused beyond its single-use connect contract.
    #[error("socket is already connected")]
    AlreadyConnected,

    /// A multipart message needs at least one part.
    #[error("a message needs at least one part")]
    EmptyMessage,
}

/// Result type alias for wiremq operations.
pub type Result<T> = std::result::Result<T, WireError>;

impl WireError {
    pub fn handshake(msg: impl Into<String>) -> Self {
        Self::Handshake(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// True when this error is the peer simply going away.
    #[must_use]
    pub const fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }
}
