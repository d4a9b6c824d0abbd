//! Wire protocol: message framing and the RESP2/RESP3 codec.
//!
//! The reader accumulates bytes in a [`bytes::BytesMut`] and yields one
//! [`Message`] per complete frame; the writer encodes values into a reply
//! buffer in either dialect. See the RESP3 specification:
//! https://redis.io/docs/reference/protocol-spec/

pub mod message;
pub mod reader;
pub mod writer;

pub use message::{Message, MessageKind};
pub use reader::decode;

use std::io;
use thiserror::Error;

/// Codec and transport errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// I/O error on the underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Unknown frame type byte
    #[error("invalid message type: 0x{0:02x}")]
    InvalidType(u8),

    /// Malformed decimal integer in a header or integer frame
    #[error("invalid integer: {0}")]
    BadInteger(#[from] std::num::ParseIntError),

    /// Malformed double frame
    #[error("invalid double: {0}")]
    BadDouble(#[from] std::num::ParseFloatError),

    /// Malformed big number frame
    #[error("invalid big number")]
    BadBigInt,

    /// Text frame that is not valid UTF-8
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// `$?` / `*?` streaming aggregates are not supported
    #[error("streaming aggregates are not implemented")]
    StreamingNotImplemented,

    /// The peer closed the stream mid-frame
    #[error("unexpected end of stream")]
    EndOfStream,

    /// The buffer does not yet hold a complete frame
    #[error("incomplete frame")]
    Incomplete,

    /// Any other framing violation
    #[error("protocol error: {0}")]
    Frame(String),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Per-connection wire dialect. Connections start in RESP2 and may upgrade
/// with `HELLO 3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    #[default]
    Resp2,
    Resp3,
}

impl ProtocolVersion {
    /// Parse the version token of a HELLO command.
    pub fn from_token(token: &str) -> Option<ProtocolVersion> {
        match token {
            "2" => Some(ProtocolVersion::Resp2),
            "3" => Some(ProtocolVersion::Resp3),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::Resp2 => "2",
            ProtocolVersion::Resp3 => "3",
        }
    }
}
