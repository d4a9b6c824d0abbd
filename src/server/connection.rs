//! Per-connection state: buffered IO, protocol version, credentials, and
//! handler-private session data.

use crate::protocol::{self, Message, ProtocolError, ProtocolResult, ProtocolVersion};
use crate::user::User;
use crate::value::Value;
use bytes::BytesMut;
use std::collections::HashMap;
use std::io::{self, Write};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Byte stream a connection runs over (plain TCP or TLS).
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

const READ_BUFFER_SIZE: usize = 4096;

/// One client connection.
///
/// Replies accumulate in an output buffer and only hit the wire on
/// [`flush`](Connection::flush), which the server loop calls once per
/// complete reply. A failed handler's partial output is discarded with
/// [`reset_output`](Connection::reset_output) before the error frame is
/// written, keeping the wire consistent.
pub struct Connection {
    stream: Box<dyn Transport>,
    read_buf: BytesMut,
    write_buf: Vec<u8>,
    version: ProtocolVersion,
    /// Credentials attached by AUTH or HELLO.
    pub user: Option<User>,
    /// Scratch space private to command handlers.
    pub session: HashMap<String, Value>,
}

impl Connection {
    pub(crate) fn new(stream: Box<dyn Transport>) -> Connection {
        Connection {
            stream,
            read_buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            write_buf: Vec::new(),
            version: ProtocolVersion::default(),
            user: None,
            session: HashMap::new(),
        }
    }

    /// The dialect replies are encoded in. Starts at RESP2; HELLO switches it.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: ProtocolVersion) {
        self.version = version;
    }

    /// Read one complete message; `Ok(None)` on clean end of stream.
    pub(crate) async fn read_message(&mut self) -> ProtocolResult<Option<Message>> {
        loop {
            if let Some(message) = protocol::decode(&mut self.read_buf)? {
                return Ok(Some(message));
            }

            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                return Err(ProtocolError::EndOfStream);
            }
        }
    }

    /// Buffer a message in this connection's dialect.
    pub fn write_message(&mut self, message: &Message) -> io::Result<()> {
        message.encode(&mut self.write_buf, self.version)
    }

    /// Buffer a value in this connection's dialect.
    pub fn write_value(&mut self, value: &Value) -> io::Result<()> {
        value.encode(&mut self.write_buf, self.version)
    }

    pub fn write_simple_string(&mut self, s: &str) -> io::Result<()> {
        write!(self.write_buf, "+{}\r\n", s)
    }

    pub fn write_ok(&mut self) -> io::Result<()> {
        self.write_simple_string("OK")
    }

    /// Buffer `msg` framed as an application error (`ERR ` prefix).
    pub fn write_error(&mut self, msg: &str) -> io::Result<()> {
        self.write_value(&Value::error(msg))
    }

    /// Discard everything buffered since the last flush.
    pub fn reset_output(&mut self) {
        self.write_buf.clear();
    }

    /// Write the buffered reply to the transport.
    pub(crate) async fn flush(&mut self) -> io::Result<()> {
        if !self.write_buf.is_empty() {
            self.stream.write_all(&self.write_buf).await?;
            self.write_buf.clear();
        }
        self.stream.flush().await
    }
}
