//! Minimal async client.
//!
//! Enough to drive a merz server from an application or a test: one
//! request, one reply, no pipelining. Requests are framed as RESP arrays
//! of bulk strings, which both dialects accept.

use crate::protocol::{self, Message, ProtocolError, ProtocolResult, ProtocolVersion};
use crate::user::User;
use crate::value::Value;
use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const READ_BUFFER_SIZE: usize = 4096;

pub struct Client {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: Vec<u8>,
    version: ProtocolVersion,
}

impl Client {
    pub async fn connect(addr: &str) -> io::Result<Client> {
        Ok(Client {
            stream: TcpStream::connect(addr).await?,
            read_buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            write_buf: Vec::new(),
            version: ProtocolVersion::Resp3,
        })
    }

    /// The dialect requests are encoded in.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Send one command and read its reply.
    pub async fn command<S: AsRef<str>>(&mut self, args: &[S]) -> ProtocolResult<Message> {
        let request = Value::array(args.iter().map(|a| a.as_ref().to_string()));
        self.write_value(&request)?;
        self.flush().await?;
        self.read_message().await
    }

    /// HELLO handshake, optionally authenticating. On a non-error reply the
    /// client's own dialect follows the negotiated version.
    pub async fn hello(
        &mut self,
        proto: ProtocolVersion,
        user: Option<&User>,
    ) -> ProtocolResult<Message> {
        match proto {
            ProtocolVersion::Resp3 => {
                self.write_message(&Message::hello(user.cloned()))?;
            }
            ProtocolVersion::Resp2 => {
                let mut args: Vec<String> = vec!["HELLO".into(), proto.as_str().into()];
                if let Some(user) = user {
                    args.extend(["AUTH".into(), user.name.clone(), user.password.clone()]);
                }
                self.write_value(&Value::array(args))?;
            }
        }
        self.flush().await?;

        let reply = self.read_message().await?;
        if reply.value.as_error().is_none() {
            self.version = proto;
        }
        Ok(reply)
    }

    /// `AUTH <name> <password>`.
    pub async fn auth(&mut self, name: &str, password: &str) -> ProtocolResult<Message> {
        self.command(&["AUTH", name, password]).await
    }

    /// Buffer a raw value; sent on the next [`flush`](Client::flush).
    pub fn write_value(&mut self, value: &Value) -> io::Result<()> {
        value.encode(&mut self.write_buf, self.version)
    }

    pub fn write_message(&mut self, message: &Message) -> io::Result<()> {
        message.encode(&mut self.write_buf, self.version)
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        self.stream.write_all(&self.write_buf).await?;
        self.write_buf.clear();
        self.stream.flush().await
    }

    /// Read one message, waiting for more bytes as needed.
    pub async fn read_message(&mut self) -> ProtocolResult<Message> {
        loop {
            if let Some(message) = protocol::decode(&mut self.read_buf)? {
                return Ok(message);
            }

            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                return Err(ProtocolError::EndOfStream);
            }
        }
    }
}
