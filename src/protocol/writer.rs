//! Frame encoder.
//!
//! Replies are encoded into a plain byte buffer which the connection
//! flushes once per complete reply; a handler failure discards the buffer
//! before the error frame is written, so partial replies never reach the
//! wire.
//!
//! RESP3 emits the native frame for every kind. The RESP2 dialect
//! downgrades: nil becomes the null bulk string, booleans, doubles and big
//! numbers become their text as bulk strings, and maps flatten to arrays
//! of alternating keys and values.

use super::message::{Message, MessageKind};
use super::ProtocolVersion;
use crate::value::Value;
use std::io::{self, Write};

/// Default semantic tag for verbatim frames.
const VERBATIM_RAW: &str = "raw";

impl Value {
    /// Encode this value in the given dialect.
    pub fn encode(&self, buf: &mut Vec<u8>, version: ProtocolVersion) -> io::Result<()> {
        match version {
            ProtocolVersion::Resp3 => encode_v3(buf, self),
            ProtocolVersion::Resp2 => encode_v2(buf, self),
        }
    }
}

impl Message {
    /// Encode this message in the given dialect.
    ///
    /// The message kind only affects RESP3 framing; RESP2 has no set, push,
    /// or verbatim frames, so the payload value is written plain.
    pub fn encode(&self, buf: &mut Vec<u8>, version: ProtocolVersion) -> io::Result<()> {
        if version == ProtocolVersion::Resp2 {
            return encode_v2(buf, &self.value);
        }

        match self.kind {
            MessageKind::Default => encode_v3(buf, &self.value),
            MessageKind::Verbatim => {
                let tag = self.type_tag.as_deref().unwrap_or(VERBATIM_RAW);
                write_verbatim(buf, tag, &self.value.to_bytes())
            }
            MessageKind::SetReply => {
                let items = self.value.to_array();
                write!(buf, "~{}\r\n", items.len())?;
                for item in &items {
                    encode_v3(buf, item)?;
                }
                Ok(())
            }
            MessageKind::Push => {
                let items = self.value.to_array();
                write!(buf, ">{}\r\n", items.len() + 1)?;
                write_bulk(buf, self.type_tag.as_deref().unwrap_or("").as_bytes())?;
                for item in &items {
                    encode_v3(buf, item)?;
                }
                Ok(())
            }
            MessageKind::Hello => {
                match &self.user {
                    Some(user) => {
                        write!(buf, "*5\r\n")?;
                        write_bulk(buf, b"HELLO")?;
                        write_bulk(buf, b"3")?;
                        write_bulk(buf, b"AUTH")?;
                        write_bulk(buf, user.name.as_bytes())?;
                        write_bulk(buf, user.password.as_bytes())?;
                    }
                    None => {
                        write!(buf, "*2\r\n")?;
                        write_bulk(buf, b"HELLO")?;
                        write_bulk(buf, b"3")?;
                    }
                }
                Ok(())
            }
        }
    }
}

fn encode_v3(buf: &mut Vec<u8>, value: &Value) -> io::Result<()> {
    match value {
        Value::Nil => write!(buf, "_\r\n")?,
        Value::Bool(true) => write!(buf, "#t\r\n")?,
        Value::Bool(false) => write!(buf, "#f\r\n")?,
        Value::Int64(i) => write!(buf, ":{}\r\n", i)?,
        Value::Float64(f) => write!(buf, ",{}\r\n", f)?,
        Value::BigInt(i) => write!(buf, "({}\r\n", i)?,
        Value::String(s) => write_bulk(buf, s.as_bytes())?,
        Value::Bytes(b) => write_verbatim(buf, VERBATIM_RAW, b)?,
        Value::Error(e) => write_error(buf, e)?,
        Value::Array(items) => {
            write!(buf, "*{}\r\n", items.len())?;
            for item in items {
                encode_v3(buf, item)?;
            }
        }
        Value::Map(map) => {
            write!(buf, "%{}\r\n", map.len())?;
            for (k, v) in map {
                write_bulk(buf, k.as_bytes())?;
                encode_v3(buf, v)?;
            }
        }
    }
    Ok(())
}

fn encode_v2(buf: &mut Vec<u8>, value: &Value) -> io::Result<()> {
    match value {
        Value::Nil => write!(buf, "$-1\r\n")?,
        Value::Bool(b) => write_bulk(buf, if *b { b"true" } else { b"false" })?,
        Value::Int64(i) => write!(buf, ":{}\r\n", i)?,
        Value::Float64(f) => write_bulk(buf, f.to_string().as_bytes())?,
        Value::BigInt(i) => write_bulk(buf, i.to_string().as_bytes())?,
        Value::String(s) => write_bulk(buf, s.as_bytes())?,
        Value::Bytes(b) => write_bulk(buf, b)?,
        Value::Error(e) => write!(buf, "-{}\r\n", e)?,
        Value::Array(items) => {
            write!(buf, "*{}\r\n", items.len())?;
            for item in items {
                encode_v2(buf, item)?;
            }
        }
        Value::Map(map) => {
            write!(buf, "*{}\r\n", map.len() * 2)?;
            for (k, v) in map {
                write_bulk(buf, k.as_bytes())?;
                encode_v2(buf, v)?;
            }
        }
    }
    Ok(())
}

fn write_bulk(buf: &mut Vec<u8>, data: &[u8]) -> io::Result<()> {
    write!(buf, "${}\r\n", data.len())?;
    buf.extend_from_slice(data);
    write!(buf, "\r\n")
}

fn write_verbatim(buf: &mut Vec<u8>, tag: &str, data: &[u8]) -> io::Result<()> {
    // The length covers the 3-character tag, the ':', and the payload.
    write!(buf, "={}\r\n{}:", data.len() + 4, tag)?;
    buf.extend_from_slice(data);
    write!(buf, "\r\n")
}

fn write_error(buf: &mut Vec<u8>, text: &str) -> io::Result<()> {
    // Error text with line breaks would corrupt a line frame; it goes out
    // as a bulk error instead.
    if text.bytes().any(|b| b == b'\r' || b == b'\n') {
        write!(buf, "!{}\r\n", text.len())?;
        buf.extend_from_slice(text.as_bytes());
        write!(buf, "\r\n")
    } else {
        write!(buf, "-{}\r\n", text)
    }
}
