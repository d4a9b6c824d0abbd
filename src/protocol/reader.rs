//! Frame decoder.
//!
//! [`decode`] parses one message out of an accumulation buffer. Parsing
//! runs over a cursor that never mutates the buffer; the buffer is only
//! advanced once a complete frame has been read, so a partial frame left
//! by the transport is simply retried when more bytes arrive.

use super::message::{Message, MessageKind};
use super::{ProtocolError, ProtocolResult};
use crate::value::Value;
use bytes::{Buf, BytesMut};
use num_bigint::BigInt;
use std::collections::HashMap;
use tracing::warn;

/// Decode one message from `buf`, advancing it past the consumed bytes.
///
/// Returns `Ok(None)` while the buffer does not yet hold a complete frame.
pub fn decode(buf: &mut BytesMut) -> ProtocolResult<Option<Message>> {
    if buf.is_empty() {
        return Ok(None);
    }

    let mut cur = Cursor::new(&buf[..]);
    match read_message(&mut cur) {
        Ok(message) => {
            let consumed = cur.pos;
            buf.advance(consumed);
            Ok(Some(message))
        }
        Err(ProtocolError::Incomplete) => Ok(None),
        Err(e) => Err(e),
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Cursor<'a> {
        Cursor { buf, pos: 0 }
    }

    fn next_byte(&mut self) -> ProtocolResult<u8> {
        let b = *self.buf.get(self.pos).ok_or(ProtocolError::Incomplete)?;
        self.pos += 1;
        Ok(b)
    }

    fn peek_byte(&self) -> ProtocolResult<u8> {
        self.buf.get(self.pos).copied().ok_or(ProtocolError::Incomplete)
    }

    /// The bytes up to the next CRLF, consuming the terminator.
    fn line(&mut self) -> ProtocolResult<&'a [u8]> {
        let rest = &self.buf[self.pos..];
        match rest.windows(2).position(|w| w == b"\r\n") {
            Some(n) => {
                self.pos += n + 2;
                Ok(&rest[..n])
            }
            None => Err(ProtocolError::Incomplete),
        }
    }

    fn take(&mut self, n: usize) -> ProtocolResult<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(ProtocolError::Incomplete);
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn expect_crlf(&mut self) -> ProtocolResult<()> {
        if self.take(2)? != b"\r\n" {
            return Err(ProtocolError::Frame("missing CRLF after payload".into()));
        }
        Ok(())
    }
}

fn line_str(line: &[u8]) -> ProtocolResult<&str> {
    Ok(std::str::from_utf8(line)?)
}

fn line_i64(line: &[u8]) -> ProtocolResult<i64> {
    Ok(line_str(line)?.parse::<i64>()?)
}

fn read_message(cur: &mut Cursor<'_>) -> ProtocolResult<Message> {
    let ch = cur.next_byte()?;
    match ch {
        b'_' => {
            cur.expect_crlf()?;
            Ok(Message::new(Value::Nil))
        }
        b'$' => {
            if cur.peek_byte()? == b'?' {
                return Err(ProtocolError::StreamingNotImplemented);
            }
            Ok(Message::new(read_bulk(cur)?))
        }
        b'=' => read_verbatim(cur),
        b'+' => {
            let s = line_str(cur.line()?)?;
            Ok(Message::new(Value::String(s.to_string())))
        }
        b'!' => {
            let len = line_i64(cur.line()?)?;
            if len < 0 {
                return Err(ProtocolError::Frame("negative bulk error length".into()));
            }
            let payload = cur.take(len as usize)?;
            let text = std::str::from_utf8(payload)?.to_string();
            cur.expect_crlf()?;
            Ok(Message::new(Value::Error(text)))
        }
        b'-' => {
            let s = line_str(cur.line()?)?;
            Ok(Message::new(Value::Error(s.to_string())))
        }
        b':' => Ok(Message::new(Value::Int64(line_i64(cur.line()?)?))),
        b',' => {
            let s = line_str(cur.line()?)?;
            Ok(Message::new(Value::Float64(s.parse::<f64>()?)))
        }
        b'(' => {
            let s = line_str(cur.line()?)?;
            let n = s.parse::<BigInt>().map_err(|_| ProtocolError::BadBigInt)?;
            Ok(Message::new(Value::BigInt(n)))
        }
        b'#' => match cur.line()? {
            b"t" => Ok(Message::new(Value::Bool(true))),
            b"f" => Ok(Message::new(Value::Bool(false))),
            _ => Err(ProtocolError::Frame("invalid boolean".into())),
        },
        b'*' => {
            if cur.peek_byte()? == b'?' {
                return Err(ProtocolError::StreamingNotImplemented);
            }
            Ok(Message::new(read_array(cur)?))
        }
        b'~' => {
            let len = read_len(cur)?;
            let items = read_values(cur, len)?;
            Ok(Message {
                kind: MessageKind::SetReply,
                type_tag: None,
                value: Value::Array(items),
                user: None,
            })
        }
        b'>' => {
            let len = read_len(cur)?;
            let mut items = read_values(cur, len)?;
            if items.is_empty() {
                return Err(ProtocolError::Frame("empty push message".into()));
            }
            let tag = items.remove(0).to_text();
            Ok(Message {
                kind: MessageKind::Push,
                type_tag: Some(tag),
                value: Value::Array(items),
                user: None,
            })
        }
        b'%' => {
            let len = read_len(cur)?;
            let mut map = HashMap::with_capacity(len);
            for _ in 0..len {
                let key = read_message(cur)?.value;
                let value = read_message(cur)?.value;
                // Non-string keys are silently dropped.
                if let Value::String(key) = key {
                    map.insert(key, value);
                }
            }
            Ok(Message::new(Value::Map(map)))
        }
        b'p' | b'P' => read_inline_ping(cur, ch),
        0 => Err(ProtocolError::EndOfStream),
        other => {
            warn!("invalid message type: 0x{:02x}", other);
            Err(ProtocolError::InvalidType(other))
        }
    }
}

fn read_len(cur: &mut Cursor<'_>) -> ProtocolResult<usize> {
    let len = line_i64(cur.line()?)?;
    if len < 0 {
        return Err(ProtocolError::Frame("negative aggregate length".into()));
    }
    Ok(len as usize)
}

fn read_bulk(cur: &mut Cursor<'_>) -> ProtocolResult<Value> {
    let len = line_i64(cur.line()?)?;
    if len == -1 {
        // RESP2 null bulk string.
        return Ok(Value::Nil);
    }
    if len < 0 {
        return Err(ProtocolError::Frame("negative bulk length".into()));
    }

    let payload = cur.take(len as usize)?;
    cur.expect_crlf()?;

    // Bulk strings are text; payloads that are not valid UTF-8 fall back to
    // the binary-safe kind instead of being corrupted.
    Ok(match std::str::from_utf8(payload) {
        Ok(s) => Value::String(s.to_string()),
        Err(_) => Value::Bytes(payload.to_vec()),
    })
}

fn read_verbatim(cur: &mut Cursor<'_>) -> ProtocolResult<Message> {
    let len = line_i64(cur.line()?)?;
    // The length covers the 3-character tag, the ':', and the payload.
    if len < 4 {
        return Err(ProtocolError::Frame("verbatim frame too short".into()));
    }

    let payload = cur.take(len as usize)?;
    cur.expect_crlf()?;

    let tag = std::str::from_utf8(&payload[..3])?.to_string();
    if payload[3] != b':' {
        return Err(ProtocolError::Frame("malformed verbatim tag".into()));
    }

    Ok(Message {
        kind: MessageKind::Verbatim,
        type_tag: Some(tag),
        value: Value::Bytes(payload[4..].to_vec()),
        user: None,
    })
}

fn read_array(cur: &mut Cursor<'_>) -> ProtocolResult<Value> {
    let len = line_i64(cur.line()?)?;
    if len == -1 {
        // RESP2 null array.
        return Ok(Value::Nil);
    }
    if len < 0 {
        return Err(ProtocolError::Frame("negative aggregate length".into()));
    }
    Ok(Value::Array(read_values(cur, len as usize)?))
}

fn read_values(cur: &mut Cursor<'_>, len: usize) -> ProtocolResult<Vec<Value>> {
    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        items.push(read_message(cur)?.value);
    }
    Ok(items)
}

/// Legacy inline `PING [msg]\r\n`, synthesized into a command array.
fn read_inline_ping(cur: &mut Cursor<'_>, first: u8) -> ProtocolResult<Message> {
    let line = line_str(cur.line()?)?;
    let mut parts = line.split_whitespace();

    let head = parts.next().unwrap_or("");
    if !head.eq_ignore_ascii_case("ing") {
        return Err(ProtocolError::InvalidType(first));
    }

    let msg = parts.next().unwrap_or("PONG");
    Ok(Message::new(Value::Array(vec![
        Value::String("PING".to_string()),
        Value::String(msg.to_string()),
    ])))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(bytes: &[u8]) -> Message {
        let mut buf = BytesMut::from(bytes);
        let msg = decode(&mut buf).unwrap().unwrap();
        assert!(buf.is_empty(), "decoder left {} bytes behind", buf.len());
        msg
    }

    fn decode_err(bytes: &[u8]) -> ProtocolError {
        let mut buf = BytesMut::from(bytes);
        decode(&mut buf).unwrap_err()
    }

    #[test]
    fn null_frame() {
        assert_eq!(decode_one(b"_\r\n").value, Value::Nil);
    }

    #[test]
    fn simple_string() {
        assert_eq!(decode_one(b"+OK\r\n").value, Value::from("OK"));
    }

    #[test]
    fn simple_error_keeps_payload_verbatim() {
        assert_eq!(
            decode_one(b"-ERR unknown command\r\n").value,
            Value::Error("ERR unknown command".to_string())
        );
    }

    #[test]
    fn bulk_error() {
        assert_eq!(
            decode_one(b"!10\r\nbad\r\nlines\r\n").value,
            Value::Error("bad\r\nlines".to_string())
        );
    }

    #[test]
    fn integer() {
        assert_eq!(decode_one(b":-42\r\n").value, Value::Int64(-42));
    }

    #[test]
    fn bad_integer_is_an_error() {
        assert!(matches!(decode_err(b":abc\r\n"), ProtocolError::BadInteger(_)));
    }

    #[test]
    fn double() {
        assert_eq!(decode_one(b",3.25\r\n").value, Value::Float64(3.25));
    }

    #[test]
    fn big_number() {
        let msg = decode_one(b"(123456789012345678901234567890\r\n");
        assert_eq!(
            msg.value,
            Value::BigInt("123456789012345678901234567890".parse().unwrap())
        );
    }

    #[test]
    fn bad_big_number() {
        assert!(matches!(decode_err(b"(12x\r\n"), ProtocolError::BadBigInt));
    }

    #[test]
    fn booleans_are_strict() {
        assert_eq!(decode_one(b"#t\r\n").value, Value::Bool(true));
        assert_eq!(decode_one(b"#f\r\n").value, Value::Bool(false));
        assert!(matches!(decode_err(b"#x\r\n"), ProtocolError::Frame(_)));
    }

    #[test]
    fn bulk_string() {
        assert_eq!(decode_one(b"$5\r\nhello\r\n").value, Value::from("hello"));
        assert_eq!(decode_one(b"$0\r\n\r\n").value, Value::from(""));
    }

    #[test]
    fn null_bulk_and_null_array() {
        assert_eq!(decode_one(b"$-1\r\n").value, Value::Nil);
        assert_eq!(decode_one(b"*-1\r\n").value, Value::Nil);
    }

    #[test]
    fn binary_bulk_falls_back_to_bytes() {
        assert_eq!(
            decode_one(b"$4\r\n\xff\xfe\x00\x01\r\n").value,
            Value::Bytes(vec![0xff, 0xfe, 0x00, 0x01])
        );
    }

    #[test]
    fn verbatim_string() {
        let msg = decode_one(b"=15\r\ntxt:Some string\r\n");
        assert_eq!(msg.kind, MessageKind::Verbatim);
        assert_eq!(msg.type_tag.as_deref(), Some("txt"));
        assert_eq!(msg.value, Value::Bytes(b"Some string".to_vec()));
    }

    #[test]
    fn verbatim_too_short() {
        assert!(matches!(decode_err(b"=2\r\nab\r\n"), ProtocolError::Frame(_)));
    }

    #[test]
    fn nested_array() {
        let msg = decode_one(b"*2\r\n*1\r\n:1\r\n$2\r\nok\r\n");
        assert_eq!(
            msg.value,
            Value::Array(vec![
                Value::Array(vec![Value::Int64(1)]),
                Value::from("ok"),
            ])
        );
    }

    #[test]
    fn set_reply() {
        let msg = decode_one(b"~2\r\n:1\r\n:2\r\n");
        assert_eq!(msg.kind, MessageKind::SetReply);
        assert_eq!(msg.value, Value::Array(vec![Value::Int64(1), Value::Int64(2)]));
    }

    #[test]
    fn push_message() {
        let msg = decode_one(b">3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$5\r\nhello\r\n");
        assert_eq!(msg.kind, MessageKind::Push);
        assert_eq!(msg.type_tag.as_deref(), Some("message"));
        assert_eq!(
            msg.value,
            Value::Array(vec![Value::from("news"), Value::from("hello")])
        );
    }

    #[test]
    fn empty_push_is_rejected() {
        assert!(matches!(decode_err(b">0\r\n"), ProtocolError::Frame(_)));
    }

    #[test]
    fn map_frame() {
        let msg = decode_one(b"%2\r\n$1\r\na\r\n:1\r\n$1\r\nb\r\n:2\r\n");
        let map = msg.value.to_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("a"), Some(&Value::Int64(1)));
        assert_eq!(map.get("b"), Some(&Value::Int64(2)));
    }

    #[test]
    fn map_drops_non_string_keys() {
        let msg = decode_one(b"%2\r\n:9\r\n:1\r\n$1\r\nb\r\n:2\r\n");
        let map = msg.value.to_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("b"), Some(&Value::Int64(2)));
    }

    #[test]
    fn empty_map() {
        let msg = decode_one(b"%0\r\n");
        assert_eq!(msg.value, Value::Map(HashMap::new()));
    }

    #[test]
    fn inline_ping() {
        let msg = decode_one(b"PING\r\n");
        assert_eq!(
            msg.value,
            Value::Array(vec![Value::from("PING"), Value::from("PONG")])
        );
    }

    #[test]
    fn inline_ping_with_message() {
        let msg = decode_one(b"ping hello\r\n");
        assert_eq!(
            msg.value,
            Value::Array(vec![Value::from("PING"), Value::from("hello")])
        );
    }

    #[test]
    fn inline_garbage_is_invalid() {
        assert!(matches!(decode_err(b"PANG\r\n"), ProtocolError::InvalidType(_)));
    }

    #[test]
    fn streaming_markers_are_rejected() {
        assert!(matches!(
            decode_err(b"$?\r\n;4\r\nHell\r\n"),
            ProtocolError::StreamingNotImplemented
        ));
        assert!(matches!(
            decode_err(b"*?\r\n:1\r\n"),
            ProtocolError::StreamingNotImplemented
        ));
    }

    #[test]
    fn unknown_type_byte() {
        assert!(matches!(decode_err(b"&1\r\n"), ProtocolError::InvalidType(b'&')));
    }

    #[test]
    fn nul_byte_is_end_of_stream() {
        assert!(matches!(decode_err(b"\x00"), ProtocolError::EndOfStream));
    }

    #[test]
    fn incomplete_frames_wait_for_more_bytes() {
        for partial in [
            &b"$5\r\nhel"[..],
            b"*2\r\n:1\r\n",
            b":12",
            b"%1\r\n$1\r\na\r\n",
            b"=15\r\ntxt:Some",
        ] {
            let mut buf = BytesMut::from(partial);
            assert!(decode(&mut buf).unwrap().is_none());
            assert_eq!(&buf[..], partial, "incomplete decode must not consume");
        }
    }

    #[test]
    fn resumes_after_more_bytes_arrive() {
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nfoo"[..]);
        assert!(decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\r\n$3\r\nbar\r\n");
        let msg = decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            msg.value,
            Value::Array(vec![Value::from("foo"), Value::from("bar")])
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn pipelined_frames_decode_one_at_a_time() {
        let mut buf = BytesMut::from(&b"+one\r\n+two\r\n"[..]);
        assert_eq!(decode(&mut buf).unwrap().unwrap().value, Value::from("one"));
        assert_eq!(decode(&mut buf).unwrap().unwrap().value, Value::from("two"));
        assert!(decode(&mut buf).unwrap().is_none());
    }
}
