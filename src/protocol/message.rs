//! One wire unit: a value plus its framing kind.

use crate::user::User;
use crate::value::Value;

/// Distinguishes ordinary replies from the specially framed ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageKind {
    #[default]
    Default,
    Verbatim,
    SetReply,
    Push,
    Hello,
}

/// A decoded request or an outbound reply.
///
/// `type_tag` is populated only for `Verbatim` (the 3-character semantic
/// tag) and `Push` (the push type); `user` only for a client-side `Hello`
/// handshake carrying credentials.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    pub kind: MessageKind,
    pub type_tag: Option<String>,
    pub value: Value,
    pub user: Option<User>,
}

impl Message {
    /// An ordinary reply.
    pub fn new(value: impl Into<Value>) -> Message {
        Message {
            kind: MessageKind::Default,
            type_tag: None,
            value: value.into(),
            user: None,
        }
    }

    /// A verbatim string with a caller-chosen 3-character tag.
    pub fn verbatim(tag: impl Into<String>, payload: impl Into<Vec<u8>>) -> Message {
        Message {
            kind: MessageKind::Verbatim,
            type_tag: Some(tag.into()),
            value: Value::Bytes(payload.into()),
            user: None,
        }
    }

    /// An unordered set reply.
    pub fn set_reply(items: Vec<Value>) -> Message {
        Message {
            kind: MessageKind::SetReply,
            type_tag: None,
            value: Value::Array(items),
            user: None,
        }
    }

    /// An out-of-band push addressed by `tag`.
    pub fn push(tag: impl Into<String>, items: Vec<Value>) -> Message {
        Message {
            kind: MessageKind::Push,
            type_tag: Some(tag.into()),
            value: Value::Array(items),
            user: None,
        }
    }

    /// A client HELLO handshake, optionally carrying credentials.
    pub fn hello(user: Option<User>) -> Message {
        Message {
            kind: MessageKind::Hello,
            type_tag: None,
            value: Value::Nil,
            user,
        }
    }
}

impl From<Message> for Value {
    fn from(msg: Message) -> Value {
        msg.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_tags() {
        let m = Message::new(1i64);
        assert_eq!(m.kind, MessageKind::Default);
        assert_eq!(m.type_tag, None);

        let m = Message::verbatim("txt", b"hi".to_vec());
        assert_eq!(m.kind, MessageKind::Verbatim);
        assert_eq!(m.type_tag.as_deref(), Some("txt"));
        assert_eq!(m.value, Value::Bytes(b"hi".to_vec()));

        let m = Message::push("notify", vec![Value::from("x")]);
        assert_eq!(m.kind, MessageKind::Push);
        assert_eq!(m.type_tag.as_deref(), Some("notify"));
    }

    #[test]
    fn message_flattens_to_its_value() {
        let v: Value = Message::new("payload").into();
        assert_eq!(v, Value::from("payload"));
    }
}
