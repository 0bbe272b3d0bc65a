//! Frame payloads carried through the hub
//!
//! The hub never looks inside a payload; it only remembers whether the frame
//! arrived as text or binary so it can be written back out the same way.

use axum::extract::ws::Message;
use bytes::Bytes;
use std::sync::Arc;

/// An opaque chat frame, cheap to clone for fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(Arc<str>),
    Binary(Bytes),
}

impl Payload {
    pub fn text(text: impl AsRef<str>) -> Self {
        Payload::Text(Arc::from(text.as_ref()))
    }

    pub fn binary(data: impl Into<Bytes>) -> Self {
        Payload::Binary(data.into())
    }

    /// Raw bytes of the frame
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(data) => &data[..],
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Extract the payload of a data frame; control frames yield `None`
    pub fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(Payload::Text(Arc::from(text))),
            Message::Binary(data) => Some(Payload::Binary(Bytes::from(data))),
            Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
        }
    }

    /// Build the outbound frame for this payload
    pub fn to_message(&self) -> Message {
        match self {
            Payload::Text(text) => Message::Text(text.to_string()),
            Payload::Binary(data) => Message::Binary(data.to_vec()),
        }
    }
}
