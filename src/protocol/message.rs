use std::fmt;

use crate::protocol::frame::CloseFrame;

/// A WebSocket message as seen by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Option<CloseFrame>)
}

impl Message {
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(s.into())
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Message::Text(_) | Message::Binary(_))
    }

    pub fn is_control(&self) -> bool {
        !self.is_data()
    }

    /// Payload length in bytes. A close message counts its code and reason.
    pub fn len(&self) -> usize {
        match self {
            Message::Text(s) => s.len(),
            Message::Binary(b) | Message::Ping(b) | Message::Pong(b) => b.len(),
            Message::Close(Some(frame)) => 2 + frame.reason.len(),
            Message::Close(None) => 0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_data(self) -> Vec<u8> {
        match self {
            Message::Text(s) => s.into_bytes(),
            Message::Binary(b) | Message::Ping(b) | Message::Pong(b) => b,
            Message::Close(Some(frame)) => {
                let mut buf = Vec::with_capacity(2 + frame.reason.len());
                buf.extend_from_slice(&u16::from(frame.code).to_be_bytes());
                buf.extend_from_slice(frame.reason.as_bytes());
                buf
            },
            Message::Close(None) => Vec::new()
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Text(s) => write!(f, "Text({s})"),
            Message::Binary(b) => write!(f, "Binary({} bytes)", b.len()),
            Message::Ping(_) => write!(f, "Ping"),
            Message::Pong(_) => write!(f, "Pong"),
            Message::Close(Some(frame)) => write!(f, "Close({frame})"),
            Message::Close(None) => write!(f, "Close")
        }
    }
}
