//! Error handling

use std::{io, str::Utf8Error, string::FromUtf8Error};

use http::{HeaderName, Response};
use thiserror::Error;

/// Generic result type
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors of the WebSocket client transport.
#[derive(Debug, Error)]
pub enum Error {
    /// The close handshake finished, or the peer shut the stream down after it.
    ///
    /// Not a failure as such: the session is over and the only meaningful
    /// thing left to do with it is dropping it.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Tried to read or write after `ConnectionClosed` was already reported.
    #[error("Connection already closed")]
    AlreadyClosed,

    /// Input-output error, including read and write timeouts.
    #[error("I/O Error: {0}")]
    Io(#[from] io::Error),

    /// Protocol violation.
    #[error("Protocol Error: {0}")]
    Protocol(#[from] ProtocolError),

    /// UTF-8 coding error.
    #[error("UTF-8 Error: {0}")]
    Utf8(String),

    /// A configured size limit was exceeded.
    #[error("Capacity Error: {0}")]
    Capacity(#[from] CapacityError),

    /// The server answered the upgrade request with something other than `101`.
    #[error("HTTP Error: {}", .0.status())]
    Http(Box<Response<Option<Vec<u8>>>>),

    /// HTTP format error.
    #[error("HTTP format error: {0}")]
    HttpFormat(#[from] http::Error),

    /// Invalid URL.
    #[error("URL Error: {0}")]
    Url(#[from] UrlError),

    /// The server's handshake response exceeded the header budget.
    #[error("Handshake response exceeded the header budget")]
    AttackAttempt
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Error::Utf8(value.to_string())
    }
}

impl From<FromUtf8Error> for Error {
    fn from(value: FromUtf8Error) -> Self {
        Error::Utf8(value.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(value: http::header::InvalidHeaderName) -> Self {
        Error::HttpFormat(value.into())
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(value: http::header::InvalidHeaderValue) -> Self {
        Error::HttpFormat(value.into())
    }
}

impl From<http::header::ToStrError> for Error {
    fn from(value: http::header::ToStrError) -> Self {
        Error::Utf8(value.to_string())
    }
}

impl From<http::status::InvalidStatusCode> for Error {
    fn from(value: http::status::InvalidStatusCode) -> Self {
        Error::HttpFormat(value.into())
    }
}

impl From<httparse::Error> for Error {
    fn from(value: httparse::Error) -> Self {
        match value {
            httparse::Error::TooManyHeaders => Error::Capacity(CapacityError::TooManyHeaders),
            e => Error::Protocol(ProtocolError::HttparseError(e))
        }
    }
}

/// Indicates the specific type/cause of a protocol error.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ProtocolError {
    /// Wrong HTTP version in the server response (must be HTTP/1.1).
    #[error("Unsupported HTTP version (must be HTTP/1.1)")]
    InvalidHttpVersion,

    /// A header required to build the upgrade request is missing or malformed.
    #[error("Missing, duplicated or incorrect header {0}")]
    InvalidHeader(HeaderName),

    /// Missing `Connection: upgrade` HTTP header.
    #[error("Missing 'Connection: upgrade' header")]
    MissingConnectionUpgradeHeader,

    /// Missing `Upgrade: websocket` HTTP header.
    #[error("Missing 'Upgrade: websocket' header")]
    MissingUpgradeHeader,

    /// The `Sec-WebSocket-Accept` header is either not present or does not specify the correct key value.
    #[error("Mismatched 'Sec-WebSocket-Accept' header")]
    AcceptKeyMismatch,

    /// The stream ended while the handshake response was still incomplete.
    #[error("Handshake incomplete")]
    IncompleteHandshake,

    /// Wrapper around a [`httparse::Error`] value.
    #[error("httparse error: {0}")]
    HttparseError(#[from] httparse::Error),

    /// Reserved bits in frame header are non-zero.
    #[error("Encountered frame with non-zero reserved bits")]
    NonZeroReservedBits,

    /// Control frames must not be fragmented.
    #[error("Control frame must not be fragmented")]
    FragmentedControlFrame,

    /// Control frames must have a payload of 125 bytes or less.
    #[error("Control frame payload too large")]
    ControlFrameTooBig,

    /// The client must close the connection when a masked frame is received.
    #[error("Received masked frame from server")]
    MaskedFrameFromServer,

    /// Encountered an invalid control opcode.
    #[error("Received unknown control opcode: {0}")]
    UnknownControlOpCode(u8),

    /// Encountered an invalid data opcode.
    #[error("Received unknown data opcode: {0}")]
    UnknownDataOpCode(u8),

    /// Received a continue frame despite there being nothing to continue.
    #[error("Received continue frame without open fragmentation context")]
    UnexpectedContinue,

    /// Received data while waiting for more fragments.
    #[error("Expected fragment of type {0:?} but received something else")]
    ExpectedFragment(FragmentType),

    /// Not allowed to send after having sent a closing frame.
    #[error("Sent after close handshake started")]
    SendAfterClose,

    /// Remote sent data after sending a closing frame.
    #[error("Received after close handshake completed")]
    ReceiveAfterClose,

    /// The payload for the closing frame is invalid.
    #[error("Invalid close frame payload")]
    InvalidCloseFrame,

    /// Connection closed without performing the closing handshake.
    #[error("Connection closed without proper handshake")]
    ResetWithoutClosing
}

/// Fragment type
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FragmentType {
    /// Text fragment
    Text,
    /// Binary fragment
    Binary
}

/// Indicates the specific type/cause of a capacity error.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum CapacityError {
    /// Too many headers in the handshake response (see [`httparse::Error::TooManyHeaders`]).
    #[error("Too many headers received")]
    TooManyHeaders,

    /// A fragmented message used more continuation frames than allowed.
    #[error("Too many continuation frames (max {max})")]
    TooManyFragments {
        /// The configured maximum.
        max: usize
    },

    /// Frame or message is bigger than the configured maximum.
    #[error("Payload too large: {size} > {max}")]
    MessageTooLarge {
        /// The size of the message.
        size: usize,
        /// The maximum allowed message size.
        max: usize
    }
}

/// Indicates the specific type/cause of URL error.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum UrlError {
    /// The URL could not be parsed at all.
    #[error("Malformed URL: {0}")]
    Malformed(String),

    /// The URL does not include a host name.
    #[error("Missing host name in URL")]
    MissingHost,

    /// The URL host name, though included, is empty.
    #[error("Empty host name in URL")]
    EmptyHost,

    /// Unsupported URL scheme used (only plain `ws://` is supported).
    #[error("Unsupported URL scheme (expected 'ws://')")]
    UnsupportedScheme,

    /// Failed to connect with this URL.
    #[error("Unable to connect to host: {0}")]
    UnableToConnect(String)
}

impl From<url::ParseError> for UrlError {
    fn from(value: url::ParseError) -> Self {
        UrlError::Malformed(value.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(value: url::ParseError) -> Self {
        Error::Url(value.into())
    }
}
