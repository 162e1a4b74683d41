//! Opcodes and close codes from RFC 6455

use std::fmt::Display;

/// WebSocket message opcode.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum OpCode {
    /// Data (text or binary).
    Data(Data),
    /// Control (close, ping, pong).
    Control(Control)
}

impl OpCode {
    /// Returns `true` for close, ping and pong.
    pub fn is_control(self) -> bool {
        matches!(self, OpCode::Control(_))
    }
}

/// Data opcodes
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Data {
    /// Continuation of a fragmented message
    Continuation,
    /// Text frame
    Text,
    /// Binary frame
    Binary,
    /// 0x3-0x7
    Reserved(u8)
}

/// Control opcodes
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Control {
    /// Close frame
    Close,
    /// Ping frame
    Ping,
    /// Pong frame
    Pong,
    /// 0xB-0xF
    Reserved(u8)
}

impl Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Data(Data::Continuation) => write!(f, "CONTINUE"),
            Self::Data(Data::Text) => write!(f, "TEXT"),
            Self::Data(Data::Binary) => write!(f, "BINARY"),
            Self::Data(Data::Reserved(i)) => write!(f, "RESERVED_DATA_{i:#x}"),
            Self::Control(Control::Close) => write!(f, "CLOSE"),
            Self::Control(Control::Ping) => write!(f, "PING"),
            Self::Control(Control::Pong) => write!(f, "PONG"),
            Self::Control(Control::Reserved(i)) => write!(f, "RESERVED_CONTROL_{i:#x}")
        }
    }
}

impl From<OpCode> for u8 {
    fn from(value: OpCode) -> Self {
        match value {
            OpCode::Data(Data::Continuation) => 0x0,
            OpCode::Data(Data::Text) => 0x1,
            OpCode::Data(Data::Binary) => 0x2,
            OpCode::Data(Data::Reserved(i)) => i,
            OpCode::Control(Control::Close) => 0x8,
            OpCode::Control(Control::Ping) => 0x9,
            OpCode::Control(Control::Pong) => 0xA,
            OpCode::Control(Control::Reserved(i)) => i
        }
    }
}

impl From<u8> for OpCode {
    /// Only the low nibble is significant.
    fn from(value: u8) -> Self {
        match value & 0x0F {
            0x0 => Self::Data(Data::Continuation),
            0x1 => Self::Data(Data::Text),
            0x2 => Self::Data(Data::Binary),
            i @ 0x3..=0x7 => Self::Data(Data::Reserved(i)),
            0x8 => Self::Control(Control::Close),
            0x9 => Self::Control(Control::Ping),
            0xA => Self::Control(Control::Pong),
            i => Self::Control(Control::Reserved(i))
        }
    }
}

/// Status code sent in a close frame.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CloseCode {
    /// 1000, the purpose of the connection has been fulfilled.
    Normal,
    /// 1001, the endpoint is going away.
    Away,
    /// 1002, protocol error.
    Protocol,
    /// 1003, received a type of data the endpoint cannot accept.
    Unsupported,
    /// 1005, no status code was present. Never sent on the wire.
    Status,
    /// 1006, connection dropped without a close frame. Never sent on the wire.
    Abnormal,
    /// 1007, message data inconsistent with its type.
    Invalid,
    /// 1008, policy violation.
    Policy,
    /// 1009, message too big to process.
    Size,
    /// 1010, client expected an extension the server did not negotiate.
    Extension,
    /// 1011, unexpected server condition.
    Error,
    /// 1012, server restarting.
    Restart,
    /// 1013, server overloaded, try again later.
    Again,
    /// Registered or application codes (3000-4999).
    Other(u16),
    /// Anything RFC 6455 forbids on the wire.
    Bad(u16)
}

impl CloseCode {
    /// Whether the code may appear in a close frame.
    pub fn is_allowed(self) -> bool {
        !matches!(self, Self::Bad(_) | Self::Status | Self::Abnormal)
    }
}

impl Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u16::from(*self))
    }
}

impl From<CloseCode> for u16 {
    fn from(value: CloseCode) -> u16 {
        match value {
            CloseCode::Normal => 1000,
            CloseCode::Away => 1001,
            CloseCode::Protocol => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::Status => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::Invalid => 1007,
            CloseCode::Policy => 1008,
            CloseCode::Size => 1009,
            CloseCode::Extension => 1010,
            CloseCode::Error => 1011,
            CloseCode::Restart => 1012,
            CloseCode::Again => 1013,
            CloseCode::Other(code) | CloseCode::Bad(code) => code
        }
    }
}

impl From<u16> for CloseCode {
    fn from(value: u16) -> Self {
        match value {
            1000 => Self::Normal,
            1001 => Self::Away,
            1002 => Self::Protocol,
            1003 => Self::Unsupported,
            1005 => Self::Status,
            1006 => Self::Abnormal,
            1007 => Self::Invalid,
            1008 => Self::Policy,
            1009 => Self::Size,
            1010 => Self::Extension,
            1011 => Self::Error,
            1012 => Self::Restart,
            1013 => Self::Again,
            3000..=4999 => Self::Other(value),
            _ => Self::Bad(value)
        }
    }
}
