//! WebSocket Frame module

use std::{fmt::Display, io::{Cursor, ErrorKind, Read, Write}};

use bytes::{Bytes, BytesMut};

use super::{
    codec::{CloseCode, Control, Data, OpCode},
    mask::{apply_mask, generate},
};
use crate::error::{Error, ProtocolError, Result};

/// Code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// The reason as a code.
    pub code: CloseCode,
    /// The reason as text.
    pub reason: String
}

impl CloseFrame {
    /// A `1000 Normal` close with an empty reason.
    pub fn normal() -> Self {
        CloseFrame { code: CloseCode::Normal, reason: String::new() }
    }
}

impl Display for CloseFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}

/// A WebSocket frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Last frame of a possibly fragmented message
    pub fin: bool,
    /// Reserved for protocol extensions.
    pub rsv1: bool,
    /// Reserved for protocol extensions.
    pub rsv2: bool,
    /// Reserved for protocol extensions.
    pub rsv3: bool,
    /// WebSocket protocol opcode.
    pub opcode: OpCode,
    /// A frame mask (if any)
    pub mask: Option<[u8; 4]>
}

impl Default for FrameHeader {
    fn default() -> Self {
        FrameHeader {
            fin: true,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode: OpCode::Control(Control::Close),
            mask: None
        }
    }
}

impl FrameHeader {
    /// Parse a header from the cursor.
    ///
    /// Returns `None` and rewinds the cursor if the data is incomplete.
    /// The payload length is returned along with the header.
    pub fn parse(cursor: &mut Cursor<impl AsRef<[u8]>>) -> Result<Option<(Self, u64)>> {
        let init = cursor.position();

        match Self::parse_internal(cursor) {
            incomplete @ Ok(None) => {
                cursor.set_position(init);
                incomplete
            },
            other => other
        }
    }

    /// Size of this header when formatted for a payload of `length` bytes.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self, length: u64) -> usize {
        2 + Length::for_len(length).additional() + if self.mask.is_some() { 4 } else { 0 }
    }

    /// Format the header for a payload of `length` bytes.
    pub fn format(&self, length: u64, output: &mut impl Write) -> Result<()> {
        let first = u8::from(self.opcode)
            | if self.fin { 0x80 } else { 0 }
            | if self.rsv1 { 0x40 } else { 0 }
            | if self.rsv2 { 0x20 } else { 0 }
            | if self.rsv3 { 0x10 } else { 0 };

        let len = Length::for_len(length);
        let second = len.len_byte() | if self.mask.is_some() { 0x80 } else { 0 };

        output.write_all(&[first, second])?;

        match len {
            Length::U8(_) => (),
            Length::U16 => output.write_all(&(length as u16).to_be_bytes())?,
            Length::U64 => output.write_all(&length.to_be_bytes())?
        }

        if let Some(mask) = self.mask {
            output.write_all(&mask)?;
        }

        Ok(())
    }

    /// Store a fresh random mask. Payload is masked when the frame is formatted.
    pub(crate) fn set_random_mask(&mut self) {
        self.mask = Some(generate());
    }

    fn parse_internal(cursor: &mut impl Read) -> Result<Option<(Self, u64)>> {
        let mut head = [0u8; 2];
        if !read_all(cursor, &mut head)? {
            return Ok(None);
        }
        let [a, b] = head;

        let opcode = OpCode::from(a);
        match opcode {
            OpCode::Control(Control::Reserved(i)) => {
                return Err(Error::Protocol(ProtocolError::UnknownControlOpCode(i)));
            },
            OpCode::Data(Data::Reserved(i)) => {
                return Err(Error::Protocol(ProtocolError::UnknownDataOpCode(i)));
            },
            _ => ()
        }

        let length = match Length::for_byte(b) {
            Length::U8(len) => u64::from(len),
            Length::U16 => {
                let mut buf = [0u8; 2];
                if !read_all(cursor, &mut buf)? {
                    return Ok(None);
                }
                u64::from(u16::from_be_bytes(buf))
            },
            Length::U64 => {
                let mut buf = [0u8; 8];
                if !read_all(cursor, &mut buf)? {
                    return Ok(None);
                }
                u64::from_be_bytes(buf)
            }
        };

        let mask = if b & 0x80 != 0 {
            let mut mask = [0u8; 4];
            if !read_all(cursor, &mut mask)? {
                return Ok(None);
            }
            Some(mask)
        } else {
            None
        };

        let header = FrameHeader {
            fin: a & 0x80 != 0,
            rsv1: a & 0x40 != 0,
            rsv2: a & 0x20 != 0,
            rsv3: a & 0x10 != 0,
            opcode,
            mask
        };

        Ok(Some((header, length)))
    }
}

/// `read_exact` that reports a short read as `false` instead of an error.
fn read_all(input: &mut impl Read, buf: &mut [u8]) -> Result<bool> {
    match input.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into())
    }
}

/// The WebSocket Frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: FrameHeader,
    payload: Bytes
}

impl Frame {
    /// Initializes a new frame
    pub fn new(header: FrameHeader, payload: Bytes) -> Self {
        Frame { header, payload }
    }

    /// Length of the formatted frame, header included.
    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        let length = self.payload.len();
        self.header.len(length as u64) + length
    }

    #[inline]
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    #[inline]
    pub fn header_mut(&mut self) -> &mut FrameHeader {
        &mut self.header
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    #[inline]
    pub(crate) fn is_masked(&self) -> bool {
        self.header.mask.is_some()
    }

    #[inline]
    pub(crate) fn set_random_mask(&mut self) {
        self.header.set_random_mask();
    }

    /// Decode the payload of a close frame.
    pub(crate) fn into_close(self) -> Result<Option<CloseFrame>> {
        match self.payload.len() {
            0 => Ok(None),
            1 => Err(Error::Protocol(ProtocolError::InvalidCloseFrame)),
            _ => {
                let code = CloseCode::from(u16::from_be_bytes([self.payload[0], self.payload[1]]));
                if !code.is_allowed() {
                    return Err(Error::Protocol(ProtocolError::InvalidCloseFrame));
                }
                let reason = String::from_utf8(self.payload[2..].to_vec())?;

                Ok(Some(CloseFrame { code, reason }))
            }
        }
    }

    /// Create a data frame.
    pub fn new_data(data: impl Into<Bytes>, opcode: Data, fin: bool) -> Frame {
        Frame {
            header: FrameHeader { fin, opcode: OpCode::Data(opcode), ..Default::default() },
            payload: data.into()
        }
    }

    /// Create a ping frame.
    pub fn new_ping(data: impl Into<Bytes>) -> Frame {
        Frame {
            header: FrameHeader { opcode: OpCode::Control(Control::Ping), ..Default::default() },
            payload: data.into()
        }
    }

    /// Create a pong frame.
    pub fn new_pong(data: impl Into<Bytes>) -> Frame {
        Frame {
            header: FrameHeader { opcode: OpCode::Control(Control::Pong), ..Default::default() },
            payload: data.into()
        }
    }

    /// Create a close frame.
    pub fn new_close(msg: Option<CloseFrame>) -> Frame {
        let payload = match msg {
            Some(CloseFrame { code, reason }) => {
                let mut p = BytesMut::with_capacity(reason.len() + 2);
                p.extend_from_slice(&u16::from(code).to_be_bytes());
                p.extend_from_slice(reason.as_bytes());
                p.freeze()
            },
            None => Bytes::new()
        };

        Frame { header: FrameHeader::default(), payload }
    }

    /// Append the formatted frame to `buf`, masking the payload if a mask is set.
    pub(crate) fn into_buf(mut self, buf: &mut Vec<u8>) -> Result<()> {
        self.header.format(self.payload.len() as u64, buf)?;

        let start = buf.len();
        buf.extend_from_slice(&self.payload);

        if let Some(mask) = self.header.mask.take() {
            apply_mask(&mut buf[start..], mask);
        }

        Ok(())
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} fin={} rsv={}{}{} masked={} len={}",
            self.header.opcode,
            self.header.fin as u8,
            self.header.rsv1 as u8,
            self.header.rsv2 as u8,
            self.header.rsv3 as u8,
            self.is_masked(),
            self.payload.len()
        )
    }
}

enum Length {
    U8(u8),
    U16,
    U64
}

impl Length {
    #[inline]
    fn for_len(len: u64) -> Self {
        if len < 126 {
            Length::U8(len as u8)
        } else if len < 65536 {
            Length::U16
        } else {
            Length::U64
        }
    }

    #[inline]
    fn additional(&self) -> usize {
        match *self {
            Self::U8(_) => 0,
            Self::U16 => 2,
            Self::U64 => 8
        }
    }

    #[inline]
    fn len_byte(&self) -> u8 {
        match *self {
            Self::U8(b) => b,
            Self::U16 => 126,
            Self::U64 => 127
        }
    }

    #[inline]
    fn for_byte(byte: u8) -> Self {
        match byte & 0x7F {
            126 => Length::U16,
            127 => Length::U64,
            b => Length::U8(b)
        }
    }
}
