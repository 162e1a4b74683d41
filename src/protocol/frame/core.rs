//! Utilities to work with raw WebSocket frames.

use std::io::{self, Cursor, Read, Write};

use bytes::{Buf, BytesMut};

use crate::{error::{CapacityError, Error, Result}, protocol::frame::{frame::{Frame, FrameHeader}, mask::apply_mask}, util::retry_interrupted};

const READ_BUFFER_LENGTH: usize = 4096;

/// A stream that reads and writes whole frames, with no message-level rules.
///
/// Incoming masked frames are unmasked, outgoing frames are written as they
/// are, masked only if their header carries a mask.
#[derive(Debug)]
pub struct FrameSocket<T> {
    stream: T,
    codec: FrameCodec
}

impl<T: Read + Write> FrameSocket<T> {
    /// Create a new frame socket.
    pub fn new(stream: T) -> Self {
        FrameSocket { stream, codec: FrameCodec::new() }
    }

    /// Create a new frame socket from data already read off the stream.
    pub fn from_partially_read(stream: T, part: Vec<u8>) -> Self {
        FrameSocket { stream, codec: FrameCodec::from_partially_read(part) }
    }

    /// Returns a shared reference to the inner stream.
    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    /// Returns a mutable reference to the inner stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    /// Read a frame. `None` means the stream ended.
    pub fn read(&mut self, max: Option<usize>) -> Result<Option<Frame>> {
        self.codec.read(&mut self.stream, max, true)
    }

    /// Write and flush a frame.
    pub fn send(&mut self, frame: Frame) -> Result<()> {
        self.codec.write(&mut self.stream, frame)?;
        Ok(self.stream.flush()?)
    }
}

/// Buffers for decoding and encoding frames on a byte stream.
#[derive(Debug)]
pub(crate) struct FrameCodec {
    in_buffer: BytesMut,
    out_buffer: Vec<u8>,
    /// Header and payload size of the frame currently being read.
    header: Option<(FrameHeader, u64)>
}

impl FrameCodec {
    pub(crate) fn new() -> Self {
        Self::from_partially_read(Vec::new())
    }

    /// Bytes that followed the handshake response become the start of the frame stream.
    pub(crate) fn from_partially_read(part: Vec<u8>) -> Self {
        let mut in_buffer = BytesMut::from(&part[..]);
        in_buffer.reserve(READ_BUFFER_LENGTH);

        Self {
            in_buffer,
            out_buffer: Vec::new(),
            header: None
        }
    }

    /// Read a frame from `stream`.
    ///
    /// Returns `Ok(None)` if the stream ended, whether or not a frame was
    /// partially received. With `unmask` set, masked payloads are unmasked and
    /// the mask is removed from the header.
    pub(crate) fn read<S: Read>(&mut self, stream: &mut S, max: Option<usize>, unmask: bool) -> Result<Option<Frame>> {
        let max = max.unwrap_or(usize::MAX);

        let payload = loop {
            if self.header.is_none() {
                let mut cursor = Cursor::new(&self.in_buffer[..]);
                self.header = FrameHeader::parse(&mut cursor)?;
                let consumed = cursor.position() as usize;
                self.in_buffer.advance(consumed);

                if let Some((_, len)) = &self.header {
                    let len = usize::try_from(*len).unwrap_or(usize::MAX);
                    if len > max {
                        return Err(Error::Capacity(CapacityError::MessageTooLarge { size: len, max }));
                    }
                    self.in_buffer.reserve(len);
                }
            }

            if let Some((_, len)) = &self.header {
                let len = *len as usize;
                if len <= self.in_buffer.len() {
                    break self.in_buffer.split_to(len);
                }
            }

            if self.read_in(stream)? == 0 {
                return Ok(None);
            }
        };

        let Some((mut header, _)) = self.header.take() else {
            return Ok(None);
        };

        let mut payload = payload;
        if unmask {
            if let Some(mask) = header.mask.take() {
                apply_mask(&mut payload, mask);
            }
        }

        Ok(Some(Frame::new(header, payload.freeze())))
    }

    fn read_in<S: Read>(&mut self, stream: &mut S) -> io::Result<usize> {
        let mut chunk = [0u8; READ_BUFFER_LENGTH];
        let size = retry_interrupted(|| stream.read(&mut chunk))?;
        self.in_buffer.extend_from_slice(&chunk[..size]);

        Ok(size)
    }

    /// Format `frame` and write it out. Does not flush.
    pub(crate) fn write<S: Write>(&mut self, stream: &mut S, frame: Frame) -> Result<()> {
        self.out_buffer.reserve(frame.len());
        frame.into_buf(&mut self.out_buffer)?;

        self.write_out(stream)
    }

    fn write_out<S: Write>(&mut self, stream: &mut S) -> Result<()> {
        while !self.out_buffer.is_empty() {
            let len = retry_interrupted(|| stream.write(&self.out_buffer))?;

            if len == 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "Connection reset while sending").into());
            }

            self.out_buffer.drain(..len);
        }

        Ok(())
    }
}
