//! Blocking request/response exchange used by the handshake

use std::io::{Read, Write};

use bytes::{Buf, BytesMut};
use log::trace;

use crate::{error::{Error, ProtocolError, Result}, util::retry_interrupted};

const READ_CHUNK_SIZE: usize = 4096;

/// Writes the upgrade request, then reads until a complete response head is parsed.
#[derive(Debug)]
pub struct HandshakeMachine<S> {
    stream: S,
    buffer: BytesMut,
    attack_check: AttackCheck
}

impl<S: Read + Write> HandshakeMachine<S> {
    pub fn new(stream: S) -> Self {
        HandshakeMachine {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
            attack_check: AttackCheck::new()
        }
    }

    /// Writes and flushes the request bytes.
    pub fn write_request(&mut self, request: &[u8]) -> Result<()> {
        trace!("handshake request:\n{}", String::from_utf8_lossy(request).trim_end());

        self.stream.write_all(request)?;
        Ok(self.stream.flush()?)
    }

    /// Reads until `Obj` parses.
    ///
    /// Returns the parsed object, the stream and any bytes read past the
    /// end of the object.
    pub fn read_response<Obj: TryParse>(mut self) -> Result<(Obj, S, Vec<u8>)> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            let count = retry_interrupted(|| self.stream.read(&mut chunk))?;
            if count == 0 {
                return Err(Error::Protocol(ProtocolError::IncompleteHandshake));
            }

            self.attack_check.check_incoming_packet(count)?;
            self.buffer.extend_from_slice(&chunk[..count]);

            if let Some((size, obj)) = Obj::try_parse(&self.buffer)? {
                trace!("handshake response:\n{}", String::from_utf8_lossy(&self.buffer[..size]).trim_end());
                self.buffer.advance(size);

                return Ok((obj, self.stream, self.buffer.to_vec()));
            }
        }
    }
}

/// A parse-able object
pub trait TryParse: Sized {
    /// Returns Ok(None) if incomplete, Err on syntax errors
    fn try_parse(data: &[u8]) -> Result<Option<(usize, Self)>>;
}

/// Bounds how much a peer may send before the response head is complete.
#[derive(Debug)]
pub(crate) struct AttackCheck {
    /// Number of successful reads
    packets: usize,
    /// Total bytes read
    bytes: usize
}

impl AttackCheck {
    fn new() -> Self {
        AttackCheck { packets: 0, bytes: 0 }
    }

    /// Call right after each `read()` with its returned byte count.
    fn check_incoming_packet(&mut self, size: usize) -> Result<()> {
        self.packets += 1;
        self.bytes += size;

        const MAX_BYTES: usize = 65536;
        const MAX_PACKETS: usize = 512;
        const MIN_PACKET_SIZE: usize = 128;
        const MIN_PACKET_CHECK_THRESHOLD: usize = 64;

        if self.bytes > MAX_BYTES
            || self.packets > MAX_PACKETS
            || (self.packets > MIN_PACKET_CHECK_THRESHOLD && self.packets * MIN_PACKET_SIZE > self.bytes)
        {
            return Err(Error::AttackAttempt);
        }

        Ok(())
    }
}
