//! Client side of an established WebSocket connection

use std::io::{Read, Write};

use log::{debug, trace};

use crate::{
    error::{CapacityError, Error, FragmentType, ProtocolError, Result},
    protocol::{
        config::WebSocketConfig,
        frame::{codec::{Control, Data, OpCode}, core::FrameCodec, CloseFrame, Frame},
        message::Message
    },
    MAX_CONTROL_FRAME_PAYLOAD
};

/// Where the connection stands in the close handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebSocketState {
    /// Open for reading and writing.
    Active,
    /// We sent a close frame and wait for the peer's.
    ClosedByUs,
    /// Both close frames were exchanged, waiting for the stream to end.
    CloseAcknowledged,
    /// `ConnectionClosed` was reported. Any further use is an error.
    Terminated
}

impl WebSocketState {
    /// Whether we may still send data frames.
    pub fn can_write(self) -> bool {
        self == WebSocketState::Active
    }
}

/// WebSocket stream speaking the client role.
///
/// Created by [`connect`](crate::client::connect) after a successful handshake,
/// or by [`WebSocket::from_raw_socket`] over a stream that already completed one.
///
/// Use [`WebSocket::read`] and [`WebSocket::send`] to exchange messages and
/// [`WebSocket::close`] to start the close handshake.
#[derive(Debug)]
pub struct WebSocket<S> {
    stream: S,
    codec: FrameCodec,
    config: WebSocketConfig,
    state: WebSocketState,
    incomplete: Option<IncompleteMessage>
}

impl<S: Read + Write> WebSocket<S> {
    /// Wraps a stream whose opening handshake is already done.
    pub fn from_raw_socket(stream: S, config: WebSocketConfig) -> Self {
        Self::from_partially_read(stream, Vec::new(), config)
    }

    /// Like [`WebSocket::from_raw_socket`], with bytes that arrived right after the handshake.
    pub fn from_partially_read(stream: S, part: Vec<u8>, config: WebSocketConfig) -> Self {
        WebSocket {
            stream,
            codec: FrameCodec::from_partially_read(part),
            config,
            state: WebSocketState::Active,
            incomplete: None
        }
    }

    pub fn state(&self) -> WebSocketState {
        self.state
    }

    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Reads the next message.
    ///
    /// Pings are answered before being returned. A close frame from the peer is
    /// answered and returned as [`Message::Close`]; once the peer ends the
    /// stream after the close handshake this returns [`Error::ConnectionClosed`].
    pub fn read(&mut self) -> Result<Message> {
        if self.state == WebSocketState::Terminated {
            return Err(Error::AlreadyClosed);
        }

        loop {
            let frame = match self.codec.read(&mut self.stream, self.config.max_frame_size, false)? {
                Some(frame) => frame,
                None => return Err(self.stream_ended())
            };
            trace!("received frame: {frame}");

            if let Some(msg) = self.handle_frame(frame)? {
                return Ok(msg);
            }
        }
    }

    /// Sends a data or ping message and flushes it.
    ///
    /// A [`Message::Close`] starts the close handshake, see [`WebSocket::close`].
    pub fn send(&mut self, msg: Message) -> Result<()> {
        let frame = match msg {
            Message::Text(s) => Frame::new_data(s.into_bytes(), Data::Text, true),
            Message::Binary(b) => Frame::new_data(b, Data::Binary, true),
            Message::Ping(b) => Frame::new_ping(b),
            Message::Pong(b) => Frame::new_pong(b),
            Message::Close(close) => return self.close(close)
        };

        match self.state {
            WebSocketState::Terminated => Err(Error::AlreadyClosed),
            state if !state.can_write() => Err(Error::Protocol(ProtocolError::SendAfterClose)),
            _ => self.write_frame(frame)
        }
    }

    /// Starts the close handshake.
    ///
    /// Only the first call sends a close frame; later calls are no-ops until
    /// the connection is terminated. Keep calling [`WebSocket::read`] to
    /// receive the peer's close and the end of the stream.
    pub fn close(&mut self, frame: Option<CloseFrame>) -> Result<()> {
        match self.state {
            WebSocketState::Active => {
                self.set_state(WebSocketState::ClosedByUs);
                self.write_frame(Frame::new_close(frame))
            },
            WebSocketState::Terminated => Err(Error::AlreadyClosed),
            _ => Ok(())
        }
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<Option<Message>> {
        let header = frame.header();

        if frame.is_masked() {
            return Err(Error::Protocol(ProtocolError::MaskedFrameFromServer));
        }
        if header.rsv1 || header.rsv2 || header.rsv3 {
            return Err(Error::Protocol(ProtocolError::NonZeroReservedBits));
        }
        if self.state == WebSocketState::CloseAcknowledged {
            return Err(Error::Protocol(ProtocolError::ReceiveAfterClose));
        }

        let (fin, opcode) = (header.fin, header.opcode);
        match opcode {
            OpCode::Control(control) => {
                if !fin {
                    return Err(Error::Protocol(ProtocolError::FragmentedControlFrame));
                }
                if frame.payload().len() > MAX_CONTROL_FRAME_PAYLOAD {
                    return Err(Error::Protocol(ProtocolError::ControlFrameTooBig));
                }

                match control {
                    Control::Close => {
                        let close = frame.into_close()?;
                        self.peer_closed(close.as_ref())?;
                        Ok(Some(Message::Close(close)))
                    },
                    Control::Ping => {
                        let data = frame.into_payload();
                        if self.state.can_write() {
                            self.write_frame(Frame::new_pong(data.clone()))?;
                        }
                        Ok(Some(Message::Ping(data.to_vec())))
                    },
                    Control::Pong => Ok(Some(Message::Pong(frame.into_payload().to_vec()))),
                    Control::Reserved(i) => Err(Error::Protocol(ProtocolError::UnknownControlOpCode(i)))
                }
            },
            OpCode::Data(data) => {
                let fragment = match data {
                    Data::Continuation => {
                        let Some(incomplete) = self.incomplete.as_mut() else {
                            return Err(Error::Protocol(ProtocolError::UnexpectedContinue));
                        };
                        incomplete.extend(frame.payload(), &self.config)?;
                        if !fin {
                            return Ok(None);
                        }
                        match self.incomplete.take() {
                            Some(incomplete) => incomplete,
                            None => return Err(Error::Protocol(ProtocolError::UnexpectedContinue))
                        }
                    },
                    Data::Text | Data::Binary => {
                        if let Some(incomplete) = &self.incomplete {
                            return Err(Error::Protocol(ProtocolError::ExpectedFragment(incomplete.kind)));
                        }

                        let kind = if data == Data::Text { FragmentType::Text } else { FragmentType::Binary };
                        let mut message = IncompleteMessage::new(kind);
                        message.extend(frame.payload(), &self.config)?;

                        if !fin {
                            self.incomplete = Some(message);
                            return Ok(None);
                        }
                        message
                    },
                    Data::Reserved(i) => return Err(Error::Protocol(ProtocolError::UnknownDataOpCode(i)))
                };

                fragment.complete().map(Some)
            }
        }
    }

    fn peer_closed(&mut self, close: Option<&CloseFrame>) -> Result<()> {
        match self.state {
            WebSocketState::Active => {
                debug!("peer started close handshake: {}", close.map_or_else(|| "no status".to_owned(), |c| c.to_string()));
                // Echo the status code, never the reason.
                let reply = close.map(|c| CloseFrame { code: c.code, reason: String::new() });
                self.set_state(WebSocketState::CloseAcknowledged);
                self.write_frame(Frame::new_close(reply))
            },
            WebSocketState::ClosedByUs => {
                self.set_state(WebSocketState::CloseAcknowledged);
                Ok(())
            },
            _ => Err(Error::Protocol(ProtocolError::ReceiveAfterClose))
        }
    }

    fn stream_ended(&mut self) -> Error {
        let state = self.state;
        self.set_state(WebSocketState::Terminated);

        match state {
            WebSocketState::Active => Error::Protocol(ProtocolError::ResetWithoutClosing),
            _ => Error::ConnectionClosed
        }
    }

    fn write_frame(&mut self, mut frame: Frame) -> Result<()> {
        frame.set_random_mask();
        trace!("sending frame: {frame}");

        self.codec.write(&mut self.stream, frame)?;
        Ok(self.stream.flush()?)
    }

    fn set_state(&mut self, state: WebSocketState) {
        if self.state != state {
            debug!("websocket state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}

/// A data message being reassembled from fragments.
#[derive(Debug)]
struct IncompleteMessage {
    kind: FragmentType,
    data: Vec<u8>,
    fragments: usize
}

impl IncompleteMessage {
    fn new(kind: FragmentType) -> Self {
        IncompleteMessage { kind, data: Vec::new(), fragments: 0 }
    }

    fn extend(&mut self, payload: &[u8], config: &WebSocketConfig) -> Result<()> {
        if self.fragments > config.max_continuation_frames {
            return Err(Error::Capacity(CapacityError::TooManyFragments { max: config.max_continuation_frames }));
        }

        let size = self.data.len() + payload.len();
        if let Some(max) = config.max_message_size {
            if size > max {
                return Err(Error::Capacity(CapacityError::MessageTooLarge { size, max }));
            }
        }

        self.data.extend_from_slice(payload);
        self.fragments += 1;
        Ok(())
    }

    fn complete(self) -> Result<Message> {
        match self.kind {
            FragmentType::Text => Ok(Message::Text(String::from_utf8(self.data)?)),
            FragmentType::Binary => Ok(Message::Binary(self.data))
        }
    }
}
