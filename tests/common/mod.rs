//! A scripted stand-in for the device under test.

#![allow(dead_code)]

use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    thread::{self, JoinHandle},
    time::Duration
};

use onlog_probe::{
    handshake::derive_accept_key,
    util::TimeoutError,
    protocol::frame::{
        codec::{CloseCode, Control, Data, OpCode},
        CloseFrame, Frame, FrameSocket
    }
};

/// What the DUT does once the client's command arrived.
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Answer with a text message.
    Reply(String),
    /// Answer with a binary message.
    ReplyBinary(Vec<u8>),
    /// Ping first, then answer with text.
    PingThenReply(String),
    /// Never answer, wait for the client to go away.
    Silent,
    /// Send a close frame instead of an answer.
    CloseFirst,
    /// Never answer, but ping at this interval until the client closes.
    PingEvery(Duration),
    /// Refuse the upgrade with `404 Not Found`.
    NotFound
}

/// Everything the DUT saw from the client.
#[derive(Debug, Default)]
pub struct Transcript {
    pub request_path: String,
    pub frames: Vec<(OpCode, Vec<u8>)>
}

impl Transcript {
    pub fn data_frames(&self) -> Vec<&(OpCode, Vec<u8>)> {
        self.frames.iter().filter(|(op, _)| !op.is_control()).collect()
    }

    pub fn saw_close(&self) -> bool {
        self.frames.iter().any(|(op, _)| *op == OpCode::Control(Control::Close))
    }
}

/// Serves exactly one connection on an ephemeral localhost port.
pub fn spawn_dut(behaviour: Behaviour) -> (SocketAddr, JoinHandle<Transcript>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap_or_else(|e| panic!("bind: {e}"));
    let addr = listener.local_addr().unwrap_or_else(|e| panic!("local addr: {e}"));

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap_or_else(|e| panic!("accept: {e}"));
        serve(stream, behaviour)
    });

    (addr, handle)
}

/// A localhost address nothing listens on.
pub fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap_or_else(|e| panic!("bind: {e}"));
    listener.local_addr().unwrap_or_else(|e| panic!("local addr: {e}"))
}

fn serve(mut stream: TcpStream, behaviour: Behaviour) -> Transcript {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(10)));
    let mut transcript = Transcript::default();

    let (path, key) = read_request(&mut stream);
    transcript.request_path = path;

    if let Behaviour::NotFound = behaviour {
        let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
        return transcript;
    }

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        derive_accept_key(key.as_bytes())
    );
    if stream.write_all(response.as_bytes()).is_err() {
        return transcript;
    }

    let mut socket = FrameSocket::new(stream);

    // The command.
    if !record(&mut socket, &mut transcript) {
        return transcript;
    }

    let ping_interval = match behaviour {
        Behaviour::PingEvery(interval) => Some(interval),
        _ => None
    };

    let sent = match behaviour {
        Behaviour::Reply(text) => socket.send(Frame::new_data(text.into_bytes(), Data::Text, true)),
        Behaviour::ReplyBinary(data) => socket.send(Frame::new_data(data, Data::Binary, true)),
        Behaviour::PingThenReply(text) => socket
            .send(Frame::new_ping(&b"alive?"[..]))
            .and_then(|_| socket.send(Frame::new_data(text.into_bytes(), Data::Text, true))),
        Behaviour::CloseFirst => socket.send(Frame::new_close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "rebooting".into()
        }))),
        Behaviour::Silent | Behaviour::PingEvery(_) | Behaviour::NotFound => Ok(())
    };
    if sent.is_err() {
        return transcript;
    }

    if let Some(interval) = ping_interval {
        ping_until_close(&mut socket, &mut transcript, interval);
        return transcript;
    }

    // Everything the client sends until it closes; answer its close.
    while record(&mut socket, &mut transcript) {
        if answer_close(&mut socket, &transcript) {
            break;
        }
    }

    transcript
}

/// Pings whenever the client stays quiet for `interval`, for at most 50 rounds.
fn ping_until_close(socket: &mut FrameSocket<TcpStream>, transcript: &mut Transcript, interval: Duration) {
    let _ = socket.get_ref().set_read_timeout(Some(interval));

    for _ in 0..50 {
        match socket.read(None) {
            Ok(Some(frame)) => {
                let op = frame.header().opcode;
                transcript.frames.push((op, frame.into_payload().to_vec()));
                if answer_close(socket, transcript) {
                    return;
                }
            },
            Err(e) if e.is_timeout() => {
                if socket.send(Frame::new_ping(Vec::new())).is_err() {
                    return;
                }
            },
            _ => return
        }
    }
}

/// Echoes the client's close code if the last recorded frame was a close.
fn answer_close(socket: &mut FrameSocket<TcpStream>, transcript: &Transcript) -> bool {
    match transcript.frames.last() {
        Some((OpCode::Control(Control::Close), payload)) => {
            let code = if payload.len() >= 2 { u16::from_be_bytes([payload[0], payload[1]]) } else { 1000 };
            let _ = socket.send(Frame::new_close(Some(CloseFrame { code: code.into(), reason: String::new() })));
            true
        },
        _ => false
    }
}

/// Reads one frame into the transcript. `false` once the client is gone.
fn record(socket: &mut FrameSocket<TcpStream>, transcript: &mut Transcript) -> bool {
    match socket.read(None) {
        Ok(Some(frame)) => {
            let op = frame.header().opcode;
            transcript.frames.push((op, frame.into_payload().to_vec()));
            true
        },
        _ => false
    }
}

/// Reads the upgrade request and returns its path and `Sec-WebSocket-Key`.
fn read_request(stream: &mut TcpStream) -> (String, String) {
    let mut data = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        let n = stream.read(&mut chunk).unwrap_or(0);
        if n == 0 {
            panic!("client went away during the handshake");
        }
        data.extend_from_slice(&chunk[..n]);

        let mut headers = [httparse::EMPTY_HEADER; 32];
        let mut req = httparse::Request::new(&mut headers);
        if let Ok(httparse::Status::Complete(_)) = req.parse(&data) {
            let path = req.path.unwrap_or_default().to_owned();
            let key = req
                .headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case("Sec-WebSocket-Key"))
                .map(|h| String::from_utf8_lossy(h.value).into_owned())
                .unwrap_or_default();
            return (path, key);
        }
    }
}
