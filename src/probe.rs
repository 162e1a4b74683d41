//! One-shot log retrieval from a device under test.
//!
//! A probe run connects to `ws://<host>/ws`, sends `getlog`, waits for one
//! data message, reports it and closes the connection again.

use std::{fmt, net::{Ipv4Addr, Ipv6Addr}, time::Duration};

use log::{debug, trace, warn};
use thiserror::Error;
use url::{Host, Url};

use crate::{
    client::connect_wrapping,
    config::ProbeConfig,
    error::Error,
    protocol::{frame::CloseFrame, message::Message, websocket::{WebSocket, WebSocketState}},
    stream::DeadlineStream,
    util::TimeoutError
};

/// The command sent to the DUT. Never varies.
pub const LOG_COMMAND: &str = "getlog";

/// Exit status of a successful exchange.
pub const EXIT_OK: u8 = 0;

/// Validated `ws://` endpoint of a DUT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    uri: Url,
    /// `ws://<host><path>` with the host as given.
    display: String
}

impl Target {
    /// Builds `ws://<host><path>`.
    ///
    /// `host` is an IP address or hostname, optionally with a port. It must
    /// not carry a scheme, path, query, fragment or credentials. A bare IPv6
    /// address is bracketed. Numeric hosts must be dotted-quad IPv4, so
    /// shorthand like `1.2.3` is not silently read as `1.2.0.3`.
    pub fn from_host(host: &str, path: &str) -> Result<Self, ProbeError> {
        let invalid = |reason: &str| ProbeError::InvalidTarget { host: host.to_owned(), reason: reason.to_owned() };

        if host.is_empty() {
            return Err(ProbeError::MissingArgument);
        }
        if host.contains("://") {
            return Err(invalid("the host must not include a scheme"));
        }
        if host.chars().any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '@' | '\\')) {
            return Err(invalid("expected an IP address or hostname, optionally with a port"));
        }

        let authority = match host.parse::<Ipv6Addr>() {
            Ok(_) => format!("[{host}]"),
            Err(_) => host.to_owned()
        };
        let path = if path.starts_with('/') { path.to_owned() } else { format!("/{path}") };

        let uri = Url::parse(&format!("ws://{authority}{path}")).map_err(|e| invalid(&e.to_string()))?;
        match uri.host() {
            None | Some(Host::Domain("")) => return Err(invalid("empty host name")),
            Some(Host::Ipv4(_)) if name_part(host).parse::<Ipv4Addr>().is_err() => {
                return Err(invalid("IPv4 addresses must be written as four dotted decimals"));
            },
            _ => ()
        }
        if uri.path() != path {
            return Err(invalid("the host must not contain a path"));
        }

        Ok(Target { uri, display: format!("ws://{authority}{path}") })
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

/// `host` without a trailing `:port`. Only called for IPv4 hosts, which carry no other colon.
fn name_part(host: &str) -> &str {
    host.rsplit_once(':').map_or(host, |(name, _)| name)
}

/// Lifecycle of the single connection a probe opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Connected,
    Closed
}

/// The data message the DUT answered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Binary(Vec<u8>)
}

impl Reply {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Reply::Text(s) => s.as_bytes(),
            Reply::Binary(b) => b
        }
    }
}

impl fmt::Display for Reply {
    /// Text verbatim, binary as lossy UTF-8.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Text(s) => f.write_str(s),
            Reply::Binary(b) => f.write_str(&String::from_utf8_lossy(b))
        }
    }
}

/// Progress notifications, in the order they happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeEvent<'a> {
    Connecting(&'a Target),
    Sent,
    Receiving,
    Received(&'a Reply)
}

/// Why waiting for the reply failed.
#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error("no reply within {}s", .0.as_secs_f64())]
    TimedOut(Duration),

    #[error("peer closed the connection before responding{}", .0.as_ref().map(|c| format!(" ({c})")).unwrap_or_default())]
    PeerClosed(Option<CloseFrame>),

    #[error(transparent)]
    Transport(#[from] Error)
}

/// Failure of a probe run, one variant per reportable kind.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no DUT host given")]
    MissingArgument,

    #[error("invalid host '{host}': {reason}")]
    InvalidTarget { host: String, reason: String },

    #[error("cannot connect to {target}: {source}")]
    ConnectionFailure {
        target: String,
        #[source]
        source: Error
    },

    #[error("handshake with {target} failed: {source}")]
    HandshakeFailure {
        target: String,
        #[source]
        source: Error
    },

    #[error("sending the log command failed: {source}")]
    SendFailure {
        #[source]
        source: Error
    },

    #[error("{source}")]
    ReceiveFailure {
        #[source]
        source: ReceiveError
    }
}

impl ProbeError {
    /// Name of the kind, as printed in the diagnostic line.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::MissingArgument => "MissingArgument",
            ProbeError::InvalidTarget { .. } => "InvalidTarget",
            ProbeError::ConnectionFailure { .. } => "ConnectionFailure",
            ProbeError::HandshakeFailure { .. } => "HandshakeFailure",
            ProbeError::SendFailure { .. } => "SendFailure",
            ProbeError::ReceiveFailure { .. } => "ReceiveFailure"
        }
    }

    /// Process exit status for this kind. Never zero.
    pub fn exit_code(&self) -> u8 {
        match self {
            ProbeError::MissingArgument | ProbeError::InvalidTarget { .. } => 2,
            ProbeError::ConnectionFailure { .. } => 3,
            ProbeError::HandshakeFailure { .. } => 4,
            ProbeError::SendFailure { .. } => 5,
            ProbeError::ReceiveFailure { .. } => 6
        }
    }

    /// Whether usage help should accompany the diagnostic.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, ProbeError::MissingArgument | ProbeError::InvalidTarget { .. })
    }
}

/// The one connection of a probe run.
#[derive(Debug)]
pub struct Session {
    target: Target,
    config: ProbeConfig,
    state: SessionState
}

impl Session {
    pub fn new(target: Target, config: ProbeConfig) -> Self {
        Session { target, config, state: SessionState::Unconnected }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Connects, sends [`LOG_COMMAND`] and waits for one data message.
    ///
    /// Connecting, the handshake, the wait for the reply and the wait for the
    /// peer's close each get the configured timeout as a whole. The connection
    /// is closed before returning, whatever the outcome.
    pub fn run(&mut self, mut on_event: impl FnMut(ProbeEvent<'_>)) -> Result<Reply, ProbeError> {
        on_event(ProbeEvent::Connecting(&self.target));

        let timeout = self.config.timeout;
        let connected = connect_wrapping(
            self.target.uri().as_str(),
            self.config.websocket,
            &self.config.stream_options(),
            |stream| {
                let mut stream = DeadlineStream::new(stream);
                stream.expire_in(timeout);
                stream
            }
        );
        let (mut ws, _) = match connected {
            Ok(pair) => pair,
            Err(e) => {
                self.set_state(SessionState::Closed);
                return Err(self.connect_error(e));
            }
        };
        self.set_state(SessionState::Connected);

        let result = self.exchange(&mut ws, &mut on_event);

        // A silent peer would only stall the close as well.
        let timed_out = matches!(result, Err(ProbeError::ReceiveFailure { source: ReceiveError::TimedOut(_) }));
        shutdown(&mut ws, (!timed_out).then_some(timeout));
        self.set_state(SessionState::Closed);

        result
    }

    fn exchange(&self, ws: &mut WebSocket<DeadlineStream>, on_event: &mut impl FnMut(ProbeEvent<'_>)) -> Result<Reply, ProbeError> {
        ws.send(Message::text(LOG_COMMAND))
            .map_err(|source| ProbeError::SendFailure { source })?;
        on_event(ProbeEvent::Sent);

        on_event(ProbeEvent::Receiving);
        ws.get_mut().expire_in(self.config.timeout);
        let reply = self
            .receive(ws)
            .map_err(|source| ProbeError::ReceiveFailure { source })?;
        on_event(ProbeEvent::Received(&reply));

        Ok(reply)
    }

    /// Waits for the reply until the stream's deadline passes.
    fn receive(&self, ws: &mut WebSocket<DeadlineStream>) -> Result<Reply, ReceiveError> {
        loop {
            match ws.read() {
                Ok(Message::Text(s)) => return Ok(Reply::Text(s)),
                Ok(Message::Binary(b)) => return Ok(Reply::Binary(b)),
                Ok(Message::Close(close)) => return Err(ReceiveError::PeerClosed(close)),
                Ok(other) => trace!("ignoring {other} while waiting for the reply"),
                Err(Error::ConnectionClosed) => return Err(ReceiveError::PeerClosed(None)),
                Err(e) if e.is_timeout() => return Err(ReceiveError::TimedOut(self.config.timeout)),
                Err(e) => return Err(e.into())
            }
        }
    }

    fn connect_error(&self, source: Error) -> ProbeError {
        let target = self.target.to_string();
        match source {
            Error::Url(_) => ProbeError::ConnectionFailure { target, source },
            _ => ProbeError::HandshakeFailure { target, source }
        }
    }

    fn set_state(&mut self, state: SessionState) {
        debug!("session {}: {:?} -> {:?}", self.target, self.state, state);
        self.state = state;
    }
}

/// Starts the close handshake and waits up to `wait_for_peer` for the peer's close frame.
///
/// Failures are logged, never returned: the exchange already decided the outcome.
fn shutdown(ws: &mut WebSocket<DeadlineStream>, wait_for_peer: Option<Duration>) {
    match ws.close(Some(CloseFrame::normal())) {
        Ok(()) => (),
        Err(Error::AlreadyClosed) => return,
        Err(e) => {
            warn!("closing the connection failed: {e}");
            return;
        }
    }

    let Some(wait) = wait_for_peer else {
        return;
    };
    if ws.state() != WebSocketState::ClosedByUs {
        return;
    }
    ws.get_mut().expire_in(wait);

    loop {
        match ws.read() {
            Ok(Message::Close(close)) => {
                debug!("peer acknowledged close: {}", close.map_or_else(|| "no status".to_owned(), |c| c.to_string()));
                return;
            },
            Ok(other) => trace!("discarding {other} while closing"),
            Err(Error::ConnectionClosed) | Err(Error::AlreadyClosed) => return,
            Err(e) if e.is_timeout() => {
                debug!("peer did not acknowledge close in time");
                return;
            },
            Err(e) => {
                warn!("closing the connection failed: {e}");
                return;
            }
        }
    }
}

/// Validates the host argument and runs one exchange.
pub fn run(host: Option<&str>, config: &ProbeConfig, on_event: impl FnMut(ProbeEvent<'_>)) -> Result<Reply, ProbeError> {
    let host = host.ok_or(ProbeError::MissingArgument)?;
    let target = Target::from_host(host, &config.path)?;

    Session::new(target, config.clone()).run(on_event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::UrlError, protocol::frame::codec::CloseCode};

    fn target(host: &str) -> Result<Target, ProbeError> {
        Target::from_host(host, "/ws")
    }

    #[test]
    fn target_uri_is_ws_host_ws() {
        let t = target("192.168.4.1").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(t.to_string(), "ws://192.168.4.1/ws");

        let t = target("dut.local:8080").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(t.to_string(), "ws://dut.local:8080/ws");
    }

    #[test]
    fn target_is_shown_as_typed() {
        let t = target("dut:80").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(t.to_string(), "ws://dut:80/ws");
        assert_eq!(t.uri().as_str(), "ws://dut/ws");

        let t = target("10.0.0.7:80").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(t.to_string(), "ws://10.0.0.7:80/ws");
    }

    #[test]
    fn ipv4_shorthand_is_rejected() {
        for host in ["1.2.3", "1.2.3:8080", "127.1", "2130706433", "0x7f.0.0.1"] {
            assert!(
                matches!(target(host), Err(ProbeError::InvalidTarget { .. })),
                "accepted {host}"
            );
        }
        assert!(target("192.168.4.1:8080").is_ok());
    }

    #[test]
    fn bare_ipv6_is_bracketed() {
        let t = target("::1").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(t.to_string(), "ws://[::1]/ws");
    }

    #[test]
    fn empty_host_is_a_missing_argument() {
        assert!(matches!(target(""), Err(ProbeError::MissingArgument)));
        assert!(matches!(run(None, &ProbeConfig::default(), |_| ()), Err(ProbeError::MissingArgument)));
    }

    #[test]
    fn hosts_with_extra_parts_are_rejected() {
        for host in ["ws://dut", "dut/ws", "dut?x=1", "user@dut", "dut:notaport", "two words"] {
            assert!(
                matches!(target(host), Err(ProbeError::InvalidTarget { .. })),
                "accepted {host}"
            );
        }
    }

    #[test]
    fn exit_codes_are_distinct_and_non_zero() {
        let errors = [
            ProbeError::MissingArgument,
            ProbeError::ConnectionFailure { target: String::new(), source: Error::Url(UrlError::UnableToConnect(String::new())) },
            ProbeError::HandshakeFailure { target: String::new(), source: Error::AttackAttempt },
            ProbeError::SendFailure { source: Error::AlreadyClosed },
            ProbeError::ReceiveFailure { source: ReceiveError::TimedOut(Duration::from_secs(1)) }
        ];

        let mut codes: Vec<u8> = errors.iter().map(ProbeError::exit_code).collect();
        assert!(codes.iter().all(|&c| c != EXIT_OK));
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn receive_failures_explain_themselves() {
        let timeout = ReceiveError::TimedOut(Duration::from_millis(1500));
        assert_eq!(timeout.to_string(), "no reply within 1.5s");

        let closed = ReceiveError::PeerClosed(Some(CloseFrame { code: CloseCode::Away, reason: "reboot".into() }));
        assert_eq!(closed.to_string(), "peer closed the connection before responding (1001 (reboot))");

        assert_eq!(ReceiveError::PeerClosed(None).to_string(), "peer closed the connection before responding");
    }

    #[test]
    fn binary_reply_is_shown_lossily() {
        let reply = Reply::Binary(vec![b'o', b'k', 0xFF]);
        assert_eq!(reply.to_string(), "ok\u{FFFD}");
        assert_eq!(reply.as_bytes(), [b'o', b'k', 0xFF]);
    }

    #[test]
    fn connect_errors_are_classified() {
        let session = Session::new(target("dut").unwrap_or_else(|e| panic!("{e}")), ProbeConfig::default());

        let refused = session.connect_error(Error::Url(UrlError::UnableToConnect("refused".into())));
        assert_eq!(refused.kind(), "ConnectionFailure");

        let rejected = session.connect_error(Error::Protocol(crate::error::ProtocolError::AcceptKeyMismatch));
        assert_eq!(rejected.kind(), "HandshakeFailure");
    }
}
