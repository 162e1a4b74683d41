//! Plain TCP stream setup

use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    sync::mpsc,
    thread,
    time::{Duration, Instant}
};

use log::debug;

use crate::error::{Error, Result, UrlError};

/// Socket settings applied when connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Per-address connect timeout. `None` uses the OS default.
    pub connect_timeout: Option<Duration>,
    /// Timeout for each blocking read. `None` blocks forever.
    pub read_timeout: Option<Duration>,
    /// Timeout for each blocking write. `None` blocks forever.
    pub write_timeout: Option<Duration>,
    /// Disable Nagle's algorithm.
    pub nodelay: bool
}

impl Default for StreamOptions {
    fn default() -> Self {
        StreamOptions {
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            nodelay: true
        }
    }
}

impl StreamOptions {
    /// Same timeout for connecting, reading and writing.
    pub fn with_timeout(timeout: Duration) -> Self {
        StreamOptions {
            connect_timeout: Some(timeout),
            read_timeout: Some(timeout),
            write_timeout: Some(timeout),
            ..Default::default()
        }
    }

    /// Applies the read/write timeouts and `TCP_NODELAY` to a connected stream.
    pub fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_read_timeout(self.read_timeout)?;
        stream.set_write_timeout(self.write_timeout)?;
        stream.set_nodelay(self.nodelay)
    }
}

/// Resolves `host` and connects to the first address that accepts.
///
/// With a connect timeout, resolution and all connection attempts together
/// must finish within it. Fails with [`UrlError::UnableToConnect`] naming the
/// last error seen.
pub fn connect_to_host(host: &str, port: u16, options: &StreamOptions) -> Result<TcpStream> {
    let deadline = options.connect_timeout.map(|t| Instant::now() + t);
    let unable = |e: &dyn std::fmt::Display| Error::Url(UrlError::UnableToConnect(format!("{host}:{port}: {e}")));

    let addrs = resolve(host, port, deadline).map_err(|e| unable(&e))?;

    let mut last_error = None;
    for addr in addrs {
        debug!("trying {addr}");
        match connect_addr(&addr, options, deadline) {
            Ok(stream) => {
                debug!("connected to {addr}");
                return Ok(stream);
            },
            Err(e) => {
                debug!("connecting to {addr} failed: {e}");
                let expired = e.kind() == io::ErrorKind::TimedOut && deadline.is_some_and(|d| Instant::now() >= d);
                last_error = Some(e);
                if expired {
                    break;
                }
            }
        }
    }

    match last_error {
        Some(e) => Err(unable(&e)),
        None => Err(unable(&"no addresses resolved"))
    }
}

/// Name lookup, abandoned once `deadline` passes.
///
/// The lookup itself cannot be interrupted, so a bounded lookup runs on its
/// own thread and is left behind if it overruns.
fn resolve(host: &str, port: u16, deadline: Option<Instant>) -> io::Result<Vec<SocketAddr>> {
    let Some(deadline) = deadline else {
        return Ok((host, port).to_socket_addrs()?.collect());
    };

    let timeout = remaining(deadline)?;
    let (tx, rx) = mpsc::channel();
    let name = host.to_owned();
    thread::Builder::new().name("resolve".into()).spawn(move || {
        let _ = tx.send((name.as_str(), port).to_socket_addrs().map(Iterator::collect::<Vec<_>>));
    })?;

    match rx.recv_timeout(timeout) {
        Ok(addrs) => addrs,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(timed_out("name resolution timed out")),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(io::Error::other("name resolution failed"))
    }
}

fn connect_addr(addr: &SocketAddr, options: &StreamOptions, deadline: Option<Instant>) -> io::Result<TcpStream> {
    let stream = match deadline {
        Some(deadline) => TcpStream::connect_timeout(addr, remaining(deadline)?)?,
        None => TcpStream::connect(addr)?
    };
    options.apply(&stream)?;

    Ok(stream)
}

/// Time left until `deadline`, or `TimedOut` once it has passed.
fn remaining(deadline: Instant) -> io::Result<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        return Err(timed_out("deadline passed"));
    }
    Ok(left)
}

fn timed_out(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, msg.to_owned())
}

/// A [`TcpStream`] whose reads share one deadline.
///
/// A socket read timeout restarts with every read, so a peer trickling bytes
/// can keep a reader waiting forever. While a deadline is set, each read waits
/// at most for the time left, and fails with `TimedOut` once it is gone.
/// Writes pass through unchanged.
#[derive(Debug)]
pub struct DeadlineStream {
    inner: TcpStream,
    /// Read timeout to restore when the deadline is cleared.
    read_timeout: Option<Duration>,
    deadline: Option<Instant>
}

impl DeadlineStream {
    pub fn new(inner: TcpStream) -> Self {
        let read_timeout = inner.read_timeout().ok().flatten();
        DeadlineStream { inner, read_timeout, deadline: None }
    }

    /// Reads from now on must finish within `timeout`.
    pub fn expire_in(&mut self, timeout: Duration) {
        self.deadline = Some(Instant::now() + timeout);
    }

    /// Back to the plain per-read timeout.
    pub fn clear_deadline(&mut self) -> io::Result<()> {
        self.deadline = None;
        self.inner.set_read_timeout(self.read_timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn get_ref(&self) -> &TcpStream {
        &self.inner
    }
}

impl Read for DeadlineStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(deadline) = self.deadline {
            let left = remaining(deadline)?;
            let timeout = self.read_timeout.map_or(left, |t| t.min(left));
            self.inner.set_read_timeout(Some(timeout))?;
        }
        self.inner.read(buf)
    }
}

impl Write for DeadlineStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
