//! onlog-probe: fetch the log of a device under test over WebSocket
//!
//! The crate carries a small synchronous WebSocket client (plain `ws://`,
//! client role only) and the probe built on it, which sends `getlog` to
//! `ws://<host>/ws` and reports the single reply.
#![allow(clippy::result_large_err)]

pub mod client;
pub mod config;
pub mod error;
pub mod handshake;
pub mod probe;
pub mod protocol;
pub mod stream;
pub mod util;

pub use crate::{
    client::{connect, connect_with_config, connect_wrapping},
    config::ProbeConfig,
    error::{Error, Result},
    probe::{ProbeError, ProbeEvent, Reply, Session, SessionState, Target},
    protocol::{Message, WebSocket, WebSocketConfig}
};

/// Constant for maximum message payload length
pub const MAX_ALLOWED_LEN: usize = 16 * 1024 * 1024;
/// Constant for maximum control frame payload size
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;
/// Constant for maximum continuation frames
pub const MAX_CONTINUATION_FRAMES: usize = 1024;
