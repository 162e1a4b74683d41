//! Protocol module

pub mod config;
pub mod frame;
pub mod message;
pub mod websocket;

pub use self::{config::WebSocketConfig, message::Message, websocket::WebSocket};
