//! Transport limits

use crate::{MAX_ALLOWED_LEN, MAX_CONTINUATION_FRAMES};

/// Limits applied to incoming data on a [`WebSocket`](super::WebSocket).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebSocketConfig {
    /// Largest reassembled message. `None` means unlimited.
    pub max_message_size: Option<usize>,
    /// Largest single frame payload. `None` means unlimited.
    pub max_frame_size: Option<usize>,
    /// Most continuation frames accepted for one message.
    pub max_continuation_frames: usize
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: Some(MAX_ALLOWED_LEN),
            max_frame_size: Some(MAX_ALLOWED_LEN),
            max_continuation_frames: MAX_CONTINUATION_FRAMES
        }
    }
}

impl WebSocketConfig {
    /// Caps both the message and the frame size.
    pub fn max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = Some(max);
        self.max_frame_size = Some(self.max_frame_size.map_or(max, |f| f.min(max)));
        self
    }
}
