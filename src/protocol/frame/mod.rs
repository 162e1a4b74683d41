//! Frame module

pub mod codec;
pub mod core;

#[allow(clippy::module_inception)]
mod frame;
mod mask;

pub use self::{
    core::FrameSocket,
    frame::{CloseFrame, Frame, FrameHeader}
};
