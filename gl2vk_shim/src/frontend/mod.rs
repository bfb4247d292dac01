//! Frontend module
//!
//! The GL-style call surface over the layout resolver and the scheduler.

pub mod gl2vk;

pub use gl2vk::{BufferTarget, FrameStatus, Gl2Vk};
