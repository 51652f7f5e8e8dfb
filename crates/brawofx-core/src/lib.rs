//! BlackmagicRAWOFX Core - Foundation types for the RAW reader
//!
//! This crate provides the value types shared by the SDK bindings and the reader:
//! - Pixel rectangles and render scales (RectI, PointD)
//! - Frame ranges and host-time to frame-index mapping
//! - The caller-owned output image view and RGB copy routine

pub mod error;
pub mod frame;
pub mod geometry;
pub mod time;

pub use error::{CoreError, Result};
pub use frame::{ImageBufferMut, PixelComponents, RgbFrame};
pub use geometry::{PointD, RectI};
pub use time::{frame_index_for_time, FrameRange};

/// Number of float channels in every frame the codec hands back.
pub const DECODED_CHANNELS: usize = 3;
