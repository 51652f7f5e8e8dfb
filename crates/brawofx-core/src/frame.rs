//! Image buffers for decoded frames in CPU memory.
//!
//! The host owns the output memory; the reader only writes the first three
//! channels of every pixel inside the render window.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::DECODED_CHANNELS;

/// Pixel component layout requested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelComponents {
    /// Red, green, blue
    #[default]
    Rgb,
    /// Red, green, blue, alpha
    Rgba,
    /// Single alpha channel
    Alpha,
    /// Nothing requested
    None,
}

impl PixelComponents {
    /// Number of channels per pixel.
    pub fn count(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Rgba => 4,
            Self::Alpha => 1,
            Self::None => 0,
        }
    }
}

/// Mutable view over a caller-owned float image.
///
/// `pixel_stride` and `row_stride` are measured in floats. The pixel stride
/// may exceed three; extra channels are never touched.
#[derive(Debug)]
pub struct ImageBufferMut<'a> {
    data: &'a mut [f32],
    width: u32,
    height: u32,
    pixel_stride: usize,
    row_stride: usize,
}

impl<'a> ImageBufferMut<'a> {
    /// Wrap a host buffer laid out with `row_bytes` bytes per row.
    pub fn new(
        data: &'a mut [f32],
        width: u32,
        height: u32,
        pixel_stride: usize,
        row_bytes: usize,
    ) -> Result<Self> {
        let float_size = std::mem::size_of::<f32>();
        if row_bytes % float_size != 0 {
            return Err(CoreError::InvalidLayout(format!(
                "row bytes {row_bytes} is not a multiple of {float_size}"
            )));
        }
        Self::with_strides(data, width, height, pixel_stride, row_bytes / float_size)
    }

    /// Wrap a buffer with tightly packed rows.
    pub fn packed(data: &'a mut [f32], width: u32, height: u32, pixel_stride: usize) -> Result<Self> {
        Self::with_strides(data, width, height, pixel_stride, width as usize * pixel_stride)
    }

    fn with_strides(
        data: &'a mut [f32],
        width: u32,
        height: u32,
        pixel_stride: usize,
        row_stride: usize,
    ) -> Result<Self> {
        if pixel_stride < DECODED_CHANNELS {
            return Err(CoreError::InvalidLayout(format!(
                "pixel stride {pixel_stride} cannot hold RGB"
            )));
        }
        let row_len = width as usize * pixel_stride;
        if row_stride < row_len {
            return Err(CoreError::InvalidLayout(format!(
                "row stride {row_stride} shorter than row of {row_len} floats"
            )));
        }
        let needed = match height {
            0 => 0,
            h => (h as usize - 1) * row_stride + row_len,
        };
        if data.len() < needed {
            return Err(CoreError::BufferTooSmall {
                needed,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            pixel_stride,
            row_stride,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn pixel_stride(&self) -> usize {
        self.pixel_stride
    }

    /// Get a mutable row, including any trailing channels of the last pixel.
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [f32] {
        let start = y as usize * self.row_stride;
        let end = start + self.width as usize * self.pixel_stride;
        &mut self.data[start..end]
    }

    /// Copy `width × height` packed RGB pixels into this view.
    ///
    /// `src` holds rows of `src_width` pixels with three floats each. Values
    /// are copied unchanged.
    pub fn copy_rgb_from(&mut self, src: &[f32], src_width: u32) -> Result<()> {
        if src_width < self.width {
            return Err(CoreError::InvalidLayout(format!(
                "source width {src_width} narrower than window width {}",
                self.width
            )));
        }
        let src_row = src_width as usize * DECODED_CHANNELS;
        let needed = match self.height {
            0 => 0,
            h => (h as usize - 1) * src_row + self.width as usize * DECODED_CHANNELS,
        };
        if src.len() < needed {
            return Err(CoreError::BufferTooSmall {
                needed,
                actual: src.len(),
            });
        }

        let width = self.width as usize;
        let stride = self.pixel_stride;
        for y in 0..self.height {
            let src_start = y as usize * src_row;
            let src_pixels = &src[src_start..src_start + width * DECODED_CHANNELS];
            let dst = self.row_mut(y);
            for (dst_px, src_px) in dst
                .chunks_exact_mut(stride)
                .zip(src_pixels.chunks_exact(DECODED_CHANNELS))
            {
                dst_px[..DECODED_CHANNELS].copy_from_slice(src_px);
            }
        }
        Ok(())
    }
}

/// An owned, tightly packed RGB float frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RgbFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl RgbFrame {
    /// Create a black frame of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width as usize * height as usize * DECODED_CHANNELS],
        }
    }

    /// Borrow the frame as an output view.
    pub fn as_image_mut(&mut self) -> ImageBufferMut<'_> {
        ImageBufferMut {
            width: self.width,
            height: self.height,
            pixel_stride: DECODED_CHANNELS,
            row_stride: self.width as usize * DECODED_CHANNELS,
            data: &mut self.data,
        }
    }

    /// RGB value at `(x, y)`.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
        let i = (y as usize * self.width as usize + x as usize) * DECODED_CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }
}
