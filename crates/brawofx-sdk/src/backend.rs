//! Backend seam over the codec's handle chain.
//!
//! Handles form a strict ownership chain: a factory creates codecs, a codec
//! opens clips, a clip creates jobs. Every boxed handle releases its native
//! object exactly once when dropped, and borrows its parent so the parent
//! cannot be released first.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SdkResult;

/// Entry point of a codec implementation.
pub trait RawRuntime: Send + Sync {
    /// Load the codec from `library_dir` and create a factory.
    fn create_factory(&self, library_dir: &Path) -> SdkResult<Box<dyn RawFactory>>;
}

/// Factory handle.
pub trait RawFactory {
    fn create_codec(&self) -> SdkResult<Box<dyn RawCodec + '_>>;
}

/// Codec handle. Owns the job queue and its worker threads.
pub trait RawCodec {
    /// Open a clip for reading.
    fn open_clip(&self, path: &Path) -> SdkResult<Box<dyn RawClip + '_>>;

    /// Install the completion callback for every job created below this codec.
    fn set_callback(&self, callback: Arc<dyn RawCallback>) -> SdkResult<()>;

    /// Block until every submitted job, and every job those jobs spawned, has completed.
    ///
    /// All callback writes happen before this returns.
    fn flush_jobs(&self);
}

/// Clip handle.
pub trait RawClip {
    fn width(&self) -> SdkResult<u32>;
    fn height(&self) -> SdkResult<u32>;
    fn frame_rate(&self) -> SdkResult<f32>;
    fn frame_count(&self) -> SdkResult<u64>;

    /// Current value of a clip processing attribute.
    fn clip_attribute(&self, attribute: ClipAttribute) -> SdkResult<AttributeValue>;

    /// Every value the clip accepts for a list-valued attribute.
    fn clip_attribute_list(&self, attribute: ClipAttribute) -> SdkResult<Vec<AttributeValue>>;

    /// ISO values supported by the clip.
    fn iso_list(&self) -> SdkResult<Vec<u32>>;

    /// Clip metadata entry, `None` when the key is absent.
    fn metadata(&self, key: &str) -> SdkResult<Option<AttributeValue>>;

    /// Create a job that reads one frame (zero-based index).
    fn create_read_job(&self, frame_index: u64) -> SdkResult<Box<dyn RawJob + '_>>;
}

/// An unsubmitted job.
pub trait RawJob {
    /// Hand the job to the codec's queue.
    ///
    /// On success the codec owns the job and releases it after completion.
    /// On failure the job is released when the box drops.
    fn submit(self: Box<Self>) -> SdkResult<()>;
}

/// Receives job completions on a codec-owned thread.
pub trait RawCallback: Send + Sync {
    /// A read job finished. On success `frame` may be configured and sent on
    /// for decode and processing.
    fn read_complete(&self, frame_index: u64, result: SdkResult<&mut dyn ReadFrame>);

    /// A decode-and-process job finished.
    fn process_complete(&self, frame_index: u64, result: SdkResult<ProcessedImage>);
}

/// A frame that has been read but not yet decoded.
///
/// Attribute setters act on copies of the clip and frame processing
/// attributes taken for this frame only.
pub trait ReadFrame {
    fn set_resolution_scale(&mut self, scale: ResolutionScale) -> SdkResult<()>;
    fn set_resource_format(&mut self, format: ResourceFormat) -> SdkResult<()>;
    fn set_clip_attribute(&mut self, attribute: ClipAttribute, value: AttributeValue) -> SdkResult<()>;
    fn set_frame_attribute(&mut self, attribute: FrameAttribute, value: AttributeValue) -> SdkResult<()>;

    /// Create and submit the decode-and-process job with the attributes set so far.
    fn submit_decode(&mut self) -> SdkResult<()>;
}

/// Clip-level processing attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClipAttribute {
    Gamma,
    Gamut,
    ToneCurveContrast,
    ToneCurveSaturation,
    ToneCurveMidpoint,
    ToneCurveHighlights,
    ToneCurveShadows,
    ToneCurveVideoBlackLevel,
    HighlightRecovery,
}

/// Frame-level processing attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameAttribute {
    WhiteBalanceKelvin,
    WhiteBalanceTint,
    Exposure,
    Iso,
}

/// Value of an attribute or metadata entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    U8(u8),
    S16(i16),
    U16(u16),
    S32(i32),
    U32(u32),
    F32(f32),
    F64(f64),
    Text(String),
}

impl AttributeValue {
    /// Numeric value as `f64`, `None` for text.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::U8(v) => Some(v as f64),
            Self::S16(v) => Some(v as f64),
            Self::U16(v) => Some(v as f64),
            Self::S32(v) => Some(v as f64),
            Self::U32(v) => Some(v as f64),
            Self::F32(v) => Some(v as f64),
            Self::F64(v) => Some(v),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Decode resolution relative to the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionScale {
    Full,
    Half,
    Quarter,
    Eighth,
}

impl ResolutionScale {
    /// Integer divisor applied to both dimensions.
    pub fn divisor(self) -> u32 {
        match self {
            Self::Full => 1,
            Self::Half => 2,
            Self::Quarter => 4,
            Self::Eighth => 8,
        }
    }
}

/// Pixel layout of a processed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceFormat {
    /// Interleaved 32-bit float RGB
    RgbF32,
    /// Interleaved 8-bit RGBA
    RgbaU8,
}

/// A decoded image in codec-owned memory.
///
/// The pointer stays valid until the codec that produced it is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessedImage {
    pub data: *const f32,
    pub width: u32,
    pub height: u32,
    pub size_bytes: usize,
}

// SAFETY: The image is a descriptor of immutable codec memory. Readers only
// dereference it after `flush_jobs` returns and before the codec is released.
unsafe impl Send for ProcessedImage {}
unsafe impl Sync for ProcessedImage {}

impl ProcessedImage {
    /// Number of floats addressable through `data`.
    #[inline]
    pub fn len_floats(&self) -> usize {
        self.size_bytes / std::mem::size_of::<f32>()
    }

    /// View the pixels.
    ///
    /// # Safety
    ///
    /// The codec that produced the image must still be alive, and no job may
    /// be writing to it.
    pub unsafe fn as_slice<'a>(&self) -> &'a [f32] {
        if self.data.is_null() {
            return &[];
        }
        std::slice::from_raw_parts(self.data, self.len_floats())
    }
}
