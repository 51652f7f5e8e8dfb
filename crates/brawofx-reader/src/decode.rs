//! Single-frame decode through the codec's handle chain.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use brawofx_core::{frame_index_for_time, CoreError, ImageBufferMut, PixelComponents, PointD, RectI, DECODED_CHANNELS};
use brawofx_sdk::{RawCallback, RawRuntime, SdkError};
use thiserror::Error;
use tracing::{debug, error};

use crate::callback::DecodeCallback;
use crate::decode_params::DecodeParameterSet;
use crate::error::{ReaderError, Result};

/// What the host asked to render.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeRequest {
    pub file: PathBuf,
    /// One-based host time
    pub time: f64,
    pub render_window: RectI,
    pub render_scale: PointD,
    pub components: PixelComponents,
    pub component_count: usize,
}

impl DecodeRequest {
    /// An RGB request at unit scale.
    pub fn rgb(file: impl Into<PathBuf>, time: f64, render_window: RectI) -> Self {
        Self {
            file: file.into(),
            time,
            render_window,
            render_scale: PointD::ONE,
            components: PixelComponents::Rgb,
            component_count: DECODED_CHANNELS,
        }
    }
}

/// Reject requests this decode path cannot serve.
///
/// Only three-component RGB at a render scale of exactly one is supported,
/// and the request must name a file.
pub fn check_request(request: &DecodeRequest) -> Result<()> {
    if request.file.as_os_str().is_empty()
        || request.components != PixelComponents::Rgb
        || request.component_count != DECODED_CHANNELS
        || !request.render_scale.is_unit()
    {
        return Err(ReaderError::WrongInput);
    }
    Ok(())
}

/// Orchestrator progress through one decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    Idle,
    LibraryLoaded,
    CodecCreated,
    ClipOpened,
    CallbackBound,
    JobSubmitted,
    Flushed,
    Released,
}

impl fmt::Display for DecodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::LibraryLoaded => "library loaded",
            Self::CodecCreated => "codec created",
            Self::ClipOpened => "clip opened",
            Self::CallbackBound => "callback bound",
            Self::JobSubmitted => "job submitted",
            Self::Flushed => "flushed",
            Self::Released => "released",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
enum ChainError {
    #[error("failed after {reached}: {source}")]
    Sdk {
        reached: DecodeState,
        #[source]
        source: SdkError,
    },
    #[error("no frame delivered for frame index {0}")]
    NoFrame(u64),
    #[error("processed image {width}x{height} does not cover window {window:?}")]
    ShortImage { width: u32, height: u32, window: RectI },
    #[error(transparent)]
    Copy(#[from] CoreError),
}

fn at(reached: DecodeState) -> impl FnOnce(SdkError) -> ChainError {
    move |source| ChainError::Sdk { reached, source }
}

/// Decode one frame of `request.file` into `output`.
///
/// `output` covers the render window. Every codec handle is released before
/// this returns and codec errors are reported as
/// [`ReaderError::UnsupportedFootage`].
pub fn decode_frame(
    runtime: &dyn RawRuntime,
    library_dir: &Path,
    params: DecodeParameterSet,
    request: &DecodeRequest,
    output: &mut ImageBufferMut<'_>,
) -> Result<()> {
    check_request(request)?;
    let frame_index = frame_index_for_time(request.time);

    let result = run_chain(runtime, library_dir, params, request, frame_index, output);
    debug!(state = %DecodeState::Released, frame_index, "handles released");

    result.map_err(|e| {
        error!(path = %request.file.display(), frame_index, error = %e, "decode failed");
        ReaderError::UnsupportedFootage
    })
}

fn run_chain(
    runtime: &dyn RawRuntime,
    library_dir: &Path,
    params: DecodeParameterSet,
    request: &DecodeRequest,
    frame_index: u64,
    output: &mut ImageBufferMut<'_>,
) -> std::result::Result<(), ChainError> {
    debug!(state = %DecodeState::Idle, path = %request.file.display(), frame_index, "decode start");

    let factory = runtime.create_factory(library_dir).map_err(at(DecodeState::Idle))?;
    debug!(state = %DecodeState::LibraryLoaded);

    let codec = factory.create_codec().map_err(at(DecodeState::LibraryLoaded))?;
    debug!(state = %DecodeState::CodecCreated);

    let clip = codec.open_clip(&request.file).map_err(at(DecodeState::CodecCreated))?;
    debug!(state = %DecodeState::ClipOpened);

    let callback = Arc::new(DecodeCallback::new(params));
    codec
        .set_callback(Arc::clone(&callback) as Arc<dyn RawCallback>)
        .map_err(at(DecodeState::ClipOpened))?;
    debug!(state = %DecodeState::CallbackBound);

    let job = clip.create_read_job(frame_index).map_err(at(DecodeState::CallbackBound))?;
    job.submit().map_err(at(DecodeState::CallbackBound))?;
    debug!(state = %DecodeState::JobSubmitted);

    codec.flush_jobs();
    debug!(state = %DecodeState::Flushed, deliveries = callback.deliveries());

    let image = callback.slot().take().ok_or(ChainError::NoFrame(frame_index))?;

    let window = request.render_window;
    let short = ChainError::ShortImage {
        width: image.width,
        height: image.height,
        window,
    };
    // A negative origin lies outside the decoded image.
    let (Ok(x), Ok(y)) = (u32::try_from(window.x1), u32::try_from(window.y1)) else {
        return Err(short);
    };
    if x.saturating_add(output.width()) > image.width || y.saturating_add(output.height()) > image.height {
        return Err(short);
    }

    // SAFETY: the codec that owns the pixels is alive until the end of this
    // function and flush_jobs has returned, so no job is writing to them.
    let pixels = unsafe { image.as_slice() };
    let offset = (y as usize * image.width as usize + x as usize) * DECODED_CHANNELS;
    output.copy_rgb_from(pixels.get(offset..).unwrap_or(&[]), image.width)?;

    // Handles drop in reverse order: clip, codec, factory.
    Ok(())
}
