//! In-process codec for tests.
//!
//! Clips are registered by path as [`StubClip`] fixtures. Every handle the
//! stub hands out is counted in a ledger on acquisition and on release, and
//! any acquisition step can be made to fail. Submitted jobs go onto a
//! `crossbeam-channel` queue that `flush_jobs` drains on a worker thread, so
//! completions run off the caller's thread and finish before flush returns.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::debug;

use crate::backend::{
    AttributeValue, ClipAttribute, FrameAttribute, ProcessedImage, RawCallback, RawClip, RawCodec,
    RawFactory, RawJob, RawRuntime, ReadFrame, ResolutionScale, ResourceFormat,
};
use crate::error::{SdkError, SdkResult};
use crate::ffi::E_FAIL;

/// Handle kinds tracked by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Factory,
    Codec,
    Clip,
    Job,
}

/// Step at which the stub reports failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    CreateFactory,
    CreateCodec,
    OpenClip,
    SetCallback,
    CreateJob,
    SubmitJob,
    /// The read completion reports an error.
    ReadComplete,
    /// Creating or submitting the decode-and-process job fails.
    SubmitDecode,
    /// The process completion reports an error.
    ProcessComplete,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HandleCounts {
    pub acquired: usize,
    pub released: usize,
}

impl HandleCounts {
    #[inline]
    pub fn outstanding(&self) -> isize {
        self.acquired as isize - self.released as isize
    }
}

/// Point-in-time copy of the ledger.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LedgerSnapshot {
    counts: HashMap<HandleKind, HandleCounts>,
}

impl LedgerSnapshot {
    pub fn counts(&self, kind: HandleKind) -> HandleCounts {
        self.counts.get(&kind).copied().unwrap_or_default()
    }

    pub fn acquired(&self, kind: HandleKind) -> usize {
        self.counts(kind).acquired
    }

    pub fn released(&self, kind: HandleKind) -> usize {
        self.counts(kind).released
    }

    /// Every acquired handle was released exactly once.
    pub fn is_balanced(&self) -> bool {
        self.counts.values().all(|c| c.acquired == c.released)
    }
}

/// Attributes a read completion applied before submitting its decode.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedDecode {
    pub frame_index: u64,
    pub resolution_scale: ResolutionScale,
    pub resource_format: ResourceFormat,
    pub clip_attributes: Vec<(ClipAttribute, AttributeValue)>,
    pub frame_attributes: Vec<(FrameAttribute, AttributeValue)>,
}

impl AppliedDecode {
    pub fn clip_attribute(&self, attribute: ClipAttribute) -> Option<&AttributeValue> {
        self.clip_attributes.iter().rev().find(|(a, _)| *a == attribute).map(|(_, v)| v)
    }

    pub fn frame_attribute(&self, attribute: FrameAttribute) -> Option<&AttributeValue> {
        self.frame_attributes.iter().rev().find(|(a, _)| *a == attribute).map(|(_, v)| v)
    }
}

/// A clip as the stub codec sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct StubClip {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f32,
    pub frame_count: u64,
    pub iso_list: Vec<u32>,
    pub clip_attributes: HashMap<ClipAttribute, AttributeValue>,
    pub attribute_lists: HashMap<ClipAttribute, Vec<AttributeValue>>,
    pub metadata: HashMap<String, AttributeValue>,
    /// Geometry queries fail, as they would for a damaged file.
    pub corrupt: bool,
}

impl StubClip {
    /// A clip with realistic defaults for a camera-original file.
    pub fn new(width: u32, height: u32) -> Self {
        let text = |s: &str| AttributeValue::Text(s.to_string());
        let clip_attributes = HashMap::from([
            (ClipAttribute::Gamma, text("Blackmagic Design Film")),
            (ClipAttribute::Gamut, text("Blackmagic Design")),
            (ClipAttribute::ToneCurveContrast, AttributeValue::F32(1.0)),
            (ClipAttribute::ToneCurveSaturation, AttributeValue::F32(1.0)),
            (ClipAttribute::ToneCurveMidpoint, AttributeValue::F32(0.38)),
            (ClipAttribute::ToneCurveHighlights, AttributeValue::F32(1.0)),
            (ClipAttribute::ToneCurveShadows, AttributeValue::F32(1.0)),
            (ClipAttribute::ToneCurveVideoBlackLevel, AttributeValue::U16(0)),
            (ClipAttribute::HighlightRecovery, AttributeValue::U16(0)),
        ]);
        let attribute_lists = HashMap::from([
            (
                ClipAttribute::Gamma,
                vec![
                    text("Blackmagic Design Film"),
                    text("Blackmagic Design Extended Video"),
                    text("Blackmagic Design Custom"),
                    text("Rec.709"),
                ],
            ),
            (
                ClipAttribute::Gamut,
                vec![text("Blackmagic Design"), text("Rec.709"), text("Rec.2020")],
            ),
        ]);
        let metadata = HashMap::from([
            ("white_balance_kelvin".to_string(), AttributeValue::U32(5600)),
            ("white_balance_tint".to_string(), AttributeValue::S16(10)),
            ("exposure".to_string(), AttributeValue::F32(0.0)),
            ("iso".to_string(), AttributeValue::U32(400)),
        ]);
        Self {
            width,
            height,
            frame_rate: 24.0,
            frame_count: 120,
            iso_list: vec![200, 400, 800, 1600, 3200],
            clip_attributes,
            attribute_lists,
            metadata,
            corrupt: false,
        }
    }

    /// A clip that opens but cannot be introspected.
    pub fn corrupt() -> Self {
        Self {
            corrupt: true,
            ..Self::new(0, 0)
        }
    }

    pub fn with_frames(mut self, frame_count: u64, frame_rate: f32) -> Self {
        self.frame_count = frame_count;
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_clip_attribute(mut self, attribute: ClipAttribute, value: AttributeValue) -> Self {
        self.clip_attributes.insert(attribute, value);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: AttributeValue) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Pixel value produced for `(x, y, channel)` of `frame_index` by the
/// `generation`-th delivery of a decode.
pub fn stub_pixel(frame_index: u64, generation: usize, x: u32, y: u32, channel: usize) -> f32 {
    let seed = frame_index * 7 + generation as u64 * 1009 + y as u64 * 131 + x as u64 * 3 + channel as u64;
    (seed % 65_536) as f32
}

#[derive(Default)]
struct StubState {
    clips: Mutex<HashMap<PathBuf, StubClip>>,
    failure: Mutex<Option<FailurePoint>>,
    deliveries: Mutex<usize>,
    ledger: Mutex<HashMap<HandleKind, HandleCounts>>,
    applied: Mutex<Vec<AppliedDecode>>,
    callback_threads: Mutex<Vec<ThreadId>>,
}

impl StubState {
    fn fails_at(&self, point: FailurePoint) -> bool {
        *self.failure.lock() == Some(point)
    }

    fn acquire(&self, kind: HandleKind) {
        self.ledger.lock().entry(kind).or_default().acquired += 1;
    }

    fn release(&self, kind: HandleKind) {
        self.ledger.lock().entry(kind).or_default().released += 1;
    }
}

/// Entry point of the stub codec. Clones share state.
#[derive(Clone)]
pub struct StubRuntime {
    state: Arc<StubState>,
}

impl Default for StubRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl StubRuntime {
    /// A runtime that delivers one processed image per decode.
    pub fn new() -> Self {
        let state = StubState {
            deliveries: Mutex::new(1),
            ..Default::default()
        };
        Self { state: Arc::new(state) }
    }

    pub fn with_clip(self, path: impl Into<PathBuf>, clip: StubClip) -> Self {
        self.add_clip(path, clip);
        self
    }

    pub fn add_clip(&self, path: impl Into<PathBuf>, clip: StubClip) {
        self.state.clips.lock().insert(path.into(), clip);
    }

    /// Fail at `point` from now on. `None` clears it.
    pub fn fail_at(&self, point: Option<FailurePoint>) {
        *self.state.failure.lock() = point;
    }

    /// Number of processed images each decode delivers.
    pub fn set_deliveries(&self, count: usize) {
        *self.state.deliveries.lock() = count;
    }

    pub fn ledger(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            counts: self.state.ledger.lock().clone(),
        }
    }

    /// Every decode submitted so far, in order.
    pub fn applied(&self) -> Vec<AppliedDecode> {
        self.state.applied.lock().clone()
    }

    /// Threads completions ran on.
    pub fn callback_threads(&self) -> Vec<ThreadId> {
        self.state.callback_threads.lock().clone()
    }
}

impl RawRuntime for StubRuntime {
    fn create_factory(&self, library_dir: &Path) -> SdkResult<Box<dyn RawFactory>> {
        if self.state.fails_at(FailurePoint::CreateFactory) {
            return Err(SdkError::NullHandle {
                call: "CreateBlackmagicRawFactoryInstance",
            });
        }
        debug!(path = %library_dir.display(), "Stub factory created");
        self.state.acquire(HandleKind::Factory);
        Ok(Box::new(StubFactory {
            state: Arc::clone(&self.state),
        }))
    }
}

struct StubFactory {
    state: Arc<StubState>,
}

impl Drop for StubFactory {
    fn drop(&mut self) {
        self.state.release(HandleKind::Factory);
    }
}

impl RawFactory for StubFactory {
    fn create_codec(&self) -> SdkResult<Box<dyn RawCodec + '_>> {
        if self.state.fails_at(FailurePoint::CreateCodec) {
            return Err(SdkError::call("CreateCodec", E_FAIL));
        }
        self.state.acquire(HandleKind::Codec);
        let (queue_tx, queue_rx) = crossbeam_channel::unbounded();
        Ok(Box::new(StubCodec {
            state: Arc::clone(&self.state),
            queue_tx,
            queue_rx,
            callback: Mutex::new(None),
            buffers: Mutex::new(Vec::new()),
            _factory: PhantomData,
        }))
    }
}

enum QueuedJob {
    Read {
        clip: StubClip,
        frame_index: u64,
    },
    Decode {
        frame_index: u64,
        width: u32,
        height: u32,
        format: ResourceFormat,
    },
}

struct StubCodec<'f> {
    state: Arc<StubState>,
    queue_tx: Sender<QueuedJob>,
    queue_rx: Receiver<QueuedJob>,
    callback: Mutex<Option<Arc<dyn RawCallback>>>,
    /// Processed images, freed with the codec.
    buffers: Mutex<Vec<Box<[f32]>>>,
    _factory: PhantomData<&'f StubFactory>,
}

impl Drop for StubCodec<'_> {
    fn drop(&mut self) {
        self.state.release(HandleKind::Codec);
    }
}

impl StubCodec<'_> {
    fn run(&self, job: QueuedJob, callback: Option<&Arc<dyn RawCallback>>) {
        let Some(callback) = callback else {
            self.state.release(HandleKind::Job);
            return;
        };
        match job {
            QueuedJob::Read { clip, frame_index } => {
                if self.state.fails_at(FailurePoint::ReadComplete) {
                    callback.read_complete(frame_index, Err(SdkError::call("ReadComplete", E_FAIL)));
                } else {
                    let mut frame = StubReadFrame {
                        codec: self,
                        clip,
                        applied: AppliedDecode {
                            frame_index,
                            resolution_scale: ResolutionScale::Full,
                            resource_format: ResourceFormat::RgbaU8,
                            clip_attributes: Vec::new(),
                            frame_attributes: Vec::new(),
                        },
                    };
                    callback.read_complete(frame_index, Ok(&mut frame));
                }
            }
            QueuedJob::Decode {
                frame_index,
                width,
                height,
                format,
            } => {
                if self.state.fails_at(FailurePoint::ProcessComplete) {
                    callback.process_complete(frame_index, Err(SdkError::call("ProcessComplete", E_FAIL)));
                } else if format != ResourceFormat::RgbF32 {
                    callback.process_complete(
                        frame_index,
                        Err(SdkError::UnsupportedValue(format!("stub cannot produce {format:?}"))),
                    );
                } else {
                    let deliveries = *self.state.deliveries.lock();
                    for generation in 0..deliveries {
                        let image = self.render(frame_index, generation, width, height);
                        callback.process_complete(frame_index, Ok(image));
                    }
                }
            }
        }
        self.state.release(HandleKind::Job);
    }

    fn render(&self, frame_index: u64, generation: usize, width: u32, height: u32) -> ProcessedImage {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                for channel in 0..3 {
                    pixels.push(stub_pixel(frame_index, generation, x, y, channel));
                }
            }
        }
        let pixels = pixels.into_boxed_slice();
        let image = ProcessedImage {
            data: pixels.as_ptr(),
            width,
            height,
            size_bytes: std::mem::size_of_val(&*pixels),
        };
        // The boxed slice does not move when the vector grows.
        self.buffers.lock().push(pixels);
        image
    }
}

impl RawCodec for StubCodec<'_> {
    fn open_clip(&self, path: &Path) -> SdkResult<Box<dyn RawClip + '_>> {
        if self.state.fails_at(FailurePoint::OpenClip) {
            return Err(SdkError::call("OpenClip", E_FAIL));
        }
        let clip = self
            .state
            .clips
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| SdkError::NotFound(path.to_path_buf()))?;
        self.state.acquire(HandleKind::Clip);
        Ok(Box::new(StubClipHandle { codec: self, clip }))
    }

    fn set_callback(&self, callback: Arc<dyn RawCallback>) -> SdkResult<()> {
        if self.state.fails_at(FailurePoint::SetCallback) {
            return Err(SdkError::call("SetCallback", E_FAIL));
        }
        *self.callback.lock() = Some(callback);
        Ok(())
    }

    fn flush_jobs(&self) {
        let callback = self.callback.lock().clone();
        thread::scope(|scope| {
            scope.spawn(|| {
                self.state.callback_threads.lock().push(thread::current().id());
                // Jobs queued by completions are drained in the same pass.
                while let Ok(job) = self.queue_rx.try_recv() {
                    self.run(job, callback.as_ref());
                }
            });
        });
    }
}

struct StubClipHandle<'c> {
    codec: &'c StubCodec<'c>,
    clip: StubClip,
}

impl Drop for StubClipHandle<'_> {
    fn drop(&mut self) {
        self.codec.state.release(HandleKind::Clip);
    }
}

impl StubClipHandle<'_> {
    fn readable(&self, call: &'static str) -> SdkResult<()> {
        if self.clip.corrupt {
            Err(SdkError::call(call, E_FAIL))
        } else {
            Ok(())
        }
    }
}

impl RawClip for StubClipHandle<'_> {
    fn width(&self) -> SdkResult<u32> {
        self.readable("GetWidth")?;
        Ok(self.clip.width)
    }

    fn height(&self) -> SdkResult<u32> {
        self.readable("GetHeight")?;
        Ok(self.clip.height)
    }

    fn frame_rate(&self) -> SdkResult<f32> {
        self.readable("GetFrameRate")?;
        Ok(self.clip.frame_rate)
    }

    fn frame_count(&self) -> SdkResult<u64> {
        self.readable("GetFrameCount")?;
        Ok(self.clip.frame_count)
    }

    fn clip_attribute(&self, attribute: ClipAttribute) -> SdkResult<AttributeValue> {
        self.readable("GetClipAttribute")?;
        self.clip
            .clip_attributes
            .get(&attribute)
            .cloned()
            .ok_or_else(|| SdkError::UnsupportedValue(format!("{attribute:?} has no value")))
    }

    fn clip_attribute_list(&self, attribute: ClipAttribute) -> SdkResult<Vec<AttributeValue>> {
        self.readable("GetClipAttributeList")?;
        Ok(self.clip.attribute_lists.get(&attribute).cloned().unwrap_or_default())
    }

    fn iso_list(&self) -> SdkResult<Vec<u32>> {
        self.readable("GetISOList")?;
        Ok(self.clip.iso_list.clone())
    }

    fn metadata(&self, key: &str) -> SdkResult<Option<AttributeValue>> {
        self.readable("GetMetadata")?;
        Ok(self.clip.metadata.get(key).cloned())
    }

    fn create_read_job(&self, frame_index: u64) -> SdkResult<Box<dyn RawJob + '_>> {
        if self.codec.state.fails_at(FailurePoint::CreateJob) {
            return Err(SdkError::call("CreateJobReadFrame", E_FAIL));
        }
        self.codec.state.acquire(HandleKind::Job);
        Ok(Box::new(StubJob {
            codec: self.codec,
            job: Some(QueuedJob::Read {
                clip: self.clip.clone(),
                frame_index,
            }),
        }))
    }
}

/// An unsubmitted job. Dropping it unsubmitted releases it.
struct StubJob<'c> {
    codec: &'c StubCodec<'c>,
    job: Option<QueuedJob>,
}

impl Drop for StubJob<'_> {
    fn drop(&mut self) {
        if self.job.is_some() {
            self.codec.state.release(HandleKind::Job);
        }
    }
}

impl RawJob for StubJob<'_> {
    fn submit(mut self: Box<Self>) -> SdkResult<()> {
        if self.codec.state.fails_at(FailurePoint::SubmitJob) {
            return Err(SdkError::call("Submit", E_FAIL));
        }
        if let Some(job) = self.job.take() {
            if self.codec.queue_tx.send(job).is_err() {
                // The receiver lives in the codec, so this only happens mid-drop.
                self.codec.state.release(HandleKind::Job);
                return Err(SdkError::call("Submit", E_FAIL));
            }
        }
        Ok(())
    }
}

struct StubReadFrame<'c> {
    codec: &'c StubCodec<'c>,
    clip: StubClip,
    applied: AppliedDecode,
}

impl ReadFrame for StubReadFrame<'_> {
    fn set_resolution_scale(&mut self, scale: ResolutionScale) -> SdkResult<()> {
        self.applied.resolution_scale = scale;
        Ok(())
    }

    fn set_resource_format(&mut self, format: ResourceFormat) -> SdkResult<()> {
        self.applied.resource_format = format;
        Ok(())
    }

    fn set_clip_attribute(&mut self, attribute: ClipAttribute, value: AttributeValue) -> SdkResult<()> {
        self.applied.clip_attributes.push((attribute, value));
        Ok(())
    }

    fn set_frame_attribute(&mut self, attribute: FrameAttribute, value: AttributeValue) -> SdkResult<()> {
        self.applied.frame_attributes.push((attribute, value));
        Ok(())
    }

    fn submit_decode(&mut self) -> SdkResult<()> {
        if self.codec.state.fails_at(FailurePoint::SubmitDecode) {
            return Err(SdkError::call("CreateJobDecodeAndProcessFrame", E_FAIL));
        }
        let divisor = self.applied.resolution_scale.divisor();
        let job = QueuedJob::Decode {
            frame_index: self.applied.frame_index,
            width: self.clip.width / divisor,
            height: self.clip.height / divisor,
            format: self.applied.resource_format,
        };
        self.codec.state.acquire(HandleKind::Job);
        self.codec.state.applied.lock().push(self.applied.clone());
        if self.codec.queue_tx.send(job).is_err() {
            self.codec.state.release(HandleKind::Job);
            return Err(SdkError::call("Submit", E_FAIL));
        }
        Ok(())
    }
}
