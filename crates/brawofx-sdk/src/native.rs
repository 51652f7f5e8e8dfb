//! Backend over the vendor's shared library.
//!
//! The library is loaded at runtime with `libloading`. Every interface
//! pointer we own sits in a [`ComPtr`] that calls `Release` on drop, so each
//! handle in the factory → codec → clip → job chain is released exactly once
//! on every exit path.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use libloading::Library;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::backend::{
    AttributeValue, ClipAttribute, FrameAttribute, ProcessedImage, RawCallback, RawClip, RawCodec,
    RawFactory, RawJob, RawRuntime, ReadFrame, ResolutionScale, ResourceFormat,
};
use crate::error::{SdkError, SdkResult};
use crate::ffi::{
    self, vt, ComObject, CreateFactoryFn, HResult, IBlackmagicRawCallback, IBlackmagicRawCallbackVtbl,
    IBlackmagicRawClip, IBlackmagicRawClipProcessingAttributesVtbl, IBlackmagicRawClipVtbl,
    IBlackmagicRawVtbl, IBlackmagicRawFactoryVtbl, IBlackmagicRawFrame,
    IBlackmagicRawFrameProcessingAttributesVtbl, IBlackmagicRawJob, IBlackmagicRawJobVtbl,
    IBlackmagicRawProcessedImage, IBlackmagicRawProcessedImageVtbl, IUnknownVtbl, Variant, VariantClearFn,
};
use crate::locator::Platform;
use crate::platform::{self, read_raw_str, SdkString};

fn check(call: &'static str, hr: HResult) -> SdkResult<()> {
    if ffi::succeeded(hr) {
        Ok(())
    } else {
        Err(SdkError::call(call, hr))
    }
}

/// # Safety
///
/// `raw` must be a live interface pointer.
unsafe fn vtbl_of<'a, V>(raw: *mut ComObject<V>) -> &'a V {
    &*(*raw).vtbl
}

// ---------------------------------------------------------------------------
// Owned interface pointer
// ---------------------------------------------------------------------------

/// An owned reference to a COM object, released on drop.
struct ComPtr<V> {
    raw: NonNull<ComObject<V>>,
}

impl<V> ComPtr<V> {
    /// Take ownership of a reference handed out by the codec.
    fn from_raw(call: &'static str, raw: *mut ComObject<V>) -> SdkResult<Self> {
        NonNull::new(raw)
            .map(|raw| Self { raw })
            .ok_or(SdkError::NullHandle { call })
    }

    #[inline]
    fn as_ptr(&self) -> *mut ComObject<V> {
        self.raw.as_ptr()
    }

    #[inline]
    fn vtbl(&self) -> &V {
        // SAFETY: `raw` is live for as long as we hold the reference.
        unsafe { vtbl_of(self.raw.as_ptr()) }
    }

    /// Give up ownership without releasing.
    fn into_raw(self) -> *mut ComObject<V> {
        let raw = self.raw.as_ptr();
        std::mem::forget(self);
        raw
    }
}

impl<V> Drop for ComPtr<V> {
    fn drop(&mut self) {
        // SAFETY: we own exactly one reference.
        unsafe {
            ffi::release(self.raw.as_ptr());
        }
    }
}

/// Call an out-parameter constructor and wrap the result.
fn acquire<V>(
    call: &'static str,
    create: impl FnOnce(*mut *mut ComObject<V>) -> HResult,
) -> SdkResult<ComPtr<V>> {
    let mut raw = ptr::null_mut();
    let hr = create(&mut raw);
    if !ffi::succeeded(hr) {
        if !raw.is_null() {
            // SAFETY: a failing call may still hand back a reference.
            unsafe {
                ffi::release(raw);
            }
        }
        return Err(SdkError::call(call, hr));
    }
    ComPtr::from_raw(call, raw)
}

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// Build an input variant. Text values keep their platform string alive in
/// the returned holder.
fn encode_variant(value: &AttributeValue) -> SdkResult<(Variant, Option<SdkString>)> {
    let mut variant = Variant::empty();
    let mut text = None;
    match value {
        AttributeValue::U8(v) => {
            variant.set_kind(vt::U8);
            variant.value.u8_val = *v;
        }
        AttributeValue::S16(v) => {
            variant.set_kind(vt::S16);
            variant.value.i16_val = *v;
        }
        AttributeValue::U16(v) => {
            variant.set_kind(vt::U16);
            variant.value.u16_val = *v;
        }
        AttributeValue::S32(v) => {
            variant.set_kind(vt::S32);
            variant.value.i32_val = *v;
        }
        AttributeValue::U32(v) => {
            variant.set_kind(vt::U32);
            variant.value.u32_val = *v;
        }
        AttributeValue::F32(v) => {
            variant.set_kind(vt::FLOAT32);
            variant.value.f32_val = *v;
        }
        AttributeValue::F64(v) => {
            variant.set_kind(vt::FLOAT64);
            variant.value.f64_val = *v;
        }
        AttributeValue::Text(s) => {
            let owned = SdkString::new(s)?;
            variant.set_kind(vt::STRING);
            variant.value.str_val = owned.as_raw();
            text = Some(owned);
        }
    }
    Ok((variant, text))
}

/// # Safety
///
/// `variant` must have been filled in by the codec or by [`encode_variant`].
unsafe fn decode_variant(variant: &Variant) -> SdkResult<Option<AttributeValue>> {
    let value = match variant.kind() {
        vt::EMPTY => return Ok(None),
        vt::U8 => AttributeValue::U8(variant.value.u8_val),
        vt::S16 => AttributeValue::S16(variant.value.i16_val),
        vt::U16 => AttributeValue::U16(variant.value.u16_val),
        vt::S32 => AttributeValue::S32(variant.value.i32_val),
        vt::U32 => AttributeValue::U32(variant.value.u32_val),
        vt::FLOAT32 => AttributeValue::F32(variant.value.f32_val),
        vt::FLOAT64 => AttributeValue::F64(variant.value.f64_val),
        vt::STRING => AttributeValue::Text(read_raw_str(variant.value.str_val)),
        other => {
            return Err(SdkError::UnsupportedValue(format!("variant type {other}")));
        }
    };
    Ok(Some(value))
}

fn clip_attribute_code(attribute: ClipAttribute) -> ffi::ClipProcessingAttribute {
    match attribute {
        ClipAttribute::Gamma => ffi::CLIP_ATTR_GAMMA,
        ClipAttribute::Gamut => ffi::CLIP_ATTR_GAMUT,
        ClipAttribute::ToneCurveContrast => ffi::CLIP_ATTR_TONE_CURVE_CONTRAST,
        ClipAttribute::ToneCurveSaturation => ffi::CLIP_ATTR_TONE_CURVE_SATURATION,
        ClipAttribute::ToneCurveMidpoint => ffi::CLIP_ATTR_TONE_CURVE_MIDPOINT,
        ClipAttribute::ToneCurveHighlights => ffi::CLIP_ATTR_TONE_CURVE_HIGHLIGHTS,
        ClipAttribute::ToneCurveShadows => ffi::CLIP_ATTR_TONE_CURVE_SHADOWS,
        ClipAttribute::ToneCurveVideoBlackLevel => ffi::CLIP_ATTR_TONE_CURVE_VIDEO_BLACK_LEVEL,
        ClipAttribute::HighlightRecovery => ffi::CLIP_ATTR_HIGHLIGHT_RECOVERY,
    }
}

fn frame_attribute_code(attribute: FrameAttribute) -> ffi::FrameProcessingAttribute {
    match attribute {
        FrameAttribute::WhiteBalanceKelvin => ffi::FRAME_ATTR_WHITE_BALANCE_KELVIN,
        FrameAttribute::WhiteBalanceTint => ffi::FRAME_ATTR_WHITE_BALANCE_TINT,
        FrameAttribute::Exposure => ffi::FRAME_ATTR_EXPOSURE,
        FrameAttribute::Iso => ffi::FRAME_ATTR_ISO,
    }
}

fn resolution_scale_code(scale: ResolutionScale) -> ffi::ResolutionScale {
    match scale {
        ResolutionScale::Full => ffi::RESOLUTION_SCALE_FULL,
        ResolutionScale::Half => ffi::RESOLUTION_SCALE_HALF,
        ResolutionScale::Quarter => ffi::RESOLUTION_SCALE_QUARTER,
        ResolutionScale::Eighth => ffi::RESOLUTION_SCALE_EIGHTH,
    }
}

fn resource_format_code(format: ResourceFormat) -> ffi::ResourceFormat {
    match format {
        ResourceFormat::RgbF32 => ffi::RESOURCE_FORMAT_RGB_F32,
        ResourceFormat::RgbaU8 => ffi::RESOURCE_FORMAT_RGBA_U8,
    }
}

// ---------------------------------------------------------------------------
// Runtime and factory
// ---------------------------------------------------------------------------

/// The loaded library. Dropped after every object it created.
struct CodecLibrary {
    variant_clear: Option<VariantClearFn>,
    _library: Library,
}

impl CodecLibrary {
    fn clear(&self, variant: &mut Variant) {
        if let Some(clear) = self.variant_clear {
            // SAFETY: the variant was filled in by the codec.
            unsafe {
                clear(variant);
            }
        }
    }
}

/// Loads the codec shared library from an install directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeRuntime;

impl RawRuntime for NativeRuntime {
    fn create_factory(&self, library_dir: &Path) -> SdkResult<Box<dyn RawFactory>> {
        let path = library_dir.join(Platform::current().library_file());

        // SAFETY: loading runs the library's initializers, which have no
        // preconditions beyond a sane process.
        let library = unsafe { Library::new(&path) }.map_err(|e| SdkError::LoadFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        // SAFETY: the exported symbol has this signature in every SDK release.
        let create: CreateFactoryFn = unsafe {
            *library
                .get::<CreateFactoryFn>(ffi::CREATE_FACTORY_SYMBOL)
                .map_err(|e| SdkError::SymbolNotFound(format!("CreateBlackmagicRawFactoryInstance: {e}")))?
        };

        let variant_clear = platform::system_variant_clear().or_else(|| {
            // SAFETY: as above.
            unsafe {
                library
                    .get::<VariantClearFn>(ffi::VARIANT_CLEAR_SYMBOL)
                    .ok()
                    .map(|symbol| *symbol)
            }
        });
        if variant_clear.is_none() {
            warn!("VariantClear not exported; codec strings will not be freed");
        }

        // SAFETY: `create` belongs to the library loaded above.
        let factory = ComPtr::from_raw("CreateBlackmagicRawFactoryInstance", unsafe { create() })?;
        info!(path = %path.display(), "Loaded codec library");

        Ok(Box::new(NativeFactory {
            factory,
            library: Arc::new(CodecLibrary {
                variant_clear,
                _library: library,
            }),
        }))
    }
}

struct NativeFactory {
    factory: ComPtr<IBlackmagicRawFactoryVtbl>,
    library: Arc<CodecLibrary>,
}

impl RawFactory for NativeFactory {
    fn create_codec(&self) -> SdkResult<Box<dyn RawCodec + '_>> {
        let codec = acquire("CreateCodec", |out| {
            // SAFETY: the factory is live; `out` is a valid out-parameter.
            unsafe { (self.factory.vtbl().create_codec)(self.factory.as_ptr(), out) }
        })?;
        Ok(Box::new(NativeCodec {
            codec,
            shim: Mutex::new(None),
            library: Arc::clone(&self.library),
            _factory: PhantomData,
        }))
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Field order matters: the codec is released before the shim it calls into.
struct NativeCodec<'f> {
    codec: ComPtr<IBlackmagicRawVtbl>,
    shim: Mutex<Option<Box<CallbackShim>>>,
    library: Arc<CodecLibrary>,
    _factory: PhantomData<&'f NativeFactory>,
}

impl RawCodec for NativeCodec<'_> {
    fn open_clip(&self, path: &Path) -> SdkResult<Box<dyn RawClip + '_>> {
        let name = SdkString::from_path(path)?;
        let clip = acquire("OpenClip", |out| {
            // SAFETY: `name` outlives the call.
            unsafe { (self.codec.vtbl().open_clip)(self.codec.as_ptr(), name.as_raw(), out) }
        })?;
        debug!(path = %path.display(), "Opened clip");
        Ok(Box::new(NativeClip {
            clip,
            library: &self.library,
        }))
    }

    fn set_callback(&self, callback: Arc<dyn RawCallback>) -> SdkResult<()> {
        let shim = Box::new(CallbackShim {
            vtbl: &CALLBACK_VTBL,
            callback,
            retained: Mutex::new(Vec::new()),
        });
        // SAFETY: the shim is boxed, so its address is stable until the codec
        // has been released (see field order).
        let hr = unsafe {
            (self.codec.vtbl().set_callback)(self.codec.as_ptr(), shim.as_raw())
        };
        check("SetCallback", hr)?;
        *self.shim.lock() = Some(shim);
        Ok(())
    }

    fn flush_jobs(&self) {
        // SAFETY: the codec is live.
        let hr = unsafe { (self.codec.vtbl().flush_jobs)(self.codec.as_ptr()) };
        if !ffi::succeeded(hr) {
            warn!(hresult = hr, "FlushJobs failed");
        }
    }
}

impl Drop for NativeCodec<'_> {
    fn drop(&mut self) {
        // Processed images go back to the codec while it is still alive.
        if let Some(shim) = self.shim.get_mut() {
            shim.retained.get_mut().clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Clip
// ---------------------------------------------------------------------------

struct NativeClip<'c> {
    clip: ComPtr<IBlackmagicRawClipVtbl>,
    library: &'c CodecLibrary,
}

impl NativeClip<'_> {
    /// A private copy of the clip's processing attributes.
    fn processing_attributes(&self) -> SdkResult<ComPtr<IBlackmagicRawClipProcessingAttributesVtbl>> {
        clone_clip_attributes(self.clip.as_ptr())
    }
}

fn clone_clip_attributes(
    clip: *mut IBlackmagicRawClip,
) -> SdkResult<ComPtr<IBlackmagicRawClipProcessingAttributesVtbl>> {
    acquire("CloneClipProcessingAttributes", |out| {
        // SAFETY: callers pass a live clip.
        unsafe { (vtbl_of(clip).clone_clip_processing_attributes)(clip, out) }
    })
}

impl RawClip for NativeClip<'_> {
    fn width(&self) -> SdkResult<u32> {
        let mut width = 0;
        // SAFETY: the clip is live.
        check("GetWidth", unsafe { (self.clip.vtbl().get_width)(self.clip.as_ptr(), &mut width) })?;
        Ok(width)
    }

    fn height(&self) -> SdkResult<u32> {
        let mut height = 0;
        // SAFETY: the clip is live.
        check("GetHeight", unsafe { (self.clip.vtbl().get_height)(self.clip.as_ptr(), &mut height) })?;
        Ok(height)
    }

    fn frame_rate(&self) -> SdkResult<f32> {
        let mut rate = 0.0;
        // SAFETY: the clip is live.
        check("GetFrameRate", unsafe { (self.clip.vtbl().get_frame_rate)(self.clip.as_ptr(), &mut rate) })?;
        Ok(rate)
    }

    fn frame_count(&self) -> SdkResult<u64> {
        let mut count = 0;
        // SAFETY: the clip is live.
        check("GetFrameCount", unsafe {
            (self.clip.vtbl().get_frame_count)(self.clip.as_ptr(), &mut count)
        })?;
        Ok(count)
    }

    fn clip_attribute(&self, attribute: ClipAttribute) -> SdkResult<AttributeValue> {
        let attributes = self.processing_attributes()?;
        let mut variant = Variant::empty();
        // SAFETY: `attributes` is live and `variant` is a valid out-parameter.
        check("GetClipAttribute", unsafe {
            (attributes.vtbl().get_clip_attribute)(attributes.as_ptr(), clip_attribute_code(attribute), &mut variant)
        })?;
        // SAFETY: filled in by the codec.
        let decoded = unsafe { decode_variant(&variant) };
        self.library.clear(&mut variant);
        decoded?.ok_or_else(|| SdkError::UnsupportedValue(format!("{attribute:?} has no value")))
    }

    fn clip_attribute_list(&self, attribute: ClipAttribute) -> SdkResult<Vec<AttributeValue>> {
        let attributes = self.processing_attributes()?;
        let code = clip_attribute_code(attribute);

        let mut count = 0u32;
        // SAFETY: a null array asks only for the element count.
        check("GetClipAttributeList", unsafe {
            (attributes.vtbl().get_clip_attribute_list)(
                attributes.as_ptr(),
                code,
                ptr::null_mut(),
                &mut count,
                ptr::null_mut(),
            )
        })?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut values = vec![Variant::empty(); count as usize];
        // SAFETY: `values` holds `count` variants.
        check("GetClipAttributeList", unsafe {
            (attributes.vtbl().get_clip_attribute_list)(
                attributes.as_ptr(),
                code,
                values.as_mut_ptr(),
                &mut count,
                ptr::null_mut(),
            )
        })?;
        values.truncate(count as usize);

        let decoded: SdkResult<Vec<Option<AttributeValue>>> = values
            .iter()
            // SAFETY: filled in by the codec.
            .map(|v| unsafe { decode_variant(v) })
            .collect();
        for variant in &mut values {
            self.library.clear(variant);
        }
        Ok(decoded?.into_iter().flatten().collect())
    }

    fn iso_list(&self) -> SdkResult<Vec<u32>> {
        let attributes = self.processing_attributes()?;

        let mut count = 0u32;
        // SAFETY: a null array asks only for the element count.
        check("GetISOList", unsafe {
            (attributes.vtbl().get_iso_list)(attributes.as_ptr(), ptr::null_mut(), &mut count, ptr::null_mut())
        })?;
        let mut values = vec![0u32; count as usize];
        if count > 0 {
            // SAFETY: `values` holds `count` entries.
            check("GetISOList", unsafe {
                (attributes.vtbl().get_iso_list)(
                    attributes.as_ptr(),
                    values.as_mut_ptr(),
                    &mut count,
                    ptr::null_mut(),
                )
            })?;
            values.truncate(count as usize);
        }
        Ok(values)
    }

    fn metadata(&self, key: &str) -> SdkResult<Option<AttributeValue>> {
        let key_str = SdkString::new(key)?;
        let mut variant = Variant::empty();
        // SAFETY: `key_str` outlives the call.
        let hr = unsafe { (self.clip.vtbl().get_metadata)(self.clip.as_ptr(), key_str.as_raw(), &mut variant) };
        if !ffi::succeeded(hr) {
            debug!(key, hresult = hr, "Metadata entry not available");
            return Ok(None);
        }
        // SAFETY: filled in by the codec.
        let decoded = unsafe { decode_variant(&variant) };
        self.library.clear(&mut variant);
        decoded
    }

    fn create_read_job(&self, frame_index: u64) -> SdkResult<Box<dyn RawJob + '_>> {
        let job = acquire("CreateJobReadFrame", |out| {
            // SAFETY: the clip is live.
            unsafe { (self.clip.vtbl().create_job_read_frame)(self.clip.as_ptr(), frame_index, out) }
        })?;
        let job = NativeJob::new(
            job,
            JobContext {
                clip: self.clip.as_ptr(),
                frame_index,
            },
        )?;
        Ok(Box::new(job))
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// Stored in a job's user data so completions know their origin.
struct JobContext {
    clip: *mut IBlackmagicRawClip,
    frame_index: u64,
}

struct NativeJob<'c> {
    job: Option<ComPtr<IBlackmagicRawJobVtbl>>,
    /// Owned until submission succeeds, then owned by the completion.
    context: *mut JobContext,
    _clip: PhantomData<&'c ()>,
}

impl NativeJob<'_> {
    fn new(job: ComPtr<IBlackmagicRawJobVtbl>, context: JobContext) -> SdkResult<Self> {
        let context = Box::into_raw(Box::new(context));
        let native = Self {
            job: Some(job),
            context,
            _clip: PhantomData,
        };
        if let Some(job) = &native.job {
            // SAFETY: the job is live; the context stays valid until freed
            // by `Drop` or by the completion.
            check("SetUserData", unsafe {
                (job.vtbl().set_user_data)(job.as_ptr(), context.cast::<c_void>())
            })?;
        }
        Ok(native)
    }
}

impl RawJob for NativeJob<'_> {
    fn submit(mut self: Box<Self>) -> SdkResult<()> {
        let job = self.job.take().ok_or(SdkError::NullHandle { call: "Submit" })?;
        // SAFETY: the job is live.
        let hr = unsafe { (job.vtbl().submit)(job.as_ptr()) };
        check("Submit", hr)?;
        // The completion releases the job and frees the context.
        let _ = job.into_raw();
        self.context = ptr::null_mut();
        Ok(())
    }
}

impl Drop for NativeJob<'_> {
    fn drop(&mut self) {
        if !self.context.is_null() {
            // SAFETY: the context was never handed to a completion.
            unsafe { drop(Box::from_raw(self.context)) };
        }
    }
}

/// Recover the context of a completed job.
///
/// # Safety
///
/// `job` must be null or a job created by this module.
unsafe fn take_job_context(job: *mut IBlackmagicRawJob) -> Option<Box<JobContext>> {
    if job.is_null() {
        return None;
    }
    let mut data = ptr::null_mut();
    if !ffi::succeeded((vtbl_of(job).get_user_data)(job, &mut data)) || data.is_null() {
        return None;
    }
    (vtbl_of(job).set_user_data)(job, ptr::null_mut());
    Some(Box::from_raw(data.cast::<JobContext>()))
}

// ---------------------------------------------------------------------------
// Read frame
// ---------------------------------------------------------------------------

struct NativeReadFrame {
    frame: *mut IBlackmagicRawFrame,
    clip: *mut IBlackmagicRawClip,
    frame_index: u64,
    clip_attributes: ComPtr<IBlackmagicRawClipProcessingAttributesVtbl>,
    frame_attributes: ComPtr<IBlackmagicRawFrameProcessingAttributesVtbl>,
}

impl NativeReadFrame {
    /// # Safety
    ///
    /// `frame` and `clip` must stay live for the lifetime of the value.
    unsafe fn new(frame: *mut IBlackmagicRawFrame, clip: *mut IBlackmagicRawClip, frame_index: u64) -> SdkResult<Self> {
        let clip_attributes = clone_clip_attributes(clip)?;
        let frame_attributes = acquire("CloneFrameProcessingAttributes", |out| {
            (vtbl_of(frame).clone_frame_processing_attributes)(frame, out)
        })?;
        Ok(Self {
            frame,
            clip,
            frame_index,
            clip_attributes,
            frame_attributes,
        })
    }
}

impl ReadFrame for NativeReadFrame {
    fn set_resolution_scale(&mut self, scale: ResolutionScale) -> SdkResult<()> {
        // SAFETY: the frame is live during the read completion.
        check("SetResolutionScale", unsafe {
            (vtbl_of(self.frame).set_resolution_scale)(self.frame, resolution_scale_code(scale))
        })
    }

    fn set_resource_format(&mut self, format: ResourceFormat) -> SdkResult<()> {
        // SAFETY: as above.
        check("SetResourceFormat", unsafe {
            (vtbl_of(self.frame).set_resource_format)(self.frame, resource_format_code(format))
        })
    }

    fn set_clip_attribute(&mut self, attribute: ClipAttribute, value: AttributeValue) -> SdkResult<()> {
        let (mut variant, _text) = encode_variant(&value)?;
        // SAFETY: `_text` keeps any string alive across the call.
        check("SetClipAttribute", unsafe {
            (self.clip_attributes.vtbl().set_clip_attribute)(
                self.clip_attributes.as_ptr(),
                clip_attribute_code(attribute),
                &mut variant,
            )
        })
    }

    fn set_frame_attribute(&mut self, attribute: FrameAttribute, value: AttributeValue) -> SdkResult<()> {
        let (mut variant, _text) = encode_variant(&value)?;
        // SAFETY: as above.
        check("SetFrameAttribute", unsafe {
            (self.frame_attributes.vtbl().set_frame_attribute)(
                self.frame_attributes.as_ptr(),
                frame_attribute_code(attribute),
                &mut variant,
            )
        })
    }

    fn submit_decode(&mut self) -> SdkResult<()> {
        let job = acquire("CreateJobDecodeAndProcessFrame", |out| {
            // SAFETY: frame and attribute copies are live.
            unsafe {
                (vtbl_of(self.frame).create_job_decode_and_process_frame)(
                    self.frame,
                    self.clip_attributes.as_ptr(),
                    self.frame_attributes.as_ptr(),
                    out,
                )
            }
        })?;
        let job = NativeJob::new(
            job,
            JobContext {
                clip: self.clip,
                frame_index: self.frame_index,
            },
        )?;
        Box::new(job).submit()
    }
}

// ---------------------------------------------------------------------------
// Callback shim
// ---------------------------------------------------------------------------

/// Our side of `IBlackmagicRawCallback`. `vtbl` must stay the first field.
#[repr(C)]
struct CallbackShim {
    vtbl: *const IBlackmagicRawCallbackVtbl,
    callback: Arc<dyn RawCallback>,
    /// Processed images kept alive until the codec is dropped.
    retained: Mutex<Vec<ComPtr<IBlackmagicRawProcessedImageVtbl>>>,
}

impl CallbackShim {
    fn as_raw(&self) -> *mut IBlackmagicRawCallback {
        (self as *const Self).cast_mut().cast()
    }
}

static CALLBACK_VTBL: IBlackmagicRawCallbackVtbl = IBlackmagicRawCallbackVtbl {
    base: IUnknownVtbl {
        query_interface: shim_query_interface,
        add_ref: shim_add_ref,
        release: shim_release,
    },
    read_complete: shim_read_complete,
    decode_complete: shim_decode_complete,
    process_complete: shim_process_complete,
    trim_progress: shim_trim_progress,
    trim_complete: shim_trim_complete,
    sidecar_metadata_parse_warning: shim_sidecar_warning,
    sidecar_metadata_parse_error: shim_sidecar_error,
    prepare_pipeline_complete: shim_prepare_pipeline_complete,
};

/// Run `f` without letting a panic unwind into the codec.
fn guarded(what: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(callback = what, "Completion callback panicked");
    }
}

unsafe extern "system" fn shim_query_interface(
    _this: *mut c_void,
    _iid: *const ffi::Guid,
    out: *mut *mut c_void,
) -> HResult {
    if !out.is_null() {
        *out = ptr::null_mut();
    }
    ffi::E_NOTIMPL
}

// The shim's lifetime is tied to the codec, not to COM reference counts.
unsafe extern "system" fn shim_add_ref(_this: *mut c_void) -> u32 {
    0
}

unsafe extern "system" fn shim_release(_this: *mut c_void) -> u32 {
    0
}

unsafe extern "system" fn shim_read_complete(
    this: *mut IBlackmagicRawCallback,
    job: *mut IBlackmagicRawJob,
    result: HResult,
    frame: *mut IBlackmagicRawFrame,
) {
    let shim = &*(this as *const CallbackShim);
    let context = take_job_context(job);
    guarded("ReadComplete", || {
        let frame_index = context.as_ref().map_or(0, |c| c.frame_index);
        let outcome = if !ffi::succeeded(result) {
            Err(SdkError::call("ReadComplete", result))
        } else if frame.is_null() {
            Err(SdkError::NullHandle { call: "ReadComplete" })
        } else if let Some(context) = &context {
            NativeReadFrame::new(frame, context.clip, frame_index)
        } else {
            Err(SdkError::NullHandle { call: "GetUserData" })
        };
        match outcome {
            Ok(mut read_frame) => shim.callback.read_complete(frame_index, Ok(&mut read_frame)),
            Err(e) => shim.callback.read_complete(frame_index, Err(e)),
        }
    });
    if !job.is_null() {
        ffi::release(job);
    }
}

unsafe extern "system" fn shim_decode_complete(
    _this: *mut IBlackmagicRawCallback,
    _job: *mut IBlackmagicRawJob,
    result: HResult,
) {
    if !ffi::succeeded(result) {
        warn!(hresult = result, "Decode failed");
    }
}

/// # Safety
///
/// `image` must be a live processed image.
unsafe fn describe_image(image: *mut IBlackmagicRawProcessedImage) -> SdkResult<ProcessedImage> {
    let vtbl = vtbl_of(image);
    let mut width = 0;
    let mut height = 0;
    let mut resource = ptr::null_mut();
    let mut size_bytes = 0u32;
    check("GetWidth", (vtbl.get_width)(image, &mut width))?;
    check("GetHeight", (vtbl.get_height)(image, &mut height))?;
    check("GetResource", (vtbl.get_resource)(image, &mut resource))?;
    check("GetResourceSizeBytes", (vtbl.get_resource_size_bytes)(image, &mut size_bytes))?;
    Ok(ProcessedImage {
        data: resource.cast::<f32>().cast_const(),
        width,
        height,
        size_bytes: size_bytes as usize,
    })
}

unsafe extern "system" fn shim_process_complete(
    this: *mut IBlackmagicRawCallback,
    job: *mut IBlackmagicRawJob,
    result: HResult,
    image: *mut IBlackmagicRawProcessedImage,
) {
    let shim = &*(this as *const CallbackShim);
    let context = take_job_context(job);
    guarded("ProcessComplete", || {
        let frame_index = context.as_ref().map_or(0, |c| c.frame_index);
        let outcome = if !ffi::succeeded(result) {
            Err(SdkError::call("ProcessComplete", result))
        } else if image.is_null() {
            Err(SdkError::NullHandle { call: "ProcessComplete" })
        } else {
            describe_image(image)
        };
        if outcome.is_ok() {
            ffi::add_ref(image);
            if let Ok(held) = ComPtr::from_raw("ProcessComplete", image) {
                shim.retained.lock().push(held);
            }
        }
        shim.callback.process_complete(frame_index, outcome);
    });
    if !job.is_null() {
        ffi::release(job);
    }
}

unsafe extern "system" fn shim_trim_progress(
    _this: *mut IBlackmagicRawCallback,
    _job: *mut IBlackmagicRawJob,
    _progress: f32,
) {
}

unsafe extern "system" fn shim_trim_complete(
    _this: *mut IBlackmagicRawCallback,
    _job: *mut IBlackmagicRawJob,
    _result: HResult,
) {
}

unsafe extern "system" fn shim_sidecar_warning(
    _this: *mut IBlackmagicRawCallback,
    _clip: *mut IBlackmagicRawClip,
    file_name: ffi::RawStr,
    line_number: u32,
    info: ffi::RawStr,
) {
    warn!(
        file = %read_raw_str(file_name),
        line = line_number,
        info = %read_raw_str(info),
        "Sidecar metadata warning"
    );
}

unsafe extern "system" fn shim_sidecar_error(
    _this: *mut IBlackmagicRawCallback,
    _clip: *mut IBlackmagicRawClip,
    file_name: ffi::RawStr,
    line_number: u32,
    info: ffi::RawStr,
) {
    error!(
        file = %read_raw_str(file_name),
        line = line_number,
        info = %read_raw_str(info),
        "Sidecar metadata error"
    );
}

unsafe extern "system" fn shim_prepare_pipeline_complete(
    _this: *mut IBlackmagicRawCallback,
    _user_data: *mut c_void,
    _result: HResult,
) {
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_variant_round_trip() {
        for value in [
            AttributeValue::U16(1),
            AttributeValue::S32(-40),
            AttributeValue::F32(0.5),
            AttributeValue::F64(2.25),
        ] {
            let (variant, text) = encode_variant(&value).unwrap();
            assert!(text.is_none());
            let decoded = unsafe { decode_variant(&variant) }.unwrap();
            assert_eq!(decoded, Some(value));
        }
    }

    #[test]
    fn test_text_variant_keeps_string_alive() {
        let value = AttributeValue::Text("Blackmagic Design Film".into());
        let (variant, text) = encode_variant(&value).unwrap();
        assert!(text.is_some());
        let decoded = unsafe { decode_variant(&variant) }.unwrap();
        assert_eq!(decoded, Some(value));
    }

    #[test]
    fn test_empty_variant_decodes_to_none() {
        let variant = Variant::empty();
        assert_eq!(unsafe { decode_variant(&variant) }.unwrap(), None);
    }

    #[test]
    fn test_attribute_codes() {
        assert_eq!(clip_attribute_code(ClipAttribute::Gamma), ffi::fourcc(b"gama"));
        assert_eq!(frame_attribute_code(FrameAttribute::Iso), ffi::fourcc(b"fiso"));
        assert_eq!(resolution_scale_code(ResolutionScale::Quarter), ffi::fourcc(b"qrtr"));
    }

    #[test]
    fn test_resource_format_codes_match_sdk() {
        assert_eq!(resource_format_code(ResourceFormat::RgbF32), 0x6633_3273);
        assert_eq!(resource_format_code(ResourceFormat::RgbaU8), 0x7267_6261);
    }

    #[test]
    fn test_missing_library_fails_to_load() {
        let tmp = tempfile::tempdir().unwrap();
        match NativeRuntime.create_factory(tmp.path()) {
            Err(SdkError::LoadFailed { path, .. }) => assert!(path.starts_with(tmp.path())),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("loaded a library from an empty directory"),
        }
    }
}
