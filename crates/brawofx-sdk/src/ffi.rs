//! Raw FFI declarations for the Blackmagic RAW API.
//!
//! The codec exposes COM-style interfaces: every object begins with a
//! pointer to a vtable whose first three slots are `QueryInterface`,
//! `AddRef` and `Release`. Only the interfaces and slots this crate calls
//! are typed; untyped slots are kept as `usize` to preserve the layout.
//!
//! Reference: Blackmagic RAW SDK -- `BlackmagicRawAPI.h`.

#![allow(non_camel_case_types)]

use std::ffi::c_void;

// ---------------------------------------------------------------------------
// Status codes
// ---------------------------------------------------------------------------

pub type HResult = i32;

pub const S_OK: HResult = 0;
pub const S_FALSE: HResult = 1;
pub const E_NOTIMPL: HResult = 0x8000_4001_u32 as i32;
pub const E_FAIL: HResult = 0x8000_4005_u32 as i32;

#[inline]
pub fn succeeded(hr: HResult) -> bool {
    hr >= 0
}

// ---------------------------------------------------------------------------
// Platform string type (`BSTR` in the SDK headers)
// ---------------------------------------------------------------------------

/// UTF-16 `BSTR`.
#[cfg(target_os = "windows")]
pub type RawStr = *mut u16;

/// `CFStringRef`.
#[cfg(target_os = "macos")]
pub type RawStr = *const c_void;

/// NUL-terminated UTF-8.
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub type RawStr = *const std::ffi::c_char;

// ---------------------------------------------------------------------------
// Four-character codes
// ---------------------------------------------------------------------------

pub const fn fourcc(code: &[u8; 4]) -> u32 {
    ((code[0] as u32) << 24) | ((code[1] as u32) << 16) | ((code[2] as u32) << 8) | code[3] as u32
}

pub type ClipProcessingAttribute = u32;
pub const CLIP_ATTR_GAMMA: ClipProcessingAttribute = fourcc(b"gama");
pub const CLIP_ATTR_GAMUT: ClipProcessingAttribute = fourcc(b"gmut");
pub const CLIP_ATTR_TONE_CURVE_CONTRAST: ClipProcessingAttribute = fourcc(b"tcon");
pub const CLIP_ATTR_TONE_CURVE_SATURATION: ClipProcessingAttribute = fourcc(b"tsat");
pub const CLIP_ATTR_TONE_CURVE_MIDPOINT: ClipProcessingAttribute = fourcc(b"tmid");
pub const CLIP_ATTR_TONE_CURVE_HIGHLIGHTS: ClipProcessingAttribute = fourcc(b"thih");
pub const CLIP_ATTR_TONE_CURVE_SHADOWS: ClipProcessingAttribute = fourcc(b"tsha");
pub const CLIP_ATTR_TONE_CURVE_VIDEO_BLACK_LEVEL: ClipProcessingAttribute = fourcc(b"tvbl");
pub const CLIP_ATTR_HIGHLIGHT_RECOVERY: ClipProcessingAttribute = fourcc(b"hlry");

pub type FrameProcessingAttribute = u32;
pub const FRAME_ATTR_WHITE_BALANCE_KELVIN: FrameProcessingAttribute = fourcc(b"wbkv");
pub const FRAME_ATTR_WHITE_BALANCE_TINT: FrameProcessingAttribute = fourcc(b"wbtn");
pub const FRAME_ATTR_EXPOSURE: FrameProcessingAttribute = fourcc(b"expo");
pub const FRAME_ATTR_ISO: FrameProcessingAttribute = fourcc(b"fiso");

pub type ResolutionScale = u32;
pub const RESOLUTION_SCALE_FULL: ResolutionScale = fourcc(b"full");
pub const RESOLUTION_SCALE_HALF: ResolutionScale = fourcc(b"half");
pub const RESOLUTION_SCALE_QUARTER: ResolutionScale = fourcc(b"qrtr");
pub const RESOLUTION_SCALE_EIGHTH: ResolutionScale = fourcc(b"eith");

pub type ResourceFormat = u32;
pub const RESOURCE_FORMAT_RGBA_U8: ResourceFormat = fourcc(b"rgba");
pub const RESOURCE_FORMAT_RGB_F32: ResourceFormat = fourcc(b"f32s");

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

#[cfg(not(target_os = "windows"))]
pub mod vt {
    pub const EMPTY: u32 = 0;
    pub const U8: u32 = 1;
    pub const S16: u32 = 2;
    pub const U16: u32 = 3;
    pub const S32: u32 = 4;
    pub const U32: u32 = 5;
    pub const FLOAT32: u32 = 6;
    pub const STRING: u32 = 7;
    pub const SAFE_ARRAY: u32 = 8;
    pub const FLOAT64: u32 = 9;
}

/// COM `VARTYPE` values.
#[cfg(target_os = "windows")]
pub mod vt {
    pub const EMPTY: u32 = 0;
    pub const S16: u32 = 2;
    pub const S32: u32 = 3;
    pub const FLOAT32: u32 = 4;
    pub const FLOAT64: u32 = 5;
    pub const STRING: u32 = 8;
    pub const U8: u32 = 17;
    pub const U16: u32 = 18;
    pub const U32: u32 = 19;
    pub const SAFE_ARRAY: u32 = 0x2000;
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union VariantValue {
    pub u8_val: u8,
    pub i16_val: i16,
    pub u16_val: u16,
    pub i32_val: i32,
    pub u32_val: u32,
    pub f32_val: f32,
    pub f64_val: f64,
    pub str_val: RawStr,
    pub array_val: *mut c_void,
    /// `VARIANT`'s union is two pointers wide.
    #[cfg(target_os = "windows")]
    _record: [usize; 2],
}

#[cfg(not(target_os = "windows"))]
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Variant {
    pub vt: u32,
    pub value: VariantValue,
}

#[cfg(target_os = "windows")]
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Variant {
    pub vt: u16,
    _reserved: [u16; 3],
    pub value: VariantValue,
}

impl Variant {
    pub fn empty() -> Self {
        // SAFETY: all-zero is a valid empty variant on every platform.
        unsafe { std::mem::zeroed() }
    }

    #[inline]
    pub fn kind(&self) -> u32 {
        self.vt as u32
    }

    #[inline]
    pub fn set_kind(&mut self, kind: u32) {
        #[cfg(target_os = "windows")]
        {
            self.vt = kind as u16;
        }
        #[cfg(not(target_os = "windows"))]
        {
            self.vt = kind;
        }
    }
}

// ---------------------------------------------------------------------------
// Interfaces
// ---------------------------------------------------------------------------

/// 16-byte interface identifier.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Guid {
    pub bytes: [u8; 16],
}

pub type QueryInterfaceFn =
    unsafe extern "system" fn(this: *mut c_void, iid: *const Guid, out: *mut *mut c_void) -> HResult;
pub type AddRefFn = unsafe extern "system" fn(this: *mut c_void) -> u32;
pub type ReleaseFn = unsafe extern "system" fn(this: *mut c_void) -> u32;

#[repr(C)]
pub struct IUnknownVtbl {
    pub query_interface: QueryInterfaceFn,
    pub add_ref: AddRefFn,
    pub release: ReleaseFn,
}

/// Every interface pointer points at one of these.
#[repr(C)]
pub struct ComObject<V> {
    pub vtbl: *const V,
}

#[repr(C)]
pub struct IBlackmagicRawFactoryVtbl {
    pub base: IUnknownVtbl,
    pub create_codec:
        unsafe extern "system" fn(this: *mut IBlackmagicRawFactory, codec: *mut *mut IBlackmagicRaw) -> HResult,
    _create_pipeline_iterator: usize,
    _create_pipeline_device_iterator: usize,
}
pub type IBlackmagicRawFactory = ComObject<IBlackmagicRawFactoryVtbl>;

#[repr(C)]
pub struct IBlackmagicRawVtbl {
    pub base: IUnknownVtbl,
    pub open_clip: unsafe extern "system" fn(
        this: *mut IBlackmagicRaw,
        file_name: RawStr,
        clip: *mut *mut IBlackmagicRawClip,
    ) -> HResult,
    pub set_callback:
        unsafe extern "system" fn(this: *mut IBlackmagicRaw, callback: *mut IBlackmagicRawCallback) -> HResult,
    _prepare_pipeline: usize,
    _prepare_pipeline_for_device: usize,
    pub flush_jobs: unsafe extern "system" fn(this: *mut IBlackmagicRaw) -> HResult,
}
pub type IBlackmagicRaw = ComObject<IBlackmagicRawVtbl>;

#[repr(C)]
pub struct IBlackmagicRawClipVtbl {
    pub base: IUnknownVtbl,
    pub get_width: unsafe extern "system" fn(this: *mut IBlackmagicRawClip, width: *mut u32) -> HResult,
    pub get_height: unsafe extern "system" fn(this: *mut IBlackmagicRawClip, height: *mut u32) -> HResult,
    pub get_frame_rate: unsafe extern "system" fn(this: *mut IBlackmagicRawClip, rate: *mut f32) -> HResult,
    pub get_frame_count: unsafe extern "system" fn(this: *mut IBlackmagicRawClip, count: *mut u64) -> HResult,
    _get_timecode_for_frame: usize,
    _get_metadata_iterator: usize,
    pub get_metadata: unsafe extern "system" fn(
        this: *mut IBlackmagicRawClip,
        key: RawStr,
        value: *mut Variant,
    ) -> HResult,
    _set_metadata: usize,
    _get_camera_type: usize,
    pub clone_clip_processing_attributes: unsafe extern "system" fn(
        this: *mut IBlackmagicRawClip,
        attributes: *mut *mut IBlackmagicRawClipProcessingAttributes,
    ) -> HResult,
    _get_multicard_file_count: usize,
    _is_multicard_file_present: usize,
    _get_sidecar_file_attached: usize,
    _save_sidecar_file: usize,
    _reload_sidecar_file: usize,
    pub create_job_read_frame: unsafe extern "system" fn(
        this: *mut IBlackmagicRawClip,
        frame_index: u64,
        job: *mut *mut IBlackmagicRawJob,
    ) -> HResult,
}
pub type IBlackmagicRawClip = ComObject<IBlackmagicRawClipVtbl>;

#[repr(C)]
pub struct IBlackmagicRawClipProcessingAttributesVtbl {
    pub base: IUnknownVtbl,
    pub get_clip_attribute: unsafe extern "system" fn(
        this: *mut IBlackmagicRawClipProcessingAttributes,
        attribute: ClipProcessingAttribute,
        value: *mut Variant,
    ) -> HResult,
    pub set_clip_attribute: unsafe extern "system" fn(
        this: *mut IBlackmagicRawClipProcessingAttributes,
        attribute: ClipProcessingAttribute,
        value: *mut Variant,
    ) -> HResult,
    _get_clip_attribute_range: usize,
    pub get_clip_attribute_list: unsafe extern "system" fn(
        this: *mut IBlackmagicRawClipProcessingAttributes,
        attribute: ClipProcessingAttribute,
        array: *mut Variant,
        count: *mut u32,
        read_only: *mut bool,
    ) -> HResult,
    pub get_iso_list: unsafe extern "system" fn(
        this: *mut IBlackmagicRawClipProcessingAttributes,
        array: *mut u32,
        count: *mut u32,
        read_only: *mut bool,
    ) -> HResult,
}
pub type IBlackmagicRawClipProcessingAttributes = ComObject<IBlackmagicRawClipProcessingAttributesVtbl>;

#[repr(C)]
pub struct IBlackmagicRawFrameProcessingAttributesVtbl {
    pub base: IUnknownVtbl,
    _get_frame_attribute: usize,
    pub set_frame_attribute: unsafe extern "system" fn(
        this: *mut IBlackmagicRawFrameProcessingAttributes,
        attribute: FrameProcessingAttribute,
        value: *mut Variant,
    ) -> HResult,
}
pub type IBlackmagicRawFrameProcessingAttributes = ComObject<IBlackmagicRawFrameProcessingAttributesVtbl>;

/// `get_frame_index` is typed but unused.
#[allow(dead_code)]
#[repr(C)]
pub struct IBlackmagicRawFrameVtbl {
    pub base: IUnknownVtbl,
    pub get_frame_index: unsafe extern "system" fn(this: *mut IBlackmagicRawFrame, index: *mut u64) -> HResult,
    _get_timecode: usize,
    _get_metadata_iterator: usize,
    _get_metadata: usize,
    _set_metadata: usize,
    pub clone_frame_processing_attributes: unsafe extern "system" fn(
        this: *mut IBlackmagicRawFrame,
        attributes: *mut *mut IBlackmagicRawFrameProcessingAttributes,
    ) -> HResult,
    pub set_resolution_scale:
        unsafe extern "system" fn(this: *mut IBlackmagicRawFrame, scale: ResolutionScale) -> HResult,
    _get_resolution_scale: usize,
    pub set_resource_format:
        unsafe extern "system" fn(this: *mut IBlackmagicRawFrame, format: ResourceFormat) -> HResult,
    _get_resource_format: usize,
    _get_sensor_rate: usize,
    pub create_job_decode_and_process_frame: unsafe extern "system" fn(
        this: *mut IBlackmagicRawFrame,
        clip_attributes: *mut IBlackmagicRawClipProcessingAttributes,
        frame_attributes: *mut IBlackmagicRawFrameProcessingAttributes,
        job: *mut *mut IBlackmagicRawJob,
    ) -> HResult,
}
pub type IBlackmagicRawFrame = ComObject<IBlackmagicRawFrameVtbl>;

#[repr(C)]
pub struct IBlackmagicRawJobVtbl {
    pub base: IUnknownVtbl,
    pub submit: unsafe extern "system" fn(this: *mut IBlackmagicRawJob) -> HResult,
    _abort: usize,
    pub set_user_data: unsafe extern "system" fn(this: *mut IBlackmagicRawJob, data: *mut c_void) -> HResult,
    pub get_user_data: unsafe extern "system" fn(this: *mut IBlackmagicRawJob, data: *mut *mut c_void) -> HResult,
}
pub type IBlackmagicRawJob = ComObject<IBlackmagicRawJobVtbl>;

#[repr(C)]
pub struct IBlackmagicRawProcessedImageVtbl {
    pub base: IUnknownVtbl,
    pub get_width: unsafe extern "system" fn(this: *mut IBlackmagicRawProcessedImage, width: *mut u32) -> HResult,
    pub get_height: unsafe extern "system" fn(this: *mut IBlackmagicRawProcessedImage, height: *mut u32) -> HResult,
    pub get_resource: unsafe extern "system" fn(this: *mut IBlackmagicRawProcessedImage, resource: *mut *mut c_void) -> HResult,
    _get_resource_type: usize,
    _get_resource_format: usize,
    pub get_resource_size_bytes:
        unsafe extern "system" fn(this: *mut IBlackmagicRawProcessedImage, size: *mut u32) -> HResult,
}
pub type IBlackmagicRawProcessedImage = ComObject<IBlackmagicRawProcessedImageVtbl>;

/// Callback interface implemented on our side.
#[repr(C)]
pub struct IBlackmagicRawCallbackVtbl {
    pub base: IUnknownVtbl,
    pub read_complete: unsafe extern "system" fn(
        this: *mut IBlackmagicRawCallback,
        job: *mut IBlackmagicRawJob,
        result: HResult,
        frame: *mut IBlackmagicRawFrame,
    ),
    pub decode_complete:
        unsafe extern "system" fn(this: *mut IBlackmagicRawCallback, job: *mut IBlackmagicRawJob, result: HResult),
    pub process_complete: unsafe extern "system" fn(
        this: *mut IBlackmagicRawCallback,
        job: *mut IBlackmagicRawJob,
        result: HResult,
        image: *mut IBlackmagicRawProcessedImage,
    ),
    pub trim_progress:
        unsafe extern "system" fn(this: *mut IBlackmagicRawCallback, job: *mut IBlackmagicRawJob, progress: f32),
    pub trim_complete:
        unsafe extern "system" fn(this: *mut IBlackmagicRawCallback, job: *mut IBlackmagicRawJob, result: HResult),
    pub sidecar_metadata_parse_warning: unsafe extern "system" fn(
        this: *mut IBlackmagicRawCallback,
        clip: *mut IBlackmagicRawClip,
        file_name: RawStr,
        line_number: u32,
        info: RawStr,
    ),
    pub sidecar_metadata_parse_error: unsafe extern "system" fn(
        this: *mut IBlackmagicRawCallback,
        clip: *mut IBlackmagicRawClip,
        file_name: RawStr,
        line_number: u32,
        info: RawStr,
    ),
    pub prepare_pipeline_complete:
        unsafe extern "system" fn(this: *mut IBlackmagicRawCallback, user_data: *mut c_void, result: HResult),
}
pub type IBlackmagicRawCallback = ComObject<IBlackmagicRawCallbackVtbl>;

// ---------------------------------------------------------------------------
// Exported entry points
// ---------------------------------------------------------------------------

pub type CreateFactoryFn = unsafe extern "system" fn() -> *mut IBlackmagicRawFactory;
pub type VariantClearFn = unsafe extern "system" fn(value: *mut Variant) -> HResult;

pub const CREATE_FACTORY_SYMBOL: &[u8] = b"CreateBlackmagicRawFactoryInstance\0";
pub const VARIANT_CLEAR_SYMBOL: &[u8] = b"VariantClear\0";

/// Release any COM object through its `IUnknown` slots.
///
/// # Safety
///
/// `object` must be a live interface pointer owned by the caller.
pub unsafe fn release<V>(object: *mut ComObject<V>) -> u32 {
    let vtbl = (*object).vtbl as *const IUnknownVtbl;
    ((*vtbl).release)(object as *mut c_void)
}

/// Take an additional reference on a COM object.
///
/// # Safety
///
/// `object` must be a live interface pointer.
pub unsafe fn add_ref<V>(object: *mut ComObject<V>) -> u32 {
    let vtbl = (*object).vtbl as *const IUnknownVtbl;
    ((*vtbl).add_ref)(object as *mut c_void)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_is_big_endian() {
        assert_eq!(fourcc(b"full"), 0x6675_6c6c);
        assert_ne!(RESOLUTION_SCALE_HALF, RESOLUTION_SCALE_QUARTER);
    }

    #[test]
    fn test_hresult_success() {
        assert!(succeeded(S_OK));
        assert!(succeeded(S_FALSE));
        assert!(!succeeded(E_FAIL));
    }

    #[test]
    fn test_empty_variant() {
        let v = Variant::empty();
        assert_eq!(v.kind(), vt::EMPTY);
    }
}
