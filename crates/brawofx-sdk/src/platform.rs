//! Platform string marshaling and COM apartment setup.
//!
//! The SDK's `BSTR` is a UTF-8 `char*` on Linux, a `CFStringRef` on macOS
//! and a real `BSTR` on Windows.

use std::path::Path;

use crate::error::{SdkError, SdkResult};
use crate::ffi::RawStr;

#[cfg(target_os = "windows")]
mod win32 {
    use std::ffi::c_void;

    #[link(name = "oleaut32")]
    extern "system" {
        pub fn SysAllocStringLen(text: *const u16, len: u32) -> *mut u16;
        pub fn SysFreeString(text: *mut u16);
        pub fn SysStringLen(text: *const u16) -> u32;
        pub fn VariantClear(value: *mut crate::ffi::Variant) -> crate::ffi::HResult;
    }

    #[link(name = "ole32")]
    extern "system" {
        pub fn CoInitializeEx(reserved: *mut c_void, coinit: u32) -> i32;
        pub fn CoUninitialize();
    }

    pub const COINIT_MULTITHREADED: u32 = 0;
}

/// An owned string in the SDK's platform representation.
pub struct SdkString {
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    inner: std::ffi::CString,
    #[cfg(target_os = "macos")]
    inner: core_foundation::string::CFString,
    #[cfg(target_os = "windows")]
    inner: *mut u16,
}

impl SdkString {
    pub fn new(text: &str) -> SdkResult<Self> {
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let inner = std::ffi::CString::new(text)
                .map_err(|_| SdkError::UnsupportedValue(format!("interior NUL in {text:?}")))?;
            Ok(Self { inner })
        }
        #[cfg(target_os = "macos")]
        {
            Ok(Self {
                inner: core_foundation::string::CFString::new(text),
            })
        }
        #[cfg(target_os = "windows")]
        {
            let wide: Vec<u16> = text.encode_utf16().collect();
            // SAFETY: `wide` is a valid UTF-16 buffer of the given length.
            let inner = unsafe { win32::SysAllocStringLen(wide.as_ptr(), wide.len() as u32) };
            if inner.is_null() {
                return Err(SdkError::NullHandle { call: "SysAllocStringLen" });
            }
            Ok(Self { inner })
        }
    }

    /// Marshal a file path. Paths must be valid Unicode.
    pub fn from_path(path: &Path) -> SdkResult<Self> {
        let text = path
            .to_str()
            .ok_or_else(|| SdkError::UnsupportedValue(format!("non-Unicode path {}", path.display())))?;
        Self::new(text)
    }

    /// Borrow the raw pointer. Valid while `self` lives.
    pub fn as_raw(&self) -> RawStr {
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            self.inner.as_ptr()
        }
        #[cfg(target_os = "macos")]
        {
            use core_foundation::base::TCFType;
            self.inner.as_concrete_TypeRef() as RawStr
        }
        #[cfg(target_os = "windows")]
        {
            self.inner
        }
    }
}

#[cfg(target_os = "windows")]
impl Drop for SdkString {
    fn drop(&mut self) {
        // SAFETY: allocated by SysAllocStringLen and freed once.
        unsafe { win32::SysFreeString(self.inner) }
    }
}

/// Copy an SDK string into a Rust `String`. Null reads as empty.
///
/// # Safety
///
/// `raw` must be null or a valid string in the platform representation.
pub unsafe fn read_raw_str(raw: RawStr) -> String {
    if raw.is_null() {
        return String::new();
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        std::ffi::CStr::from_ptr(raw).to_string_lossy().into_owned()
    }
    #[cfg(target_os = "macos")]
    {
        use core_foundation::base::TCFType;
        use core_foundation::string::{CFString, CFStringRef};
        CFString::wrap_under_get_rule(raw as CFStringRef).to_string()
    }
    #[cfg(target_os = "windows")]
    {
        let len = win32::SysStringLen(raw) as usize;
        String::from_utf16_lossy(std::slice::from_raw_parts(raw, len))
    }
}

/// `VariantClear` from the system on Windows; elsewhere the codec exports it.
#[cfg(target_os = "windows")]
pub fn system_variant_clear() -> Option<crate::ffi::VariantClearFn> {
    Some(win32::VariantClear)
}

#[cfg(not(target_os = "windows"))]
pub fn system_variant_clear() -> Option<crate::ffi::VariantClearFn> {
    None
}

/// Holds a multithreaded COM apartment on Windows; a no-op elsewhere.
#[derive(Debug)]
pub struct ComApartment {
    #[cfg_attr(not(target_os = "windows"), allow(dead_code))]
    initialized: bool,
}

impl ComApartment {
    pub fn enter() -> Self {
        #[cfg(target_os = "windows")]
        {
            // SAFETY: paired with CoUninitialize in Drop when it succeeds.
            let hr = unsafe { win32::CoInitializeEx(std::ptr::null_mut(), win32::COINIT_MULTITHREADED) };
            if hr < 0 {
                tracing::warn!(hresult = hr, "CoInitializeEx failed");
            }
            Self { initialized: hr >= 0 }
        }
        #[cfg(not(target_os = "windows"))]
        {
            Self { initialized: false }
        }
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        #[cfg(target_os = "windows")]
        if self.initialized {
            // SAFETY: matches the successful CoInitializeEx in `enter`.
            unsafe { win32::CoUninitialize() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_utf8() {
        let s = SdkString::new("A001_08122231_C001.braw").unwrap();
        let back = unsafe { read_raw_str(s.as_raw()) };
        assert_eq!(back, "A001_08122231_C001.braw");
    }

    #[test]
    fn test_null_reads_empty() {
        let null: RawStr = std::ptr::null_mut::<u8>() as _;
        assert!(unsafe { read_raw_str(null) }.is_empty());
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    #[test]
    fn test_interior_nul_rejected() {
        assert!(SdkString::new("bad\0name").is_err());
    }

    #[test]
    fn test_apartment_enter_and_drop() {
        let apartment = ComApartment::enter();
        drop(apartment);
    }
}
