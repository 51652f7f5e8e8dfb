//! Codec binding errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::ffi::HResult;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("codec library not found in any known location")]
    LibraryNotFound,
    #[error("failed to load codec library {path}: {reason}")]
    LoadFailed { path: PathBuf, reason: String },
    #[error("required symbol not found: {0}")]
    SymbolNotFound(String),
    #[error("{call} failed with HRESULT {hresult:#010x}")]
    Call { call: &'static str, hresult: HResult },
    #[error("{call} returned a null handle")]
    NullHandle { call: &'static str },
    #[error("clip not found: {0}")]
    NotFound(PathBuf),
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),
}

impl SdkError {
    /// Wrap a non-success HRESULT from `call`.
    pub fn call(call: &'static str, hresult: HResult) -> Self {
        Self::Call { call, hresult }
    }
}

pub type SdkResult<T> = std::result::Result<T, SdkError>;
