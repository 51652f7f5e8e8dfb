//! BRAW OFX SDK - runtime bindings to the Blackmagic RAW codec
//!
//! This crate handles:
//! - Locating the codec library on disk
//! - Loading it and driving its COM-style interfaces
//! - The handle-chain traits the reader is written against
//! - An in-process stub codec for tests (feature `stub`)

pub mod backend;
pub mod error;
pub mod ffi;
pub mod locator;
pub mod native;
pub mod platform;

#[cfg(any(test, feature = "stub"))]
pub mod stub;

pub use backend::{
    AttributeValue, ClipAttribute, FrameAttribute, ProcessedImage, RawCallback, RawClip, RawCodec,
    RawFactory, RawJob, RawRuntime, ReadFrame, ResolutionScale, ResourceFormat,
};
pub use error::{SdkError, SdkResult};
pub use locator::{LibraryLocator, Platform};
pub use native::NativeRuntime;
pub use platform::ComApartment;
