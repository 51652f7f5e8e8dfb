//! BRAW OFX Reader - Blackmagic RAW frames for OFX hosts.
//!
//! The host drives a [`BrawReader`] per effect instance: it binds a file,
//! queries bounds and time domain, and asks for frames. Everything native
//! goes through the [`brawofx_sdk`] backend seam.

pub mod callback;
pub mod colorspace;
pub mod config;
pub mod decode;
pub mod decode_params;
pub mod descriptor;
pub mod error;
pub mod params;
pub mod quality;
pub mod reader;
pub mod specs;

pub use callback::{DecodeCallback, FrameSlot};
pub use config::ReaderConfig;
pub use decode::{check_request, decode_frame, DecodeRequest, DecodeState};
pub use decode_params::{parse_iso, DecodeParameterSet};
pub use descriptor::{ParamDescriptor, ParamType, ParamValue, PluginDescriptor};
pub use error::{OfxStatus, ReaderError, Result};
pub use params::{HostParams, ParamStore};
pub use quality::Quality;
pub use reader::{BrawReader, FrameBounds, GuessedParams};
pub use specs::ClipSpecs;
