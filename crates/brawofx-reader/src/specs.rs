//! Clip introspection without decoding.

use std::path::Path;

use brawofx_core::FrameRange;
use brawofx_sdk::{AttributeValue, ClipAttribute, RawClip, RawRuntime, SdkResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Metadata keys read for the current grade.
pub mod metadata_keys {
    pub const WHITE_BALANCE_KELVIN: &str = "white_balance_kelvin";
    pub const WHITE_BALANCE_TINT: &str = "white_balance_tint";
    pub const EXPOSURE: &str = "exposure";
    pub const ISO: &str = "iso";
}

/// Snapshot of one clip's geometry, grade and option lists.
///
/// The zero value means the clip could not be read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipSpecs {
    /// Native decode width
    pub width: u32,
    /// Native decode height
    pub height: u32,
    pub fps: f64,
    /// Number of frames
    pub frame_max: u64,
    pub iso: u32,
    pub gamma: String,
    pub gamut: String,
    pub color_temp: i32,
    pub tint: i32,
    pub exposure: f64,
    pub saturation: f64,
    pub contrast: f64,
    pub midpoint: f64,
    pub highlights: f64,
    pub shadows: f64,
    pub video_black_level: bool,
    pub available_iso: Vec<String>,
    pub available_gamma: Vec<String>,
    pub available_gamut: Vec<String>,
}

impl ClipSpecs {
    /// True when the clip has a usable picture size.
    pub fn is_usable(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Host time domain `[1, frame_max]`, `None` without frames.
    pub fn time_domain(&self) -> Option<FrameRange> {
        FrameRange::for_frame_count(self.frame_max)
    }
}

/// Read the specs of `file`, degrading to [`ClipSpecs::default`] on any codec error.
pub fn resolve(runtime: &dyn RawRuntime, file: &Path, library_dir: &Path) -> ClipSpecs {
    match resolve_checked(runtime, file, library_dir) {
        Ok(specs) => specs,
        Err(e) => {
            warn!(path = %file.display(), error = %e, "could not read clip specs");
            ClipSpecs::default()
        }
    }
}

/// Read the specs of `file`.
///
/// Geometry, timing and option lists must all be readable. Grades fall back
/// to neutral values when the clip does not carry them. Every handle is
/// released before this returns.
pub fn resolve_checked(runtime: &dyn RawRuntime, file: &Path, library_dir: &Path) -> SdkResult<ClipSpecs> {
    let factory = runtime.create_factory(library_dir)?;
    let codec = factory.create_codec()?;
    let clip = codec.open_clip(file)?;

    let specs = read_specs(clip.as_ref())?;
    debug!(
        path = %file.display(),
        width = specs.width,
        height = specs.height,
        frames = specs.frame_max,
        "resolved clip specs"
    );
    Ok(specs)
}

fn read_specs(clip: &dyn RawClip) -> SdkResult<ClipSpecs> {
    let number = |key: &str| -> Option<f64> {
        match clip.metadata(key) {
            Ok(value) => value.and_then(|v| v.as_f64()),
            Err(e) => {
                debug!(key, error = %e, "metadata unavailable");
                None
            }
        }
    };
    let clip_number = |attribute: ClipAttribute, fallback: f64| -> f64 {
        clip.clip_attribute(attribute)
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(fallback)
    };
    let clip_text = |attribute: ClipAttribute| -> String {
        clip.clip_attribute(attribute)
            .ok()
            .and_then(|v| v.as_text().map(str::to_string))
            .unwrap_or_default()
    };

    Ok(ClipSpecs {
        width: clip.width()?,
        height: clip.height()?,
        fps: clip.frame_rate()? as f64,
        frame_max: clip.frame_count()?,
        iso: number(metadata_keys::ISO).map(|v| v.round().max(0.0) as u32).unwrap_or(0),
        gamma: clip_text(ClipAttribute::Gamma),
        gamut: clip_text(ClipAttribute::Gamut),
        color_temp: number(metadata_keys::WHITE_BALANCE_KELVIN)
            .map(|v| v.round() as i32)
            .unwrap_or(5600),
        tint: number(metadata_keys::WHITE_BALANCE_TINT)
            .map(|v| v.round() as i32)
            .unwrap_or(0),
        exposure: number(metadata_keys::EXPOSURE).unwrap_or(0.0),
        saturation: clip_number(ClipAttribute::ToneCurveSaturation, 1.0),
        contrast: clip_number(ClipAttribute::ToneCurveContrast, 1.0),
        midpoint: clip_number(ClipAttribute::ToneCurveMidpoint, 0.38),
        highlights: clip_number(ClipAttribute::ToneCurveHighlights, 1.0),
        shadows: clip_number(ClipAttribute::ToneCurveShadows, 1.0),
        video_black_level: clip_number(ClipAttribute::ToneCurveVideoBlackLevel, 0.0) != 0.0,
        available_iso: clip.iso_list()?.iter().map(u32::to_string).collect(),
        available_gamma: text_list(clip.clip_attribute_list(ClipAttribute::Gamma)?),
        available_gamut: text_list(clip.clip_attribute_list(ClipAttribute::Gamut)?),
    })
}

fn text_list(values: Vec<AttributeValue>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|v| match v {
            AttributeValue::Text(s) => Some(s),
            other => other.as_f64().map(|n| n.to_string()),
        })
        .collect()
}
