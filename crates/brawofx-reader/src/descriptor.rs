//! Plugin and parameter descriptors.
//!
//! Plain data describing the reader to a host. Registration itself is the
//! host framework's job.

use serde::{Deserialize, Serialize};

use crate::quality::Quality;

pub const PLUGIN_IDENTIFIER: &str = "net.sf.openfx.BlackmagicRAW";
pub const PLUGIN_LABEL: &str = "BlackmagicRAWOFX";
pub const PLUGIN_GROUPING: &str = "Image/Readers";
pub const PLUGIN_VERSION_MAJOR: u32 = 1;
pub const PLUGIN_VERSION_MINOR: u32 = 8;
pub const FILE_EXTENSIONS: &[&str] = &["braw"];
pub const DEFAULT_FILE_COLORSPACE: &str = "rec709";
pub const DEFAULT_OUTPUT_COLORSPACE: &str = "scene_linear";

pub const PLUGIN_DESCRIPTION: &str = "Blackmagic RAW is a modern, high performance, professional RAW codec \
that is open, cross platform and free.\n\n\
Supported cameras:\n\n \
- Blackmagic Design Pocket Cinema Camera 4K\n \
- Blackmagic Design URSA Mini Pro G2\n \
- Blackmagic Design Pocket Cinema Camera 6K\n \
- Blackmagic URSA Broadcast\n \
- Blackmagic URSA Mini Pro 12K (BRAW 2.0+)\n \
- Canon EOS C300 Mark II captured by Blackmagic Video Assist 12G HDR\n \
- Panasonic EVA1 captured by Blackmagic Video Assist 12G HDR\n \
- Sigma fp captured by Blackmagic Video Assist 12G HDR\n \
- Nikon Z 6 and Z 7 captured by Blackmagic Video Assist 12G HDR\n \
- Nikon Z 6II and Z 7II captured by Blackmagic Video Assist 12G HDR (BRAW 2.0+)\n";

/// Parameter names.
pub mod names {
    pub const QUALITY: &str = "quality";
    pub const GAMUT: &str = "gamut";
    pub const GAMMA: &str = "gamma";
    pub const ISO: &str = "iso";
    pub const RECOVERY: &str = "recovery";
    pub const COLOR_TEMP: &str = "colorTemp";
    pub const TINT: &str = "tint";
    pub const EXPOSURE: &str = "exposure";
    pub const CUSTOM_GAMMA: &str = "customGamma";
    pub const SATURATION: &str = "saturation";
    pub const CONTRAST: &str = "contrast";
    pub const MIDPOINT: &str = "midpoint";
    pub const HIGHLIGHTS: &str = "highlights";
    pub const SHADOWS: &str = "shadows";
    pub const VIDEO_BLACK_LEVEL: &str = "videoBlackLevel";
}

/// Parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    Choice,
    Int,
    Double,
    Bool,
    Group,
}

/// Default value of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Choice(usize),
    Int(i32),
    Double(f64),
    Bool(bool),
}

/// Descriptor for a single parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub name: String,
    pub label: String,
    pub hint: String,
    pub param_type: ParamType,
    /// `None` for groups.
    pub default: Option<ParamValue>,
    /// Inclusive value range for numeric parameters.
    pub range: Option<(f64, f64)>,
    /// Initial options for choice parameters.
    pub options: Vec<String>,
    /// Enclosing group, if any.
    pub parent: Option<String>,
}

impl ParamDescriptor {
    fn new(name: &str, label: &str, hint: &str, param_type: ParamType, default: Option<ParamValue>) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            hint: hint.to_string(),
            param_type,
            default,
            range: None,
            options: Vec::new(),
            parent: None,
        }
    }

    pub fn choice(name: &str, label: &str, hint: &str, options: &[&str], default: usize) -> Self {
        let mut param = Self::new(name, label, hint, ParamType::Choice, Some(ParamValue::Choice(default)));
        param.options = options.iter().map(|s| s.to_string()).collect();
        param
    }

    pub fn int(name: &str, label: &str, hint: &str, min: i32, max: i32, default: i32) -> Self {
        let mut param = Self::new(name, label, hint, ParamType::Int, Some(ParamValue::Int(default)));
        param.range = Some((min as f64, max as f64));
        param
    }

    pub fn double(name: &str, label: &str, hint: &str, min: f64, max: f64, default: f64) -> Self {
        let mut param = Self::new(name, label, hint, ParamType::Double, Some(ParamValue::Double(default)));
        param.range = Some((min, max));
        param
    }

    pub fn boolean(name: &str, label: &str, hint: &str, default: bool) -> Self {
        Self::new(name, label, hint, ParamType::Bool, Some(ParamValue::Bool(default)))
    }

    pub fn group(name: &str, label: &str, hint: &str) -> Self {
        Self::new(name, label, hint, ParamType::Group, None)
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }
}

/// Descriptor for the reader effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub identifier: String,
    pub label: String,
    pub group: String,
    pub version_major: u32,
    pub version_minor: u32,
    pub description: String,
    pub extensions: Vec<String>,
    pub file_colorspace: String,
    pub output_colorspace: String,
    pub params: Vec<ParamDescriptor>,
}

impl PluginDescriptor {
    /// The Blackmagic RAW reader.
    pub fn braw() -> Self {
        Self {
            identifier: PLUGIN_IDENTIFIER.to_string(),
            label: PLUGIN_LABEL.to_string(),
            group: PLUGIN_GROUPING.to_string(),
            version_major: PLUGIN_VERSION_MAJOR,
            version_minor: PLUGIN_VERSION_MINOR,
            description: PLUGIN_DESCRIPTION.to_string(),
            extensions: FILE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            file_colorspace: DEFAULT_FILE_COLORSPACE.to_string(),
            output_colorspace: DEFAULT_OUTPUT_COLORSPACE.to_string(),
            params: param_descriptors(),
        }
    }

    pub fn param(&self, name: &str) -> Option<&ParamDescriptor> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn supports_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// Every parameter the reader defines, in page order.
pub fn param_descriptors() -> Vec<ParamDescriptor> {
    use names::*;

    let qualities: Vec<&str> = Quality::ALL.iter().map(|q| q.label()).collect();
    vec![
        ParamDescriptor::choice(QUALITY, "Decode Quality", "Decoding resolution", &qualities, Quality::Full.index()),
        ParamDescriptor::choice(GAMUT, "Color Space", "Adjust the color space gamut", &[], 0),
        ParamDescriptor::choice(GAMMA, "Gamma", "Adjust the color space gamma", &[], 0),
        ParamDescriptor::choice(ISO, "ISO", "Adjust the ISO", &[], 0),
        ParamDescriptor::boolean(RECOVERY, "Highlight Recovery", "Enable highlight recovery", false),
        ParamDescriptor::int(COLOR_TEMP, "Color Temp", "Adjust the color temp", 2000, 10000, 5600),
        ParamDescriptor::int(TINT, "Tint", "Adjust the tint", -100, 100, 0),
        ParamDescriptor::double(EXPOSURE, "Exposure", "Adjust the exposure", -5.0, 5.0, 0.0),
        ParamDescriptor::group(
            CUSTOM_GAMMA,
            "Custom Gamma",
            "Set custom gamma, will only work with Blackmagic Design Custom.",
        ),
        ParamDescriptor::double(SATURATION, "Saturation", "Adjust the saturation", 0.0, 2.0, 1.0)
            .with_parent(CUSTOM_GAMMA),
        ParamDescriptor::double(CONTRAST, "Contrast", "Adjust the contrast", 0.0, 2.0, 1.0).with_parent(CUSTOM_GAMMA),
        ParamDescriptor::double(MIDPOINT, "Midpoint", "Adjust the midpoint", 0.0, 1.0, 0.38).with_parent(CUSTOM_GAMMA),
        ParamDescriptor::double(HIGHLIGHTS, "Highlights", "Adjust the highlights", 0.0, 2.0, 1.0)
            .with_parent(CUSTOM_GAMMA),
        ParamDescriptor::double(SHADOWS, "Shadows", "Adjust the shadows", 0.0, 2.0, 1.0).with_parent(CUSTOM_GAMMA),
        ParamDescriptor::boolean(VIDEO_BLACK_LEVEL, "Set Video Black Level", "Set video black level", false)
            .with_parent(CUSTOM_GAMMA),
    ]
}
