//! Grading parameters sent to the codec for one decode.

use brawofx_sdk::{AttributeValue, ClipAttribute, FrameAttribute};
use serde::{Deserialize, Serialize};

use crate::descriptor::names;
use crate::error::{ReaderError, Result};
use crate::params::HostParams;
use crate::quality::Quality;

/// Immutable snapshot of the host parameters, built fresh per decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeParameterSet {
    /// `None` leaves the clip's own ISO in place.
    pub iso: Option<u32>,
    pub gamma: String,
    pub gamut: String,
    pub recovery: bool,
    pub color_temp: i32,
    pub tint: i32,
    pub exposure: f64,
    pub saturation: f64,
    pub contrast: f64,
    pub midpoint: f64,
    pub highlights: f64,
    pub shadows: f64,
    pub video_black_level: bool,
    pub quality: Quality,
}

impl Default for DecodeParameterSet {
    fn default() -> Self {
        Self {
            iso: None,
            gamma: String::new(),
            gamut: String::new(),
            recovery: false,
            color_temp: 5600,
            tint: 0,
            exposure: 0.0,
            saturation: 1.0,
            contrast: 1.0,
            midpoint: 0.38,
            highlights: 1.0,
            shadows: 1.0,
            video_black_level: false,
            quality: Quality::Full,
        }
    }
}

/// Parse a selected ISO option. Empty means unset.
pub fn parse_iso(option: &str) -> Result<Option<u32>> {
    let option = option.trim();
    if option.is_empty() {
        return Ok(None);
    }
    option
        .parse()
        .map(Some)
        .map_err(|_| ReaderError::InvalidParameter(format!("ISO option {option:?} is not a number")))
}

impl DecodeParameterSet {
    /// Read the current host values.
    ///
    /// Gamma and gamut are the text of the selected option in the current
    /// option list.
    pub fn from_host<P: HostParams + ?Sized>(params: &P) -> Result<Self> {
        Ok(Self {
            iso: parse_iso(&params.selected_option(names::ISO)?)?,
            gamma: params.selected_option(names::GAMMA)?,
            gamut: params.selected_option(names::GAMUT)?,
            recovery: params.boolean(names::RECOVERY)?,
            color_temp: params.int(names::COLOR_TEMP)?,
            tint: params.int(names::TINT)?,
            exposure: params.double(names::EXPOSURE)?,
            saturation: params.double(names::SATURATION)?,
            contrast: params.double(names::CONTRAST)?,
            midpoint: params.double(names::MIDPOINT)?,
            highlights: params.double(names::HIGHLIGHTS)?,
            shadows: params.double(names::SHADOWS)?,
            video_black_level: params.boolean(names::VIDEO_BLACK_LEVEL)?,
            quality: Quality::from_index(params.choice_index(names::QUALITY)?),
        })
    }

    /// Clip processing attributes in the codec's value types.
    ///
    /// Empty gamma and gamut names are skipped.
    pub fn clip_attributes(&self) -> Vec<(ClipAttribute, AttributeValue)> {
        let mut attrs = Vec::with_capacity(9);
        if !self.gamma.is_empty() {
            attrs.push((ClipAttribute::Gamma, AttributeValue::Text(self.gamma.clone())));
        }
        if !self.gamut.is_empty() {
            attrs.push((ClipAttribute::Gamut, AttributeValue::Text(self.gamut.clone())));
        }
        attrs.extend([
            (ClipAttribute::HighlightRecovery, AttributeValue::U16(self.recovery as u16)),
            (ClipAttribute::ToneCurveSaturation, AttributeValue::F32(self.saturation as f32)),
            (ClipAttribute::ToneCurveContrast, AttributeValue::F32(self.contrast as f32)),
            (ClipAttribute::ToneCurveMidpoint, AttributeValue::F32(self.midpoint as f32)),
            (ClipAttribute::ToneCurveHighlights, AttributeValue::F32(self.highlights as f32)),
            (ClipAttribute::ToneCurveShadows, AttributeValue::F32(self.shadows as f32)),
            (
                ClipAttribute::ToneCurveVideoBlackLevel,
                AttributeValue::U16(self.video_black_level as u16),
            ),
        ]);
        attrs
    }

    /// Frame processing attributes. ISO is included only when set.
    pub fn frame_attributes(&self) -> Vec<(FrameAttribute, AttributeValue)> {
        let mut attrs = vec![
            (FrameAttribute::WhiteBalanceKelvin, AttributeValue::U32(self.color_temp.max(0) as u32)),
            (FrameAttribute::WhiteBalanceTint, AttributeValue::S16(self.tint as i16)),
            (FrameAttribute::Exposure, AttributeValue::F32(self.exposure as f32)),
        ];
        if let Some(iso) = self.iso {
            attrs.push((FrameAttribute::Iso, AttributeValue::U32(iso)));
        }
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamStore;

    fn options(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_iso_parsing() {
        assert_eq!(parse_iso("").unwrap(), None);
        assert_eq!(parse_iso("800").unwrap(), Some(800));
        assert!(matches!(parse_iso("auto"), Err(ReaderError::InvalidParameter(_))));
    }

    #[test]
    fn test_from_fresh_store_leaves_iso_unset() {
        let store = ParamStore::new();
        let set = DecodeParameterSet::from_host(&store).unwrap();
        assert_eq!(set.iso, None);
        assert!(set.gamma.is_empty());
        assert_eq!(set.quality, Quality::Full);
        assert!(set.frame_attributes().iter().all(|(a, _)| *a != FrameAttribute::Iso));
    }

    #[test]
    fn test_from_host_reads_selected_options() {
        let mut store = ParamStore::new();
        store.reset_options(names::ISO, &options(&["400", "800", "1600"])).unwrap();
        store.set_choice(names::ISO, 1).unwrap();
        store.reset_options(names::GAMMA, &options(&["Blackmagic Design Film", "Rec.709"])).unwrap();
        store.set_choice(names::GAMMA, 1).unwrap();
        store.set_choice(names::QUALITY, 3).unwrap();
        store.set_int(names::COLOR_TEMP, 3200).unwrap();

        let set = DecodeParameterSet::from_host(&store).unwrap();
        assert_eq!(set.iso, Some(800));
        assert_eq!(set.gamma, "Rec.709");
        assert_eq!(set.quality, Quality::Eighth);
        assert_eq!(set.color_temp, 3200);
    }

    #[test]
    fn test_attribute_marshaling() {
        let set = DecodeParameterSet {
            iso: Some(1600),
            gamma: "Blackmagic Design Custom".into(),
            recovery: true,
            ..Default::default()
        };
        let clip = set.clip_attributes();
        assert_eq!(clip[0], (ClipAttribute::Gamma, AttributeValue::Text("Blackmagic Design Custom".into())));
        assert!(clip.iter().all(|(a, _)| *a != ClipAttribute::Gamut));
        assert!(clip.contains(&(ClipAttribute::HighlightRecovery, AttributeValue::U16(1))));

        let frame = set.frame_attributes();
        assert_eq!(frame.last(), Some(&(FrameAttribute::Iso, AttributeValue::U32(1600))));
    }
}
