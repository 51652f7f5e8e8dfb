//! Per-instance reader context.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use brawofx_core::{FrameRange, ImageBufferMut, PixelComponents, RectI};
use brawofx_sdk::{ComApartment, LibraryLocator, NativeRuntime, RawRuntime};
use tracing::{info, warn};

use crate::colorspace::guess_colorspace;
use crate::config::ReaderConfig;
use crate::decode::{check_request, decode_frame, DecodeRequest};
use crate::decode_params::{parse_iso, DecodeParameterSet};
use crate::descriptor::names;
use crate::error::{ReaderError, Result};
use crate::params::HostParams;
use crate::quality::{self, Quality};
use crate::specs::{self, ClipSpecs};

/// Output bounds of the current clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameBounds {
    pub rect: RectI,
    pub pixel_aspect_ratio: f64,
    /// Zero: the reader does not tile.
    pub tile_width: u32,
    pub tile_height: u32,
}

/// What the reader can tell about a file before decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct GuessedParams {
    pub components: PixelComponents,
    pub file_colorspace: Option<String>,
}

/// A reader instance: host parameters, codec runtime, and the current clip.
pub struct BrawReader<P: HostParams> {
    params: P,
    config: ReaderConfig,
    runtime: Arc<dyn RawRuntime>,
    library_dir: Option<PathBuf>,
    file: Option<PathBuf>,
    specs: ClipSpecs,
    persistent_message: Option<String>,
    _apartment: ComApartment,
}

impl<P: HostParams> BrawReader<P> {
    /// Create a reader over `runtime`. The codec directory is resolved once here.
    pub fn new(mut params: P, config: ReaderConfig, runtime: Arc<dyn RawRuntime>) -> Result<Self> {
        let apartment = ComApartment::enter();
        params.set_choice_default(names::QUALITY, config.default_quality.index())?;
        params.reset_to_default(names::QUALITY)?;

        let library_dir = resolve_library_dir(&config);
        match &library_dir {
            Some(dir) => info!(dir = %dir.display(), "using Blackmagic RAW library"),
            None => warn!("Blackmagic RAW library not found"),
        }

        Ok(Self {
            params,
            config,
            runtime,
            library_dir,
            file: None,
            specs: ClipSpecs::default(),
            persistent_message: None,
            _apartment: apartment,
        })
    }

    /// Create a reader over the installed codec.
    pub fn with_native(params: P, config: ReaderConfig) -> Result<Self> {
        Self::new(params, config, Arc::new(NativeRuntime::default()))
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn library_dir(&self) -> Option<&Path> {
        self.library_dir.as_deref()
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut P {
        &mut self.params
    }

    /// Specs of the current clip. Zero when no usable clip is bound.
    pub fn specs(&self) -> &ClipSpecs {
        &self.specs
    }

    /// Bind a new input file and resynchronize the parameters with it.
    pub fn set_file(&mut self, file: impl Into<PathBuf>) -> Result<()> {
        let file = file.into();
        self.file = (!file.as_os_str().is_empty()).then_some(file);
        self.restore_state_from_params()
    }

    fn resolve_specs(&self, file: &Path) -> ClipSpecs {
        match &self.library_dir {
            Some(dir) => specs::resolve(self.runtime.as_ref(), file, dir),
            None => {
                warn!(path = %file.display(), "cannot read clip specs without the codec library");
                ClipSpecs::default()
            }
        }
    }

    /// Re-read the bound clip and make the parameters match it.
    ///
    /// Option lists are replaced and the clip's current ISO, gamma and gamut
    /// preselected. For a readable clip every grade is also reset to the
    /// clip's value.
    pub fn restore_state_from_params(&mut self) -> Result<()> {
        let Some(file) = self.file.clone() else {
            return Ok(());
        };
        let specs = self.resolve_specs(&file);

        self.params.reset_options(names::ISO, &specs.available_iso)?;
        if specs.iso > 0 {
            let current = specs
                .available_iso
                .iter()
                .position(|o| parse_iso(o).ok().flatten() == Some(specs.iso));
            self.preselect(names::ISO, current)?;
        }

        self.params.reset_options(names::GAMMA, &specs.available_gamma)?;
        if !specs.gamma.is_empty() {
            let current = specs.available_gamma.iter().position(|o| *o == specs.gamma);
            self.preselect(names::GAMMA, current)?;
        }

        self.params.reset_options(names::GAMUT, &specs.available_gamut)?;
        if !specs.gamut.is_empty() {
            let current = specs.available_gamut.iter().position(|o| *o == specs.gamut);
            self.preselect(names::GAMUT, current)?;
        }

        if specs.is_usable() {
            self.sync_int(names::COLOR_TEMP, specs.color_temp)?;
            self.sync_int(names::TINT, specs.tint)?;
            self.sync_double(names::EXPOSURE, specs.exposure)?;
            self.sync_double(names::SATURATION, specs.saturation)?;
            self.sync_double(names::CONTRAST, specs.contrast)?;
            self.sync_double(names::MIDPOINT, specs.midpoint)?;
            self.sync_double(names::HIGHLIGHTS, specs.highlights)?;
            self.sync_double(names::SHADOWS, specs.shadows)?;
            self.params.set_boolean_default(names::VIDEO_BLACK_LEVEL, specs.video_black_level)?;
            self.params.set_boolean(names::VIDEO_BLACK_LEVEL, specs.video_black_level)?;
        }

        info!(path = %file.display(), width = specs.width, height = specs.height, "clip bound");
        self.specs = specs;
        Ok(())
    }

    fn preselect(&mut self, name: &str, index: Option<usize>) -> Result<()> {
        if let Some(index) = index {
            self.params.set_choice_default(name, index)?;
            self.params.reset_to_default(name)?;
        }
        Ok(())
    }

    fn sync_int(&mut self, name: &str, value: i32) -> Result<()> {
        self.params.set_int_default(name, value)?;
        self.params.set_int(name, value)
    }

    fn sync_double(&mut self, name: &str, value: f64) -> Result<()> {
        self.params.set_double_default(name, value)?;
        self.params.set_double(name, value)
    }

    fn quality(&self) -> Quality {
        self.params
            .choice_index(names::QUALITY)
            .map(Quality::from_index)
            .unwrap_or_default()
    }

    /// Bounds at the selected quality, `None` without a usable clip.
    pub fn frame_bounds(&self) -> Option<FrameBounds> {
        let (width, height) = quality::resolve(self.specs.width, self.specs.height, self.quality())?;
        Some(FrameBounds {
            rect: RectI::from_size(width as i32, height as i32),
            pixel_aspect_ratio: 1.0,
            tile_width: 0,
            tile_height: 0,
        })
    }

    /// Frame rate of the current clip, `None` until a readable clip is bound.
    pub fn frame_rate(&self) -> Option<f64> {
        (self.specs.fps > 0.0).then_some(self.specs.fps)
    }

    /// Re-read `file` and return its host time range.
    pub fn sequence_time_domain(&mut self, file: &Path) -> Option<FrameRange> {
        self.specs = self.resolve_specs(file);
        self.specs.time_domain()
    }

    /// Every Blackmagic RAW file is a video stream.
    pub fn is_video_stream(&self, _file: &Path) -> bool {
        true
    }

    /// Output layout and colorspace for a file.
    pub fn guess_params(&self, has_colorspace: impl Fn(&str) -> bool) -> GuessedParams {
        GuessedParams {
            components: PixelComponents::Rgb,
            file_colorspace: guess_colorspace(has_colorspace).map(str::to_string),
        }
    }

    /// Decode one frame into `output`.
    ///
    /// On failure the error's message is kept as the persistent message.
    pub fn decode(&mut self, request: &DecodeRequest, output: &mut ImageBufferMut<'_>) -> Result<()> {
        let result = self.decode_inner(request, output);
        match &result {
            Ok(()) => self.persistent_message = None,
            Err(e) => self.persistent_message = Some(e.persistent_message()),
        }
        result
    }

    fn decode_inner(&self, request: &DecodeRequest, output: &mut ImageBufferMut<'_>) -> Result<()> {
        check_request(request)?;
        let params = DecodeParameterSet::from_host(&self.params)?;
        let library_dir = self.library_dir.as_deref().ok_or(ReaderError::LibraryNotFound)?;
        decode_frame(self.runtime.as_ref(), library_dir, params, request, output)
    }

    pub fn persistent_message(&self) -> Option<&str> {
        self.persistent_message.as_deref()
    }

    pub fn clear_persistent_message(&mut self) {
        self.persistent_message = None;
    }
}

fn resolve_library_dir(config: &ReaderConfig) -> Option<PathBuf> {
    if let Some(dir) = config.sdk_dir.as_ref().filter(|d| d.is_dir()) {
        return Some(dir.clone());
    }
    LibraryLocator::new(config.bundle_root.clone()).locate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamStore;
    use brawofx_core::RgbFrame;
    use brawofx_sdk::stub::{StubClip, StubRuntime};

    const CLIP: &str = "/footage/A003_C004.braw";

    fn reader(rt: &StubRuntime) -> (BrawReader<ParamStore>, tempfile::TempDir) {
        let sdk = tempfile::tempdir().unwrap();
        let config = ReaderConfig {
            sdk_dir: Some(sdk.path().to_path_buf()),
            ..Default::default()
        };
        let reader = BrawReader::new(ParamStore::new(), config, Arc::new(rt.clone())).unwrap();
        (reader, sdk)
    }

    #[test]
    fn test_sdk_dir_override() {
        let rt = StubRuntime::new();
        let (reader, sdk) = reader(&rt);
        assert_eq!(reader.library_dir(), Some(sdk.path()));
    }

    #[test]
    fn test_set_file_preselects_clip_values() {
        let rt = StubRuntime::new().with_clip(CLIP, StubClip::new(3840, 2160));
        let (mut reader, _sdk) = reader(&rt);
        reader.set_file(CLIP).unwrap();

        let params = reader.params();
        assert_eq!(params.selected_option(names::ISO).unwrap(), "400");
        assert_eq!(params.selected_option(names::GAMMA).unwrap(), "Blackmagic Design Film");
        assert_eq!(params.selected_option(names::GAMUT).unwrap(), "Blackmagic Design");
        assert_eq!(params.int(names::TINT).unwrap(), 10);
        assert_eq!(reader.frame_rate(), Some(24.0));
    }

    #[test]
    fn test_default_quality_from_config() {
        let rt = StubRuntime::new().with_clip(CLIP, StubClip::new(3840, 2160));
        let config = ReaderConfig {
            default_quality: Quality::Half,
            ..Default::default()
        };
        let mut reader = BrawReader::new(ParamStore::new(), config, Arc::new(rt)).unwrap();
        assert_eq!(reader.params().choice_index(names::QUALITY).unwrap(), 1);
        reader.specs = ClipSpecs {
            width: 3840,
            height: 2160,
            ..Default::default()
        };
        assert_eq!(reader.frame_bounds().map(|b| b.rect), Some(RectI::from_size(1920, 1080)));
    }

    #[test]
    fn test_decode_failure_sets_persistent_message() {
        let rt = StubRuntime::new().with_clip(CLIP, StubClip::new(16, 8));
        let (mut reader, _sdk) = reader(&rt);
        let mut out = RgbFrame::new(16, 8);
        let missing = DecodeRequest::rgb("/footage/gone.braw", 1.0, RectI::from_size(16, 8));
        assert!(reader.decode(&missing, &mut out.as_image_mut()).is_err());
        assert!(reader.persistent_message().unwrap().starts_with("Unable to render image"));

        let ok = DecodeRequest::rgb(CLIP, 1.0, RectI::from_size(16, 8));
        reader.decode(&ok, &mut out.as_image_mut()).unwrap();
        assert_eq!(reader.persistent_message(), None);
    }

    #[test]
    fn test_guess_params() {
        let rt = StubRuntime::new();
        let (reader, _sdk) = reader(&rt);
        let guessed = reader.guess_params(|n| n == "rrt_rec709");
        assert_eq!(guessed.components, PixelComponents::Rgb);
        assert_eq!(guessed.file_colorspace.as_deref(), Some("rrt_rec709"));
        assert!(reader.is_video_stream(Path::new(CLIP)));
    }
}
